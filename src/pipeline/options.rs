//! Request options of the read and links operations

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which renderings a read response carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Html,
    Both,
}

impl OutputFormat {
    pub fn wants_markdown(&self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }

    pub fn wants_html(&self) -> bool {
        matches!(self, Self::Html | Self::Both)
    }
}

fn default_true() -> bool {
    true
}

/// Options of a read request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    pub url: String,

    #[serde(default)]
    pub format: OutputFormat,

    #[serde(default = "default_true")]
    pub include_metadata: bool,

    /// Also strip headers, footers and sidebars
    #[serde(default)]
    pub exclude_non_main_tags: bool,

    /// Extra CSS selectors to strip
    #[serde(default)]
    pub remove_selectors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_days: Option<u32>,

    /// Skip the cache lookup; the fresh result is still cached
    #[serde(default)]
    pub bypass_cache: bool,

    /// Caller-side instrumentation settings; never affect the output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_options: Option<Value>,
}

impl ReadOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: OutputFormat::default(),
            include_metadata: true,
            exclude_non_main_tags: false,
            remove_selectors: Vec::new(),
            cache_ttl_days: None,
            bypass_cache: false,
            metrics_options: None,
        }
    }
}

/// Options of a link extraction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinksOptions {
    pub url: String,

    /// Return a path tree instead of a flat list
    #[serde(default)]
    pub tree: bool,

    /// Keep only links on the target's host
    #[serde(default)]
    pub same_origin: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_days: Option<u32>,

    #[serde(default)]
    pub bypass_cache: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_options: Option<Value>,
}

impl LinksOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tree: false,
            same_origin: false,
            cache_ttl_days: None,
            bypass_cache: false,
            metrics_options: None,
        }
    }
}
