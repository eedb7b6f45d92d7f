//! Cache keys and content hashes

use super::stable::stable_hash;
use serde_json::{json, Value};
use std::fmt;
use url::Url;

/// Top-level option fields that never change the produced output
pub const IGNORED_OPTION_KEYS: &[&str] = &["url", "metricsOptions", "bypassCache"];

/// Cached endpoint family, the second segment of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Read,
    /// Link extraction returning a tree
    Links,
    /// Link extraction returning a flat list
    LinksFlat,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Links => "links",
            Self::LinksFlat => "notree",
        }
    }
}

/// TTL bucket, the last segment of a cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlBucket {
    Default,
    Days(u32),
}

impl TtlBucket {
    pub fn from_days(days: Option<u32>) -> Self {
        days.map(Self::Days).unwrap_or(Self::Default)
    }

    /// TTL in seconds, `default_secs` for the default bucket
    pub fn ttl_secs(&self, default_secs: u64) -> u64 {
        match self {
            Self::Default => default_secs,
            Self::Days(days) => u64::from(*days) * 86_400,
        }
    }
}

impl fmt::Display for TtlBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default-ttl"),
            Self::Days(days) => write!(f, "{}d", days),
        }
    }
}

/// Removes the ignored top-level fields (plus `extra`) from an options object
fn strip_options(options: &Value, extra: &[&str]) -> Value {
    match options {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| {
                    !IGNORED_OPTION_KEYS.contains(&k.as_str()) && !extra.contains(&k.as_str())
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Hash of the output-relevant request options
///
/// Key order, `url`, `metricsOptions` and `bypassCache` never affect it.
pub fn options_hash(options: &Value) -> String {
    stable_hash(&strip_options(options, &[]))
}

/// Options hash used for link content hashes; `tree` is hashed separately
pub fn links_options_hash(options: &Value) -> String {
    stable_hash(&strip_options(options, &["tree"]))
}

/// A response cache key
///
/// Renders as `{method}|{endpoint}|{target}|{optionsHash}|{ttlBucket}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub method: String,
    pub endpoint: Endpoint,
    pub target: String,
    pub options_hash: String,
    pub ttl_bucket: TtlBucket,
}

impl CacheKey {
    /// Builds the key for a request
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method, upper-cased into the key
    /// * `endpoint` - Endpoint family
    /// * `target` - Normalized target URL
    /// * `options` - Request options as JSON
    /// * `ttl_days` - Requested cache lifetime in days, if any
    pub fn new(
        method: &str,
        endpoint: Endpoint,
        target: &str,
        options: &Value,
        ttl_days: Option<u32>,
    ) -> Self {
        Self {
            method: method.to_uppercase(),
            endpoint,
            target: target.to_string(),
            options_hash: options_hash(options),
            ttl_bucket: TtlBucket::from_days(ttl_days),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.method,
            self.endpoint.as_str(),
            self.target,
            self.options_hash,
            self.ttl_bucket
        )
    }
}

/// Content hash of a read response
///
/// `content` is the markdown when the response has one, the full response
/// otherwise.
pub fn read_content_hash(target: &str, options_hash: &str, content: &Value) -> String {
    stable_hash(&json!([target, options_hash, content]))
}

/// Content hash of a links response
pub fn links_content_hash(
    root_key: &str,
    options_hash: &str,
    has_tree: bool,
    response: &Value,
) -> String {
    stable_hash(&json!([root_key, options_hash, "links", has_tree, response]))
}

/// `scheme://host[:port]/path` of a URL, without query or fragment
pub fn links_root_key(url: &Url) -> String {
    let mut root = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        root.push_str(&format!(":{}", port));
    }
    root.push_str(url.path());
    root
}
