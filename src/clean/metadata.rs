//! Page metadata captured during the cleaning pass

use html_escape::decode_html_entities;
use super::{CleanError, ElementHandler, HandlerResult, TextHandler};
use crate::url::normalize_url;
use lol_html::html_content::{Element, TextChunk};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use url::Url;

/// Title used when metadata could not be extracted
pub const PLACEHOLDER_TITLE: &str = "Untitled";

/// Metadata of a cleaned page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub og_site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_card: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_site: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter_creator: Option<String>,
    pub source_url: String,
}

impl PageMetadata {
    /// Minimal metadata for a page whose extraction failed
    pub fn placeholder(url: &Url) -> Self {
        Self {
            title: Some(PLACEHOLDER_TITLE.to_string()),
            source_url: url.to_string(),
            ..Self::default()
        }
    }

    /// Best available title: `<title>`, then OpenGraph, then Twitter
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or(self.og_title.as_deref())
            .or(self.twitter_title.as_deref())
    }

    /// Best available description
    pub fn display_description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or(self.og_description.as_deref())
            .or(self.twitter_description.as_deref())
    }
}

#[derive(Debug, Default)]
struct MetadataState {
    metadata: PageMetadata,
    titles_seen: usize,
    title_text: String,
    touch_icon: Option<String>,
}

/// Captures `<html lang>`, `<title>`, `<meta>` and `<link>` data
///
/// Handlers never abort the rewrite. A failure is recorded and reported by
/// [`MetadataHandler::finish`] so the caller can fall back to
/// [`PageMetadata::placeholder`].
#[derive(Debug, Default)]
pub struct MetadataHandler {
    state: RefCell<MetadataState>,
    failed: Cell<bool>,
}

impl MetadataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalizes the metadata, resolving relative URLs against `base`
    pub fn finish(self, base: &Url) -> Result<PageMetadata, CleanError> {
        if self.failed.get() {
            return Err(CleanError::Metadata(
                "handler state was unavailable during the pass".to_string(),
            ));
        }

        let state = self.state.into_inner();
        let mut metadata = state.metadata;

        let title = decode_html_entities(state.title_text.trim()).into_owned();
        if !title.is_empty() {
            metadata.title = Some(title);
        }
        if metadata.favicon.is_none() {
            metadata.favicon = state.touch_icon;
        }

        for field in [
            &mut metadata.favicon,
            &mut metadata.og_image,
            &mut metadata.twitter_image,
            &mut metadata.canonical,
        ] {
            if let Some(value) = field.as_mut() {
                *value = normalize_url(value, base, false);
            }
        }

        metadata.source_url = base.to_string();
        Ok(metadata)
    }

    fn capture_meta(metadata: &mut PageMetadata, key: &str, content: String) {
        let slot = match key {
            "description" => &mut metadata.description,
            "robots" => &mut metadata.robots,
            "author" => &mut metadata.author,
            "keywords" => &mut metadata.keywords,
            "og:title" => &mut metadata.og_title,
            "og:description" => &mut metadata.og_description,
            "og:image" => &mut metadata.og_image,
            "og:url" => &mut metadata.og_url,
            "og:type" => &mut metadata.og_type,
            "og:site_name" => &mut metadata.og_site_name,
            "twitter:card" => &mut metadata.twitter_card,
            "twitter:title" => &mut metadata.twitter_title,
            "twitter:description" => &mut metadata.twitter_description,
            "twitter:image" => &mut metadata.twitter_image,
            "twitter:site" => &mut metadata.twitter_site,
            "twitter:creator" => &mut metadata.twitter_creator,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(content);
        }
    }
}

impl ElementHandler for MetadataHandler {
    fn selectors(&self) -> Vec<String> {
        vec![
            "html".to_string(),
            "title".to_string(),
            "meta".to_string(),
            "link".to_string(),
        ]
    }

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            self.failed.set(true);
            return Ok(());
        };

        match element.tag_name().as_str() {
            "html" => {
                if let Some(lang) = element.get_attribute("lang") {
                    let lang = lang.trim();
                    if !lang.is_empty() {
                        state.metadata.language = Some(lang.to_string());
                    }
                }
            }
            "title" => state.titles_seen += 1,
            "meta" => {
                let key = element
                    .get_attribute("name")
                    .or_else(|| element.get_attribute("property"))
                    .map(|k| k.trim().to_lowercase());
                let content = element
                    .get_attribute("content")
                    .map(|c| decode_html_entities(c.trim()).into_owned());
                if let (Some(key), Some(content)) = (key, content) {
                    if !content.is_empty() {
                        Self::capture_meta(&mut state.metadata, &key, content);
                    }
                }
            }
            "link" => {
                let rel = element
                    .get_attribute("rel")
                    .map(|r| r.to_lowercase())
                    .unwrap_or_default();
                let Some(href) = element.get_attribute("href") else {
                    return Ok(());
                };
                let href = decode_html_entities(href.trim()).into_owned();
                let tokens: Vec<&str> = rel.split_whitespace().collect();

                if tokens.contains(&"canonical") && state.metadata.canonical.is_none() {
                    state.metadata.canonical = Some(href);
                } else if tokens.contains(&"icon") && state.metadata.favicon.is_none() {
                    state.metadata.favicon = Some(href);
                } else if tokens.contains(&"apple-touch-icon") && state.touch_icon.is_none() {
                    state.touch_icon = Some(href);
                }
            }
            _ => {}
        }

        Ok(())
    }
}

impl TextHandler for MetadataHandler {
    fn text_selectors(&self) -> Vec<String> {
        vec!["title".to_string()]
    }

    fn handle_text(&self, chunk: &mut TextChunk<'_>) -> HandlerResult {
        let Ok(mut state) = self.state.try_borrow_mut() else {
            self.failed.set(true);
            return Ok(());
        };
        if state.titles_seen == 1 {
            state.title_text.push_str(chunk.as_str());
        }
        Ok(())
    }
}
