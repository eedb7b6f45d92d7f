//! Streaming HTML cleaning
//!
//! A single forward pass over the page with [`lol_html`]. Each concern
//! (tag filtering, link normalization, metadata capture, link collection) is
//! a handler implementing [`ElementHandler`] and/or [`TextHandler`]; the
//! engine registers all of them against one rewriter.

mod filter;
mod links;
mod metadata;
mod selectors;

pub use filter::TagFilterHandler;
pub use links::{LinkCollector, LinkNormalizeHandler};
pub use metadata::{MetadataHandler, PageMetadata};
pub use selectors::{active_selectors, Pattern, RemovalGroup, RemovalRule, DEFAULT_RULES};

use lol_html::html_content::{Element, TextChunk};
use lol_html::{ElementContentHandlers, HtmlRewriter, Selector, Settings};
use std::borrow::Cow;
use thiserror::Error;
use url::Url;

/// Result type returned by streaming handlers
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Errors raised while cleaning a page
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("HTML rewrite failed: {0}")]
    Rewrite(String),

    #[error("Rewritten HTML is not valid UTF-8")]
    Encoding,

    #[error("Metadata extraction failed: {0}")]
    Metadata(String),
}

/// A handler invoked for every element matching one of its selectors
pub trait ElementHandler {
    /// CSS selectors this handler is registered against
    fn selectors(&self) -> Vec<String>;

    fn handle_element(&self, element: &mut Element<'_, '_>) -> HandlerResult;
}

/// A handler invoked for text chunks inside elements matching its selectors
pub trait TextHandler {
    fn text_selectors(&self) -> Vec<String>;

    fn handle_text(&self, chunk: &mut TextChunk<'_>) -> HandlerResult;
}

/// Options for one cleaning pass
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    /// Also remove headers, footers and sidebars
    pub exclude_non_main_tags: bool,
    /// Extra CSS selectors to remove
    pub remove_selectors: Vec<String>,
}

/// Output of a cleaning pass
#[derive(Debug, Clone)]
pub struct CleanedPage {
    pub html: String,
    pub metadata: PageMetadata,
}

/// Output of a link extraction pass
#[derive(Debug, Clone)]
pub struct ExtractedLinks {
    /// Absolute http(s) links in document order, deduplicated
    pub links: Vec<String>,
    pub metadata: PageMetadata,
}

/// Runs the removal rules, link normalizer and metadata extractor in one pass
#[derive(Debug, Clone)]
pub struct CleaningEngine {
    rules: Vec<RemovalRule>,
}

impl Default for CleaningEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl CleaningEngine {
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }

    pub fn with_rules(rules: Vec<RemovalRule>) -> Self {
        Self { rules }
    }

    /// Cleans a page fetched from `base`
    ///
    /// # Arguments
    ///
    /// * `html` - Raw page markup
    /// * `base` - Final URL of the page, used to absolutize links
    /// * `options` - Per-request cleaning options
    ///
    /// # Returns
    ///
    /// * `Ok(CleanedPage)` - Cleaned markup plus metadata
    /// * `Err(CleanError)` - An extra selector was invalid or the rewriter failed
    pub fn clean(
        &self,
        html: &str,
        base: &Url,
        options: &CleanOptions,
    ) -> Result<CleanedPage, CleanError> {
        let filter = TagFilterHandler::new(active_selectors(
            &self.rules,
            options.exclude_non_main_tags,
            &options.remove_selectors,
        ));
        let normalizer = LinkNormalizeHandler::new(base.clone());
        let metadata = MetadataHandler::new();

        let element_handlers: [&dyn ElementHandler; 3] = [&metadata, &filter, &normalizer];
        let html = rewrite(html, &element_handlers, &[&metadata as &dyn TextHandler])?;

        Ok(CleanedPage {
            html,
            metadata: finish_metadata(metadata, base),
        })
    }

    /// Collects every anchor target of a page, navigation included
    pub fn extract_links(&self, html: &str, base: &Url) -> Result<ExtractedLinks, CleanError> {
        let metadata = MetadataHandler::new();
        let collector = LinkCollector::new(base.clone());

        let element_handlers: [&dyn ElementHandler; 2] = [&metadata, &collector];
        rewrite(html, &element_handlers, &[&metadata as &dyn TextHandler])?;

        Ok(ExtractedLinks {
            links: collector.into_links(),
            metadata: finish_metadata(metadata, base),
        })
    }
}

fn finish_metadata(handler: MetadataHandler, base: &Url) -> PageMetadata {
    handler.finish(base).unwrap_or_else(|e| {
        tracing::warn!(url = %base, error = %e, "Metadata extraction degraded");
        PageMetadata::placeholder(base)
    })
}

/// Runs one rewriter pass with the given handlers
pub fn rewrite(
    html: &str,
    element_handlers: &[&dyn ElementHandler],
    text_handlers: &[&dyn TextHandler],
) -> Result<String, CleanError> {
    let mut element_content_handlers = Vec::new();

    for &handler in element_handlers {
        for raw in handler.selectors() {
            let selector = parse_selector(&raw)?;
            element_content_handlers.push((
                Cow::Owned(selector),
                ElementContentHandlers::default().element(move |el| handler.handle_element(el)),
            ));
        }
    }

    for &handler in text_handlers {
        for raw in handler.text_selectors() {
            let selector = parse_selector(&raw)?;
            element_content_handlers.push((
                Cow::Owned(selector),
                ElementContentHandlers::default().text(move |chunk| handler.handle_text(chunk)),
            ));
        }
    }

    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter
        .write(html.as_bytes())
        .map_err(|e| CleanError::Rewrite(e.to_string()))?;
    rewriter
        .end()
        .map_err(|e| CleanError::Rewrite(e.to_string()))?;

    String::from_utf8(output).map_err(|_| CleanError::Encoding)
}

fn parse_selector(raw: &str) -> Result<Selector, CleanError> {
    raw.parse::<Selector>().map_err(|e| CleanError::Selector {
        selector: raw.to_string(),
        message: e.to_string(),
    })
}
