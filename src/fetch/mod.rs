//! Target page fetching
//!
//! This module handles all outbound requests for target pages, including:
//! - Building HTTP clients with the configured user agent and timeouts
//! - Rejecting non-HTML responses
//! - Enforcing the body size limit
//! - Error classification

mod client;

pub use client::{build_http_client, HttpFetcher};

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while fetching a target page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Upstream responded with HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Expected an HTML page, got '{content_type}'")]
    ContentMismatch { content_type: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Page exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_connect() {
            FetchError::Network(format!("Connection refused: {}", e))
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// A fetched HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub html: String,
}

/// Source of target pages
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}
