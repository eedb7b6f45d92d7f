use crate::config::FetchConfig;
use crate::fetch::{FetchError, FetchedPage, Fetcher};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, Response};
use std::time::Duration;

/// Content types accepted as HTML
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_reader::config::FetchConfig;
/// use sumi_reader::fetch::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches target pages over HTTP
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, config.max_body_bytes))
    }

    pub fn with_client(client: Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }

    /// Reads the body, stopping as soon as it passes the size limit
    async fn read_limited(&self, mut response: Response) -> Result<Vec<u8>, FetchError> {
        if let Some(length) = response.content_length() {
            if length as usize > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

fn is_html(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    HTML_CONTENT_TYPES.contains(&essence.as_str())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches `url` and returns its HTML
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Non-2xx status | `Status` |
    /// | Non-HTML content type | `ContentMismatch` |
    /// | Body over the limit | `TooLarge` |
    /// | Timeout | `Timeout` |
    /// | Connection failure | `Network` |
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            tracing::debug!(url, status = status.as_u16(), "Upstream returned an error status");
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Missing content type is treated as HTML
        if !content_type.is_empty() && !is_html(&content_type) {
            return Err(FetchError::ContentMismatch { content_type });
        }

        let body = self.read_limited(response).await?;
        tracing::debug!(url, final_url = %final_url, bytes = body.len(), "Fetched page");

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            html: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
