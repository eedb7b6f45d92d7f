//! Ways of reaching the identity service
//!
//! Strategies depend on these traits rather than on a concrete client so a
//! deployment can plug in an in-process lookup or a service binding next to
//! plain HTTP.

use super::session::SessionPayload;
use super::AuthError;
use crate::config::AuthConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, COOKIE};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// In-process session lookup by API key
#[async_trait]
pub trait SessionLookup: Send + Sync {
    /// `Ok(None)` means the key is unknown
    async fn lookup_api_key(&self, key: &str) -> Result<Option<SessionPayload>, AuthError>;
}

/// Cookie-aware session client
#[async_trait]
pub trait CookieSessionClient: Send + Sync {
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionPayload>, AuthError>;
}

/// Raw request to the identity service's session endpoint
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Sends `headers` to the session endpoint and returns the response body
    async fn fetch_session(&self, headers: &HeaderMap) -> Result<Vec<u8>, AuthError>;
}

/// Headers that must not be forwarded to the identity service
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "keep-alive",
    "upgrade",
];

/// Talks to the identity service over HTTP
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    client: Client,
    session_url: Url,
}

impl HttpIdentityClient {
    /// # Arguments
    ///
    /// * `base_url` - Identity service base URL
    /// * `session_path` - Path of the session endpoint
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: &str, session_path: &str, timeout: Duration) -> Result<Self, AuthError> {
        let session_url = Url::parse(base_url)
            .and_then(|base| base.join(session_path))
            .map_err(|e| AuthError::Config(format!("Invalid identity URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            session_url,
        })
    }

    /// Client for the configured identity service, if one is configured
    pub fn from_config(config: &AuthConfig) -> Result<Option<Self>, AuthError> {
        config
            .identity_base_url
            .as_deref()
            .map(|base| {
                Self::new(
                    base,
                    &config.session_path,
                    Duration::from_secs(config.request_timeout_secs),
                )
            })
            .transpose()
    }

    pub fn session_url(&self) -> &Url {
        &self.session_url
    }
}

/// Copies `headers` minus hop-by-hop ones
fn forwardable(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[async_trait]
impl SessionTransport for HttpIdentityClient {
    async fn fetch_session(&self, headers: &HeaderMap) -> Result<Vec<u8>, AuthError> {
        let response = self
            .client
            .get(self.session_url.clone())
            .headers(forwardable(headers))
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl CookieSessionClient for HttpIdentityClient {
    /// Forwards only the cookie header
    async fn get_session(&self, headers: &HeaderMap) -> Result<Option<SessionPayload>, AuthError> {
        let mut cookie_only = HeaderMap::new();
        for value in headers.get_all(COOKIE) {
            cookie_only.append(HeaderName::from_static("cookie"), value.clone());
        }
        let body = self.fetch_session(&cookie_only).await?;
        Ok(SessionPayload::parse(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_session_url_joined() {
        let client = HttpIdentityClient::new(
            "https://id.example.com",
            "/api/auth/get-session",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.session_url().as_str(),
            "https://id.example.com/api/auth/get-session"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("reader.example.com"));
        headers.insert("cookie", HeaderValue::from_static("session=abc"));

        let forwarded = forwardable(&headers);
        assert!(forwarded.get("host").is_none());
        assert_eq!(forwarded.get("cookie").unwrap(), "session=abc");
    }
}
