//! The strategy seam of the auth chain

use super::session::Session;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, COOKIE};

/// Result of one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// A live session was established
    Resolved(Session),
    /// The request carries no credential for this strategy
    Skip,
    /// A credential was present but could not be turned into a session
    Unavailable,
}

/// One way of turning request headers into a session
///
/// Strategies never fail; problems are logged and reported as
/// [`StrategyOutcome::Unavailable`].
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, headers: &HeaderMap) -> StrategyOutcome;
}

/// Token of an `Authorization: Bearer` header, scheme matched case-insensitively
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(char::is_whitespace)?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// API key from `x-api-key`, else from a bearer token
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .or_else(|| bearer_token(headers))
}

pub fn has_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(COOKIE)
        .iter()
        .any(|v| !v.as_bytes().is_empty())
}
