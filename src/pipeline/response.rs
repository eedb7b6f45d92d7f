//! Transport-neutral pipeline responses

use crate::rate_limit::RateLimitError;
use serde_json::Value;

/// Whether a response came from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    /// Value of the `x-cache` header
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

/// A JSON response ready for the HTTP layer
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub status: u16,
    /// Serialized JSON; cache hits carry the stored bytes unchanged
    pub body: Vec<u8>,
    pub cache: Option<CacheStatus>,
    /// Seconds for the `Retry-After` header
    pub retry_after: Option<u64>,
}

impl PipelineResponse {
    pub(crate) fn json(status: u16, body: &Value, cache: Option<CacheStatus>) -> Self {
        Self {
            status,
            body: serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec()),
            cache,
            retry_after: None,
        }
    }

    pub(crate) fn hit(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            cache: Some(CacheStatus::Hit),
            retry_after: None,
        }
    }

    pub(crate) fn miss(body: &Value) -> Self {
        Self::json(200, body, Some(CacheStatus::Miss))
    }

    pub(crate) fn rate_limited(error: &RateLimitError) -> Self {
        let body = serde_json::to_value(error.body()).unwrap_or_default();
        Self {
            retry_after: Some(error.retry_after_seconds()),
            ..Self::json(429, &body, None)
        }
    }

    /// Parsed body, if it is valid JSON
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
