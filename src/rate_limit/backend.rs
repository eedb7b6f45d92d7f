//! Pluggable backend trait for sliding-window rate limiting.
//!
//! The backend owns the windows; callers only build keys and interpret the
//! allow/deny result with its reset time.

use async_trait::async_trait;

/// Errors from rate limit backend operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// A limit over a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window_ms: i64,
}

impl From<crate::config::QuotaConfig> for Quota {
    fn from(config: crate::config::QuotaConfig) -> Self {
        Self {
            limit: config.limit,
            window_ms: (config.window_secs as i64).saturating_mul(1000),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix milliseconds at which a slot frees up
    pub reset_ms: i64,
    /// Requests counted in the current window
    pub count: u32,
}

/// Trait for rate limit storage backends.
///
/// Implementations must be thread-safe and handle concurrent access.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Counts one request against `key` and reports whether it is admitted.
    async fn limit(&self, key: &str, quota: &Quota) -> Result<WindowResult, BackendError>;

    /// Forgets state that no longer affects any decision; returns how many
    /// keys were dropped. Backends that expire on their own keep the default.
    async fn sweep(&self) -> usize {
        0
    }
}
