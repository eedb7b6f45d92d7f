//! Per-operation, per-caller rate limiting
//!
//! Each `(operation, identifier)` pair is admitted against a sliding window
//! whose quota depends on the caller's tier. Denials are remembered in an
//! injected [`EphemeralCache`] so a blocked caller does not reach the backend
//! again until its window resets.

mod backend;
mod ephemeral;
mod sliding;

pub use backend::{BackendError, Quota, RateLimitBackend, WindowResult};
pub use ephemeral::EphemeralCache;
pub use sliding::SlidingWindowBackend;

use crate::auth::Session;
use crate::clock::Clock;
use crate::config::RateLimitConfig;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for {operation}, retry after {retry_after_seconds}s")]
    Exceeded {
        operation: String,
        retry_after_seconds: u64,
        /// Requests counted in the window, when the backend reported it
        hits: Option<u32>,
    },
}

impl RateLimitError {
    /// Body of a 429 response
    pub fn body(&self) -> RateLimitBody {
        match self {
            Self::Exceeded {
                operation,
                retry_after_seconds,
                ..
            } => RateLimitBody {
                operation: operation.clone(),
                retry_after_seconds: *retry_after_seconds,
            },
        }
    }

    pub fn retry_after_seconds(&self) -> u64 {
        match self {
            Self::Exceeded {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
        }
    }
}

/// Wire shape of a denial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    pub operation: String,
    pub retry_after_seconds: u64,
}

/// Caller classification selecting a quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    pub fn for_session(session: Option<&Session>) -> Self {
        match session.and_then(Session::plan) {
            Some(plan) if plan.eq_ignore_ascii_case("pro") => Self::Pro,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
        }
    }
}

/// `{userId|anonymous}:{ip|unknown}`
pub fn identifier(session: Option<&Session>, client_ip: Option<&str>) -> String {
    let user = session.map(|s| s.user_id.as_str()).unwrap_or("anonymous");
    let ip = client_ip.filter(|ip| !ip.is_empty()).unwrap_or("unknown");
    format!("{}:{}", user, ip)
}

/// Whole seconds until `reset_ms`, rounded up and never negative
pub fn retry_after_seconds(reset_ms: i64, now_ms: i64) -> u64 {
    let remaining = (reset_ms - now_ms).max(0) as u64;
    remaining.div_ceil(1000)
}

/// Admits or denies requests per operation and caller
pub struct RateLimiter {
    backend: Arc<dyn RateLimitBackend>,
    quotas: RateLimitConfig,
    cache: Arc<EphemeralCache>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// # Arguments
    ///
    /// * `backend` - Authoritative window store
    /// * `quotas` - Operation to tier to quota table
    /// * `cache` - Denial cache, shared for the life of the process
    /// * `clock` - Time source for retry hints
    pub fn new(
        backend: Arc<dyn RateLimitBackend>,
        quotas: RateLimitConfig,
        cache: Arc<EphemeralCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            quotas,
            cache,
            clock,
        }
    }

    /// Checks one request for `operation`
    ///
    /// Operations without a quota are always admitted. Backend failures admit
    /// the request and are logged.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The request may proceed
    /// * `Err(RateLimitError::Exceeded)` - The caller must wait
    pub async fn check(
        &self,
        operation: &str,
        session: Option<&Session>,
        client_ip: Option<&str>,
    ) -> Result<(), RateLimitError> {
        let tier = Tier::for_session(session);
        let Some(quota) = self
            .quotas
            .quota(operation, tier.as_str())
            .or_else(|| self.quotas.quota(operation, Tier::Free.as_str()))
        else {
            tracing::debug!(operation, "No quota configured, admitting");
            return Ok(());
        };

        let key = format!("{}:{}", operation, identifier(session, client_ip));
        let now = self.clock.now_ms();

        if let Some(reset_ms) = self.cache.blocked_until(&key, now) {
            tracing::debug!(operation, key = %key, "Denied from ephemeral cache");
            return Err(RateLimitError::Exceeded {
                operation: operation.to_string(),
                retry_after_seconds: retry_after_seconds(reset_ms, now),
                hits: None,
            });
        }

        let result = match self.backend.limit(&key, &Quota::from(quota)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(operation, error = %e, "Rate limit backend failed, admitting");
                return Ok(());
            }
        };

        if result.success {
            return Ok(());
        }

        self.cache.block(&key, result.reset_ms);
        let retry_after = retry_after_seconds(result.reset_ms, self.clock.now_ms());
        tracing::info!(
            operation,
            tier = tier.as_str(),
            retry_after,
            "Rate limit exceeded"
        );

        Err(RateLimitError::Exceeded {
            operation: operation.to_string(),
            retry_after_seconds: retry_after,
            hits: Some(result.count),
        })
    }

    /// Drops lapsed denials and idle windows
    pub async fn sweep(&self) -> usize {
        let blocks = self.cache.sweep(self.clock.now_ms());
        let windows = self.backend.sweep().await;
        if blocks + windows > 0 {
            tracing::debug!(blocks, windows, "Swept rate limit state");
        }
        blocks + windows
    }
}
