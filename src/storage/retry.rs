//! Retry wrapper for key/value writes
//!
//! Only the backend's "rate limited" error is retried, with exponential
//! backoff. Every other error propagates on the first attempt.

use crate::storage::traits::{KvError, KvStore, PutOptions, StorageError, StorageResult};
use std::sync::Arc;
use std::time::Duration;

/// Entries never live shorter than this
pub const MIN_TTL_SECS: u64 = 60;

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second attempt; doubles after every failure
    pub base_delay: Duration,
    /// Total attempts, the first one included
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(20);
        self.base_delay.saturating_mul(factor)
    }
}

enum KvWrite<'a> {
    Put {
        key: &'a str,
        value: &'a [u8],
        options: &'a PutOptions,
    },
    Delete {
        key: &'a str,
    },
}

impl KvWrite<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Delete { .. } => "delete",
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Wraps a [`KvStore`] so writes survive transient backend rate limits
#[derive(Clone)]
pub struct StorageRetry {
    kv: Arc<dyn KvStore>,
    policy: RetryPolicy,
}

impl StorageRetry {
    pub fn new(kv: Arc<dyn KvStore>, policy: RetryPolicy) -> Self {
        Self { kv, policy }
    }

    /// The wrapped store, for reads
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Writes `value` under `key`, flooring the TTL at [`MIN_TTL_SECS`]
    pub async fn put(&self, key: &str, value: &[u8], options: &PutOptions) -> StorageResult<()> {
        let options = PutOptions {
            expiration_ttl: options.expiration_ttl.map(|ttl| ttl.max(MIN_TTL_SECS)),
            metadata: options.metadata.clone(),
        };
        self.run(KvWrite::Put {
            key,
            value,
            options: &options,
        })
        .await
    }

    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        self.run(KvWrite::Delete { key }).await
    }

    async fn run(&self, write: KvWrite<'_>) -> StorageResult<()> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match &write {
                KvWrite::Put {
                    key,
                    value,
                    options,
                } => self.kv.put(key, value, options).await,
                KvWrite::Delete { key } => self.kv.delete(key).await,
            };

            match result {
                Ok(()) => return Ok(()),
                Err(KvError::RateLimited) if attempt < max_attempts => {
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::debug!(
                        operation = write.name(),
                        key = write.key(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Storage rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(KvError::RateLimited) => {
                    tracing::warn!(
                        operation = write.name(),
                        key = write.key(),
                        attempts = attempt,
                        "Storage retries exhausted"
                    );
                    return Err(StorageError::RetriesExhausted {
                        operation: write.name().to_string(),
                        attempts: attempt,
                        last_error: KvError::RateLimited.to_string(),
                    });
                }
                Err(e) => return Err(StorageError::Kv(e)),
            }
        }
    }
}
