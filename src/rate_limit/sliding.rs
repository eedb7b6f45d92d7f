//! In-memory sliding-window backend for single-process operation.
//!
//! Keeps the admitted request times of every key. State is not persisted
//! across restarts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::backend::{BackendError, Quota, RateLimitBackend, WindowResult};
use crate::clock::Clock;

/// Admitted request times of one key and the window they were counted in.
#[derive(Debug, Default)]
struct Window {
    hits: VecDeque<i64>,
    window_ms: i64,
}

impl Window {
    /// Expires requests that slid out of the window
    fn trim(&mut self, now: i64) {
        let cutoff = now - self.window_ms;
        while self.hits.front().map(|&at| at <= cutoff).unwrap_or(false) {
            self.hits.pop_front();
        }
    }
}

/// Sliding-window log keyed by `{operation}:{identifier}`.
#[derive(Clone)]
pub struct SlidingWindowBackend {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Keys currently tracked.
    pub async fn len(&self) -> usize {
        self.windows.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RateLimitBackend for SlidingWindowBackend {
    async fn limit(&self, key: &str, quota: &Quota) -> Result<WindowResult, BackendError> {
        let now = self.clock.now_ms();

        let mut windows = self.windows.lock().await;
        let window = windows.entry(key.to_string()).or_default();
        window.window_ms = quota.window_ms;
        window.trim(now);

        let success = (window.hits.len() as u32) < quota.limit;
        if success {
            window.hits.push_back(now);
        }

        let count = window.hits.len() as u32;
        let reset_ms = window
            .hits
            .front()
            .map(|&oldest| oldest + quota.window_ms)
            .unwrap_or(now + quota.window_ms);

        if window.hits.is_empty() {
            windows.remove(key);
        }

        Ok(WindowResult {
            success,
            limit: quota.limit,
            remaining: quota.limit.saturating_sub(count),
            reset_ms,
            count,
        })
    }

    /// Drops keys with no request left in their window.
    async fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| {
            window.trim(now);
            !window.hits.is_empty()
        });
        before - windows.len()
    }
}
