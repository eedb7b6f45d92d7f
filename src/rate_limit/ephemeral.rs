//! Process-local memory of recent denials
//!
//! Lets a limiter refuse a blocked identifier without asking the backend
//! again. Entries may be dropped at any time; the backend stays authoritative.

use std::collections::HashMap;
use std::sync::Mutex;

/// Blocked keys with the Unix millisecond at which they unblock
#[derive(Debug, Default)]
pub struct EphemeralCache {
    blocked: Mutex<HashMap<String, i64>>,
}

impl EphemeralCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset time of a still-blocked key; expired entries are removed
    pub fn blocked_until(&self, key: &str, now_ms: i64) -> Option<i64> {
        let mut blocked = self.blocked.lock().ok()?;
        match blocked.get(key).copied() {
            Some(reset) if reset > now_ms => Some(reset),
            Some(_) => {
                blocked.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn block(&self, key: &str, reset_ms: i64) {
        if let Ok(mut blocked) = self.blocked.lock() {
            blocked.insert(key.to_string(), reset_ms);
        }
    }

    /// Removes every entry whose block has lapsed by `now_ms`
    pub fn sweep(&self, now_ms: i64) -> usize {
        let Ok(mut blocked) = self.blocked.lock() else {
            return 0;
        };
        let before = blocked.len();
        blocked.retain(|_, reset| *reset > now_ms);
        before - blocked.len()
    }

    pub fn clear(&self) {
        if let Ok(mut blocked) = self.blocked.lock() {
            blocked.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.blocked.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
