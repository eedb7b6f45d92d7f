//! Process-local cache of resolved API-key sessions

use super::session::Session;
use crate::cache::sha256_hex;
use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct AuthCacheEntry {
    session: Session,
    cached_at_ms: i64,
}

/// Sessions keyed by a hash of the credential that produced them
///
/// An entry is trusted only while both its TTL and its session are
/// unexpired; stale entries are evicted on read.
pub struct AuthCache {
    entries: Mutex<HashMap<String, AuthCacheEntry>>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl AuthCache {
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: (ttl_secs as i64).saturating_mul(1000),
            clock,
        }
    }

    fn key(material: &str) -> String {
        sha256_hex(material.as_bytes())
    }

    pub fn get(&self, material: &str) -> Option<Session> {
        let key = Self::key(material);
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries.lock().ok()?;

        let entry = entries.get(&key)?;
        let fresh = now_ms - entry.cached_at_ms < self.ttl_ms;
        if fresh && entry.session.is_live(self.clock.now()) {
            return Some(entry.session.clone());
        }

        entries.remove(&key);
        tracing::debug!("Evicted stale auth cache entry");
        None
    }

    pub fn insert(&self, material: &str, session: &Session) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                Self::key(material),
                AuthCacheEntry {
                    session: session.clone(),
                    cached_at_ms: self.clock.now_ms(),
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
