//! In-memory storage backends
//!
//! Used when no database path is configured and throughout the tests. State
//! is not persisted across restarts.

use crate::clock::Clock;
use crate::storage::traits::{
    ActivityEntry, ActivityLog, CachedResponse, KvError, KvStore, PutOptions, ResponseRecord,
    ResponseStore, StorageError, StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone)]
struct KvEntry {
    response: CachedResponse,
    expires_at_ms: Option<i64>,
}

/// Key/value cache held in a map, honouring TTLs on read
pub struct MemoryKvStore {
    entries: tokio::sync::RwLock<HashMap<String, KvEntry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKvStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: tokio::sync::RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get_entry(&self, key: &str) -> Result<Option<CachedResponse>, KvError> {
        let now = self.clock.now_ms();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at_ms.map(|at| at > now).unwrap_or(true) => {
                    return Ok(Some(entry.response.clone()));
                }
                Some(_) => {}
            }
        }

        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: &[u8], options: &PutOptions) -> Result<(), KvError> {
        let now = self.clock.now_ms();
        let entry = KvEntry {
            response: CachedResponse {
                key: key.to_string(),
                value: value.to_vec(),
                stored_at: self.clock.now(),
                metadata: options.metadata.clone(),
            },
            expires_at_ms: options
                .expiration_ttl
                .map(|ttl| now + (ttl as i64).saturating_mul(1000)),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::Database("in-memory store lock poisoned".to_string())
}

/// Response records held in a map keyed by content hash
#[derive(Debug, Default)]
pub struct MemoryResponseStore {
    records: RwLock<HashMap<String, ResponseRecord>>,
}

impl MemoryResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseStore for MemoryResponseStore {
    fn find_by_hash(&self, response_hash: &str) -> StorageResult<Option<ResponseRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(response_hash).cloned())
    }

    fn insert(&self, record: &ResponseRecord) -> StorageResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records
            .entry(record.response_hash.clone())
            .and_modify(|existing| {
                existing.updated_at = record.updated_at;
                existing.updated_by = record.updated_by.clone();
            })
            .or_insert_with(|| record.clone());
        Ok(())
    }

    fn touch(
        &self,
        response_hash: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> StorageResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if let Some(existing) = records.get_mut(response_hash) {
            existing.updated_at = updated_at;
            existing.updated_by = updated_by.to_string();
        }
        Ok(())
    }
}

/// Activity log held in a vector
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityLog for MemoryActivityLog {
    fn record(&self, entry: &ActivityEntry) -> StorageResult<()> {
        self.entries
            .lock()
            .map_err(|_| poisoned())?
            .push(entry.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<ActivityEntry>> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_memory_kv_ttl_honoured_on_read() {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryKvStore::new(clock.clone());
        let options = PutOptions {
            expiration_ttl: Some(60),
            metadata: None,
        };
        store.put("k", b"v", &options).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance_secs(60);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_memory_records_keep_first_content() {
        let store = MemoryResponseStore::new();
        let mut record = ResponseRecord {
            response_hash: "h".to_string(),
            path: "/read".to_string(),
            options_hash: "o".to_string(),
            content: "first".to_string(),
            size: 5,
            updated_at: Utc::now(),
            updated_by: "a".to_string(),
        };
        store.insert(&record).unwrap();
        record.content = "second".to_string();
        record.updated_by = "b".to_string();
        store.insert(&record).unwrap();

        let found = store.find_by_hash("h").unwrap().unwrap();
        assert_eq!(found.content, "first");
        assert_eq!(found.updated_by, "b");
        assert_eq!(store.len(), 1);
    }
}
