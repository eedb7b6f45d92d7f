//! Storage module for cached responses, response records and request logs
//!
//! This module handles all persistence for the reader, including:
//! - SQLite database initialization and schema management
//! - The key/value response cache and its retrying write wrapper
//! - Content-addressed response records
//! - The request activity log

mod memory;
mod retry;
mod schema;
mod sqlite;
mod traits;

pub use memory::{MemoryActivityLog, MemoryKvStore, MemoryResponseStore};
pub use retry::{RetryPolicy, StorageRetry, MIN_TTL_SECS};
pub use schema::initialize_schema;
pub use sqlite::{Database, SqliteActivityLog, SqliteKvStore, SqliteResponseStore};
pub use traits::{
    ActivityEntry, ActivityLog, CachedResponse, KvError, KvMetadata, KvStore, PutOptions,
    ResponseRecord, ResponseStore, StorageError, StorageResult,
};

use crate::clock::Clock;
use std::path::Path;
use std::sync::Arc;

/// The storage backends used by the request pipeline
#[derive(Clone)]
pub struct StorageBackends {
    pub kv: Arc<dyn KvStore>,
    pub records: Arc<dyn ResponseStore>,
    pub activity: Arc<dyn ActivityLog>,
}

impl StorageBackends {
    /// SQLite-backed storage at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `clock` - Clock used for cache expiry
    ///
    /// # Returns
    ///
    /// * `Ok(StorageBackends)` - Successfully opened storage
    /// * `Err(StorageError)` - Failed to open the database
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let db = Database::open(path)?;
        Ok(Self {
            kv: Arc::new(SqliteKvStore::new(db.clone(), clock)),
            records: Arc::new(SqliteResponseStore::new(db.clone())),
            activity: Arc::new(SqliteActivityLog::new(db)),
        })
    }

    /// Process-local storage
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            kv: Arc::new(MemoryKvStore::new(clock)),
            records: Arc::new(MemoryResponseStore::new()),
            activity: Arc::new(MemoryActivityLog::new()),
        }
    }
}
