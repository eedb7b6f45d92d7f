//! Storage traits and error types
//!
//! This module defines the trait interfaces for the three storage concerns of
//! the reader: the key/value response cache, the content-addressed response
//! records, and the activity log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by key/value backends
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KvError {
    /// The backend refused the write because of its own rate limit
    #[error("Key/value backend rate limited the request")]
    RateLimited,

    #[error("Key/value backend error: {0}")]
    Backend(String),
}

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Metadata stored next to a cached value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvMetadata {
    /// Unix milliseconds at which the value was produced
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Options for a key/value write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOptions {
    /// Seconds until the entry expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<KvMetadata>,
}

/// A cached response as held by the key/value backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub key: String,
    pub value: Vec<u8>,
    pub stored_at: DateTime<Utc>,
    pub metadata: Option<KvMetadata>,
}

/// Trait for key/value cache backends
///
/// Entries expire by backend TTL and are overwritten wholesale on `put`.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Gets an unexpired entry with its metadata
    async fn get_entry(&self, key: &str) -> Result<Option<CachedResponse>, KvError>;

    /// Gets the raw value of an unexpired entry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.get_entry(key).await?.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: &[u8], options: &PutOptions) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// A content-addressed response record
///
/// `response_hash` identifies the content; once stored, `content` never
/// changes and only `updated_at`/`updated_by` move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRecord {
    pub response_hash: String,
    pub path: String,
    pub options_hash: String,
    pub content: String,
    pub size: i64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Trait for response record persistence
pub trait ResponseStore: Send + Sync {
    /// Finds a record by its content hash
    fn find_by_hash(&self, response_hash: &str) -> StorageResult<Option<ResponseRecord>>;

    /// Inserts a record; an existing record with the same hash only has its
    /// timestamps touched
    fn insert(&self, record: &ResponseRecord) -> StorageResult<()>;

    /// Updates `updated_at`/`updated_by` of an existing record
    fn touch(
        &self,
        response_hash: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> StorageResult<()>;
}

/// One served request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: Option<String>,
    pub operation: String,
    pub target_url: String,
    pub status: u16,
    pub cached: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Trait for the request activity log
pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: &ActivityEntry) -> StorageResult<()>;

    /// Most recent entries first
    fn recent(&self, limit: usize) -> StorageResult<Vec<ActivityEntry>>;
}
