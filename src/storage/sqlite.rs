//! SQLite storage implementation
//!
//! One [`Database`] handle is shared by the cache, record and activity log
//! backends. Each backend locks the connection for the duration of a single
//! statement.

use crate::clock::Clock;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ActivityEntry, ActivityLog, CachedResponse, KvError, KvMetadata, KvStore, PutOptions,
    ResponseRecord, ResponseStore, StorageError, StorageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Shared SQLite connection
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(Database)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> StorageResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))?;
        Ok(f(&conn)?)
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn to_kv_error(error: StorageError) -> KvError {
    match error {
        StorageError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            KvError::RateLimited
        }
        other => KvError::Backend(other.to_string()),
    }
}

/// Key/value cache stored in the `kv_entries` table
///
/// A busy or locked database is reported as [`KvError::RateLimited`] so the
/// retry wrapper backs off instead of failing the write.
pub struct SqliteKvStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteKvStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Removes every expired entry, returning how many were dropped
    pub fn purge_expired(&self) -> StorageResult<usize> {
        let now = self.clock.now_ms();
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
        })
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get_entry(&self, key: &str) -> Result<Option<CachedResponse>, KvError> {
        let now = self.clock.now_ms();
        let row = self
            .db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT value, metadata, stored_at, expires_at FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| {
                        Ok((
                            row.get::<_, Vec<u8>>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                        ))
                    },
                )
                .optional()
            })
            .map_err(to_kv_error)?;

        let Some((value, metadata, stored_at, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at.map(|at| at <= now).unwrap_or(false) {
            self.db
                .with_conn(|conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key]))
                .map_err(to_kv_error)?;
            return Ok(None);
        }

        let metadata = metadata.and_then(|raw| serde_json::from_str::<KvMetadata>(&raw).ok());
        Ok(Some(CachedResponse {
            key: key.to_string(),
            value,
            stored_at: DateTime::from_timestamp_millis(stored_at).unwrap_or_default(),
            metadata,
        }))
    }

    async fn put(&self, key: &str, value: &[u8], options: &PutOptions) -> Result<(), KvError> {
        let now = self.clock.now_ms();
        let expires_at = options
            .expiration_ttl
            .map(|ttl| now + (ttl as i64).saturating_mul(1000));
        let metadata = options
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| KvError::Backend(e.to_string()))?;

        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO kv_entries (key, value, metadata, stored_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        metadata = excluded.metadata,
                        stored_at = excluded.stored_at,
                        expires_at = excluded.expires_at",
                    params![key, value, metadata, now, expires_at],
                )
            })
            .map_err(to_kv_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.db
            .with_conn(|conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key]))
            .map_err(to_kv_error)?;
        Ok(())
    }
}

/// Response records stored in the `response_records` table
pub struct SqliteResponseStore {
    db: Database,
}

impl SqliteResponseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ResponseStore for SqliteResponseStore {
    fn find_by_hash(&self, response_hash: &str) -> StorageResult<Option<ResponseRecord>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT response_hash, path, options_hash, content, size, updated_at, updated_by
                 FROM response_records WHERE response_hash = ?1",
                params![response_hash],
                |row| {
                    Ok(ResponseRecord {
                        response_hash: row.get(0)?,
                        path: row.get(1)?,
                        options_hash: row.get(2)?,
                        content: row.get(3)?,
                        size: row.get(4)?,
                        updated_at: parse_timestamp(&row.get::<_, String>(5)?),
                        updated_by: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    fn insert(&self, record: &ResponseRecord) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO response_records
                    (response_hash, path, options_hash, content, size, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(response_hash) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    updated_by = excluded.updated_by",
                params![
                    record.response_hash,
                    record.path,
                    record.options_hash,
                    record.content,
                    record.size,
                    format_timestamp(record.updated_at),
                    record.updated_by,
                ],
            )
        })?;
        Ok(())
    }

    fn touch(
        &self,
        response_hash: &str,
        updated_at: DateTime<Utc>,
        updated_by: &str,
    ) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE response_records SET updated_at = ?2, updated_by = ?3
                 WHERE response_hash = ?1",
                params![response_hash, format_timestamp(updated_at), updated_by],
            )
        })?;
        Ok(())
    }
}

/// Activity log stored in the `activity_log` table
pub struct SqliteActivityLog {
    db: Database,
}

impl SqliteActivityLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ActivityLog for SqliteActivityLog {
    fn record(&self, entry: &ActivityEntry) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO activity_log
                    (user_id, operation, target_url, status, cached, duration_ms, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.user_id,
                    entry.operation,
                    entry.target_url,
                    entry.status,
                    entry.cached,
                    entry.duration_ms as i64,
                    format_timestamp(entry.timestamp),
                ],
            )
        })?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> StorageResult<Vec<ActivityEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, operation, target_url, status, cached, duration_ms, timestamp
                 FROM activity_log ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(ActivityEntry {
                    user_id: row.get(0)?,
                    operation: row.get(1)?,
                    target_url: row.get(2)?,
                    status: row.get(3)?,
                    cached: row.get(4)?,
                    duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
                    timestamp: parse_timestamp(&row.get::<_, String>(6)?),
                })
            })?;
            rows.collect()
        })
    }
}
