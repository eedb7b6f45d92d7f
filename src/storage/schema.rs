//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Reader database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Response cache entries
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    metadata TEXT,
    stored_at INTEGER NOT NULL,
    expires_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_expires ON kv_entries(expires_at);

-- Content-addressed response records
CREATE TABLE IF NOT EXISTS response_records (
    response_hash TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    options_hash TEXT NOT NULL,
    content TEXT NOT NULL,
    size INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_response_records_path ON response_records(path);

-- Served requests
CREATE TABLE IF NOT EXISTS activity_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT,
    operation TEXT NOT NULL,
    target_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    cached INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_activity_log_user ON activity_log(user_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
