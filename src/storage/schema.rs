//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the request store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per user-initiated crawl
CREATE TABLE IF NOT EXISTS requests (
    id TEXT PRIMARY KEY,
    source_url TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    total INTEGER
);

-- The discovered set; presence is what counts
CREATE TABLE IF NOT EXISTS discovered_links (
    request_id TEXT NOT NULL REFERENCES requests(id),
    url TEXT NOT NULL,
    page INTEGER NOT NULL,
    discovered_at TEXT NOT NULL,
    PRIMARY KEY (request_id, url)
);

-- One outcome per item; artifact_key is 'error' for recorded failures
CREATE TABLE IF NOT EXISTS artifacts (
    request_id TEXT NOT NULL REFERENCES requests(id),
    item_url TEXT NOT NULL,
    artifact_key TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (request_id, item_url)
);

CREATE INDEX IF NOT EXISTS idx_artifacts_request ON artifacts(request_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
