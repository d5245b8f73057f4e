//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RequestStore trait.

use crate::state::{RequestKind, RequestStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RequestStore, StorageError, StorageResult};
use crate::storage::{CrawlRequest, ItemArtifact, NewRequest, ERROR_SENTINEL};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn require_request(&self, id: &str) -> StorageResult<()> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM requests WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::RequestNotFound(id.to_string())),
        }
    }
}

impl RequestStore for SqliteStorage {
    // ===== Request Management =====

    fn create_request(&mut self, request: &NewRequest) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO requests (id, source_url, kind, status, config_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id,
                request.source_url,
                request.kind.to_db_string(),
                RequestStatus::Pending.to_db_string(),
                request.config_hash,
                now
            ],
        )?;
        Ok(())
    }

    fn get_request(&self, id: &str) -> StorageResult<Option<CrawlRequest>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_url, kind, status, config_hash, created_at, total
             FROM requests WHERE id = ?1",
        )?;

        let request = stmt
            .query_row(params![id], |row| {
                Ok(CrawlRequest {
                    id: row.get(0)?,
                    source_url: row.get(1)?,
                    kind: RequestKind::from_db_string(&row.get::<_, String>(2)?)
                        .unwrap_or(RequestKind::History),
                    status: RequestStatus::from_db_string(&row.get::<_, String>(3)?)
                        .unwrap_or(RequestStatus::Pending),
                    config_hash: row.get(4)?,
                    created_at: row.get(5)?,
                    total: row.get::<_, Option<i64>>(6)?.map(|t| t as u64),
                })
            })
            .optional()?;

        Ok(request)
    }

    fn mark_discovering(&mut self, id: &str) -> StorageResult<()> {
        self.require_request(id)?;
        self.conn.execute(
            "UPDATE requests SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                RequestStatus::Discovering.to_db_string(),
                id,
                RequestStatus::Pending.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn mark_archived(&mut self, id: &str) -> StorageResult<()> {
        self.require_request(id)?;
        self.conn.execute(
            "UPDATE requests SET status = ?1 WHERE id = ?2 AND total IS NOT NULL",
            params![RequestStatus::Archived.to_db_string(), id],
        )?;
        Ok(())
    }

    // ===== Discovered Links =====

    fn add_discovered_links(
        &mut self,
        id: &str,
        page: u32,
        links: &[String],
    ) -> StorageResult<Vec<String>> {
        self.require_request(id)?;

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut added = Vec::new();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO discovered_links (request_id, url, page, discovered_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for link in links {
                if stmt.execute(params![id, link, page, now])? == 1 {
                    added.push(link.clone());
                }
            }
        }
        tx.commit()?;

        Ok(added)
    }

    fn get_discovered_links(&self, id: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT url FROM discovered_links WHERE request_id = ?1 ORDER BY page, rowid",
        )?;

        let links = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(links)
    }

    fn count_discovered(&self, id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM discovered_links WHERE request_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn finalize_total(&mut self, id: &str, status: RequestStatus) -> StorageResult<u64> {
        if !matches!(status, RequestStatus::Discovered | RequestStatus::Truncated) {
            return Err(StorageError::Database(format!(
                "cannot finalize request {} with status {}",
                id, status
            )));
        }

        // An archived request keeps its status; only the aggregate is refreshed.
        let updated = self.conn.execute(
            "UPDATE requests
             SET total = (SELECT COUNT(*) FROM discovered_links WHERE request_id = ?1),
                 status = CASE WHEN status = ?3 THEN status ELSE ?2 END
             WHERE id = ?1",
            params![
                id,
                status.to_db_string(),
                RequestStatus::Archived.to_db_string()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RequestNotFound(id.to_string()));
        }

        let total: i64 = self.conn.query_row(
            "SELECT total FROM requests WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(total as u64)
    }

    // ===== Artifacts =====

    fn record_artifact(
        &mut self,
        id: &str,
        item_url: &str,
        artifact_key: &str,
    ) -> StorageResult<()> {
        self.require_request(id)?;

        // A late failure never replaces a recorded success.
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO artifacts (request_id, item_url, artifact_key, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(request_id, item_url) DO UPDATE
             SET artifact_key = excluded.artifact_key, created_at = excluded.created_at
             WHERE excluded.artifact_key != ?5 OR artifacts.artifact_key = ?5",
            params![id, item_url, artifact_key, now, ERROR_SENTINEL],
        )?;
        Ok(())
    }

    fn count_artifacts(&self, id: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM artifacts a
             JOIN discovered_links d ON d.request_id = a.request_id AND d.url = a.item_url
             WHERE a.request_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn get_artifacts(&self, id: &str) -> StorageResult<Vec<ItemArtifact>> {
        let mut stmt = self.conn.prepare(
            "SELECT request_id, item_url, artifact_key, created_at
             FROM artifacts WHERE request_id = ?1 ORDER BY item_url",
        )?;

        let artifacts = stmt
            .query_map(params![id], |row| {
                Ok(ItemArtifact {
                    request_id: row.get(0)?,
                    item_url: row.get(1)?,
                    artifact_key: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(artifacts)
    }
}
