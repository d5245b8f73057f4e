//! Storage module for persisting crawl state and artifacts
//!
//! This module handles all durable state shared between workers:
//! - SQLite request records, discovered-link sets and artifact rows
//! - Filesystem blob storage for item artifacts and assembled archives
//!
//! Workers never share memory; they only observe each other through
//! these two stores.

mod blob;
mod schema;
mod sqlite;
mod traits;

pub use blob::FsArtifactStore;
pub use sqlite::SqliteStorage;
pub use traits::{ArtifactStore, RequestStore, StorageError, StorageResult};

use crate::state::{RequestKind, RequestStatus};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Artifact key recorded in place of a real key when an item failed
pub const ERROR_SENTINEL: &str = "error";

/// Request store handle shared between concurrently running workers
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens (or creates) the request store and wraps it for sharing
pub fn open_shared_storage(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks the shared request store
///
/// A poisoned lock is reported as a storage failure rather than a panic.
pub fn lock_storage(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("request store lock poisoned".to_string()))
}

/// Fields supplied when a crawl request is created
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub id: String,
    pub source_url: String,
    pub kind: RequestKind,
    pub config_hash: String,
}

/// Represents a crawl request in the database
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub id: String,
    pub source_url: String,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub config_hash: String,
    pub created_at: String,

    /// Final discovered count; None until pagination terminates
    pub total: Option<u64>,
}

/// Represents the recorded outcome of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemArtifact {
    pub request_id: String,
    pub item_url: String,
    pub artifact_key: String,
    pub created_at: String,
}

impl ItemArtifact {
    /// Returns true if this record marks a failed item
    pub fn is_error(&self) -> bool {
        self.artifact_key == ERROR_SENTINEL
    }
}
