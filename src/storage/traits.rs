//! Storage traits and error types
//!
//! This module defines the two durable interfaces the pipeline coordinates
//! through: the request store (records and additive counters) and the
//! artifact store (opaque blobs keyed by name).

use crate::state::RequestStatus;
use crate::storage::{CrawlRequest, ItemArtifact, NewRequest};
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Request not found: {0}")]
    RequestNotFound(String),

    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable record and counter store keyed by request id
///
/// Every mutation is expressed as an additive or idempotent operation
/// (set insertion, upsert by key, aggregate recomputation) so concurrent
/// workers never race on a read-modify-write.
pub trait RequestStore {
    // ===== Request Management =====

    /// Creates a crawl request record
    fn create_request(&mut self, request: &NewRequest) -> StorageResult<()>;

    /// Gets a request by id, or None if it was never created
    fn get_request(&self, id: &str) -> StorageResult<Option<CrawlRequest>>;

    /// Updates the status of a request that has not been finalized yet
    fn mark_discovering(&mut self, id: &str) -> StorageResult<()>;

    /// Marks a finalized request as archived
    fn mark_archived(&mut self, id: &str) -> StorageResult<()>;

    // ===== Discovered Links =====

    /// Adds links to the request's discovered set
    ///
    /// Links already present are ignored, so repeated delivery of the same
    /// page does not inflate the count.
    ///
    /// # Returns
    ///
    /// The links that were not in the set before this call, in input order
    fn add_discovered_links(
        &mut self,
        id: &str,
        page: u32,
        links: &[String],
    ) -> StorageResult<Vec<String>>;

    /// Gets every discovered link for a request
    fn get_discovered_links(&self, id: &str) -> StorageResult<Vec<String>>;

    /// Counts discovered links for a request
    fn count_discovered(&self, id: &str) -> StorageResult<u64>;

    /// Records the final total as the size of the discovered set
    ///
    /// `status` must be a finalized status. Finalizing again recomputes the
    /// same aggregate, so redelivery is harmless.
    ///
    /// # Returns
    ///
    /// The finalized total
    fn finalize_total(&mut self, id: &str, status: RequestStatus) -> StorageResult<u64>;

    // ===== Artifacts =====

    /// Records the outcome of one item, replacing any earlier outcome for the
    /// same item url
    fn record_artifact(&mut self, id: &str, item_url: &str, artifact_key: &str)
        -> StorageResult<()>;

    /// Counts completed (or failed) items that belong to the discovered set
    fn count_artifacts(&self, id: &str) -> StorageResult<u64>;

    /// Gets every artifact record for a request
    fn get_artifacts(&self, id: &str) -> StorageResult<Vec<ItemArtifact>>;
}

/// Key-value blob store for item artifacts and assembled archives
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores bytes under a key, replacing any existing blob
    async fn put(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()>;

    /// Fetches the blob stored under a key
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
}
