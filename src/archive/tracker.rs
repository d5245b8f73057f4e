//! Completion tracking
//!
//! Readiness is a pure read-time comparison of two durable aggregates: the
//! finalized discovered total and the number of recorded item outcomes.
//! No locking beyond the store's own is involved, and a read right after a
//! write may briefly undercount.

use crate::state::RequestStatus;
use crate::storage::{lock_storage, RequestStore, SharedStorage};
use crate::{ArchiverError, Result};
use serde::Serialize;

/// Progress of one crawl request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    /// Finalized total once pagination has ended, otherwise the running count
    pub total_discovered: u64,
    pub completed_count: u64,
    /// Pagination has ended and the total will not change
    pub finalized: bool,
    /// Pagination ended early on a page that failed to load
    pub truncated: bool,
}

/// Reports whether all fanned-out work for a request has finished
#[derive(Clone)]
pub struct CompletionTracker {
    storage: SharedStorage,
}

impl CompletionTracker {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Compares the discovered total with the completed count
    ///
    /// # Returns
    ///
    /// * `Ok(Readiness)` - Current progress; `ready` holds once the total is
    ///   final and every discovered item has an outcome
    /// * `Err(ArchiverError::RequestNotFound)` - The id was never created
    pub fn check_ready(&self, request_id: &str) -> Result<Readiness> {
        let storage = lock_storage(&self.storage)?;
        let request = storage
            .get_request(request_id)?
            .ok_or_else(|| ArchiverError::RequestNotFound(request_id.to_string()))?;

        let completed_count = storage.count_artifacts(request_id)?;
        let readiness = match request.total {
            Some(total) => Readiness {
                ready: completed_count == total,
                total_discovered: total,
                completed_count,
                finalized: true,
                truncated: request.status == RequestStatus::Truncated,
            },
            None => Readiness {
                ready: false,
                total_discovered: storage.count_discovered(request_id)?,
                completed_count,
                finalized: false,
                truncated: false,
            },
        };

        tracing::debug!(
            "Request {}: {} of {} complete (ready: {})",
            request_id,
            readiness.completed_count,
            readiness.total_discovered,
            readiness.ready
        );
        Ok(readiness)
    }
}
