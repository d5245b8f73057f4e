//! Request intake and download status
//!
//! Transport-agnostic handlers behind the HTTP server and the CLI. Every
//! outcome is a well-formed payload: progress, a ready archive reference,
//! or an `ApiError` carrying a status code and a human-readable message.

use crate::archive::{ArchiveAssembler, CompletionTracker};
use crate::state::{RequestKind, RequestStatus};
use crate::storage::{lock_storage, NewRequest, RequestStore, SharedStorage};
use crate::tasks::{Invoker, PageTask, Task};
use crate::ArchiverError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

const INTAKE_FAILED: &str = "Unable to initiate archive request.";
const UPLOAD_FAILED: &str = "Unable to upload archive.";

/// Errors returned to API callers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }

    /// JSON body sent with the error
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Intake query: `?url=...&type=history|collection`
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveRequestParams {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAccepted {
    pub id: String,
}

/// Status query body: `{ "id": "..." }`
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadParams {
    pub id: String,
}

/// Response to a status query
///
/// Either `{ ready: false, total, count }` while work is outstanding, or
/// `{ ready: true, url, total, count }` once the archive is uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub ready: bool,
    pub total: u64,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Intake and status handlers over the shared stores
pub struct ArchiveApi {
    storage: SharedStorage,
    invoker: Arc<dyn Invoker>,
    tracker: CompletionTracker,
    assembler: Arc<ArchiveAssembler>,
    config_hash: String,
}

impl ArchiveApi {
    pub fn new(
        storage: SharedStorage,
        invoker: Arc<dyn Invoker>,
        assembler: Arc<ArchiveAssembler>,
        config_hash: impl Into<String>,
    ) -> Self {
        Self {
            tracker: CompletionTracker::new(storage.clone()),
            storage,
            invoker,
            assembler,
            config_hash: config_hash.into(),
        }
    }

    /// Records a new crawl request and submits its first page
    ///
    /// Returns as soon as the first page task has been accepted; pagination
    /// runs asynchronously.
    pub async fn request_archive(&self, url: &str, kind: &str) -> Result<RequestAccepted, ApiError> {
        let kind = RequestKind::from_db_string(kind)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown request type: {}", kind)))?;
        let source_url = validate_source_url(url)?;

        let id = Uuid::new_v4().to_string();
        let request = NewRequest {
            id: id.clone(),
            source_url: source_url.clone(),
            kind,
            config_hash: self.config_hash.clone(),
        };

        let created = lock_storage(&self.storage).and_then(|mut s| s.create_request(&request));
        if let Err(e) = created {
            tracing::error!("Failed to record request for {}: {}", source_url, e);
            return Err(ApiError::Internal(INTAKE_FAILED.to_string()));
        }

        if let Err(e) = self
            .invoker
            .invoke(Task::Page(PageTask::first(source_url.clone(), id.clone())))
            .await
        {
            tracing::error!("Failed to start pagination for {}: {}", id, e);
            // Nothing will ever discover items for this request
            let closed = lock_storage(&self.storage)
                .and_then(|mut s| s.finalize_total(&id, RequestStatus::Truncated));
            if let Err(close_err) = closed {
                tracing::error!("Failed to close abandoned request {}: {}", id, close_err);
            }
            return Err(ApiError::Internal(INTAKE_FAILED.to_string()));
        }

        tracing::info!("Accepted {} request {} for {}", kind, id, source_url);
        Ok(RequestAccepted { id })
    }

    /// Reports progress, assembling the archive once the request is ready
    pub async fn download_status(&self, id: &str) -> Result<DownloadStatus, ApiError> {
        let readiness = self.tracker.check_ready(id).map_err(|e| match e {
            ArchiverError::RequestNotFound(_) => {
                ApiError::NotFound(format!("No archive request with id {}", id))
            }
            other => {
                tracing::error!("Failed to read progress of {}: {}", id, other);
                ApiError::Internal(format!("Unable to read progress of {}", id))
            }
        })?;

        let pending = DownloadStatus {
            ready: false,
            total: readiness.total_discovered,
            count: readiness.completed_count,
            url: None,
            truncated: readiness.truncated,
        };
        if !readiness.ready {
            return Ok(pending);
        }

        match self.assembler.assemble(id).await {
            Ok(reference) => Ok(DownloadStatus {
                ready: true,
                url: Some(reference.url),
                ..pending
            }),
            Err(ArchiverError::NotReady { .. }) => Ok(pending),
            Err(e) => {
                tracing::error!("Failed to assemble archive for {}: {}", id, e);
                Err(ApiError::Internal(UPLOAD_FAILED.to_string()))
            }
        }
    }
}

/// Accepts absolute http(s) URLs and strips a trailing slash
fn validate_source_url(raw: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| ApiError::BadRequest(format!("Invalid url {}: {}", raw, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unsupported url scheme: {}",
                other
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(ApiError::BadRequest(format!("Url has no host: {}", raw)));
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
