//! HTTP surface
//!
//! - `GET /archive/request?url=...&type=history|collection` starts a crawl
//! - `POST /archive/download` with `{ "id": "..." }` reports progress, or the
//!   signed archive URL once ready
//! - `GET /archives/{name}?expires=...&signature=...` streams a stored bundle
//!
//! The worker pool runs in the same process and drains the task queue for
//! as long as the server is up.

use crate::api::{ApiError, ArchiveApi, ArchiveRequestParams, DownloadParams};
use crate::archive::{unix_now, UrlSigner};
use crate::pipeline::Components;
use crate::storage::ArtifactStore;
use crate::tasks::TaskReceiver;
use crate::Result;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ArchiveApi>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub signer: UrlSigner,
}

impl AppState {
    pub fn from_components(components: &Components) -> Self {
        Self {
            api: components.api.clone(),
            artifacts: components.artifacts.clone(),
            signer: components.signer.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: u64,
    pub signature: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/archive/request", get(request_archive))
        .route("/archive/download", post(download_status))
        .route("/archives/:name", get(fetch_archive))
        .with_state(state)
}

/// Binds the configured address and serves until the process exits
///
/// The task queue is drained by a worker pool spawned alongside the server.
pub async fn serve(components: Components, receiver: TaskReceiver, bind: &str) -> Result<()> {
    let state = AppState::from_components(&components);
    let app = create_router(state);

    let pool = components.pool;
    tokio::spawn(async move {
        pool.run(receiver).await;
    });

    let listener = TcpListener::bind(bind).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn error_response(error: ApiError) -> Response {
    let status = StatusCode::from_u16(error.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error.body())).into_response()
}

async fn request_archive(
    State(state): State<AppState>,
    Query(params): Query<ArchiveRequestParams>,
) -> Response {
    match state.api.request_archive(&params.url, &params.kind).await {
        Ok(accepted) => Json(accepted).into_response(),
        Err(e) => error_response(e),
    }
}

async fn download_status(
    State(state): State<AppState>,
    Json(params): Json<DownloadParams>,
) -> Response {
    match state.api.download_status(&params.id).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => error_response(e),
    }
}

async fn fetch_archive(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Response {
    let key = format!("archives/{}", name);
    if !state
        .signer
        .verify(&key, query.expires, &query.signature, unix_now())
    {
        return (StatusCode::FORBIDDEN, "Invalid or expired signature").into_response();
    }

    match state.artifacts.get(&key).await {
        Ok(Some(bytes)) => (
            [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Archive not found").into_response(),
        Err(e) => {
            tracing::error!("Failed to read archive {}: {}", key, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read archive").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveAssembler;
    use crate::config::test_config;
    use crate::storage::{FsArtifactStore, SharedStorage, SqliteStorage};
    use crate::tasks::TaskQueue;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct TestServer {
        base: String,
        artifacts: Arc<dyn ArtifactStore>,
        signer: UrlSigner,
        _receiver: TaskReceiver,
    }

    async fn spawn_server(dir: &TempDir) -> TestServer {
        let storage: SharedStorage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));
        let signer = UrlSigner::new(&test_config().archive);
        let (queue, receiver) = TaskQueue::new();

        let assembler = Arc::new(ArchiveAssembler::new(
            storage.clone(),
            artifacts.clone(),
            signer.clone(),
        ));
        let state = AppState {
            api: Arc::new(ArchiveApi::new(storage, Arc::new(queue), assembler, "hash")),
            artifacts: artifacts.clone(),
            signer: signer.clone(),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        TestServer {
            base,
            artifacts,
            signer,
            _receiver: receiver,
        }
    }

    #[tokio::test]
    async fn test_request_then_status() {
        let dir = TempDir::new().unwrap();
        let server = spawn_server(&dir).await;
        let base = &server.base;
        let client = reqwest::Client::new();

        let accepted: serde_json::Value = client
            .get(format!("{}/archive/request", base))
            .query(&[("url", "https://example.com/dj/history"), ("type", "history")])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = accepted["id"].as_str().unwrap().to_string();

        let status: serde_json::Value = client
            .post(format!("{}/archive/download", base))
            .json(&serde_json::json!({ "id": id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            status,
            serde_json::json!({ "ready": false, "total": 0, "count": 0 })
        );
    }

    #[tokio::test]
    async fn test_unknown_id_and_bad_type() {
        let dir = TempDir::new().unwrap();
        let server = spawn_server(&dir).await;
        let base = &server.base;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/archive/download", base))
            .json(&serde_json::json!({ "id": "missing" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("missing"));

        let response = client
            .get(format!("{}/archive/request", base))
            .query(&[("url", "https://example.com/dj"), ("type", "likes")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signed_archive_download() {
        let dir = TempDir::new().unwrap();
        let server = spawn_server(&dir).await;
        let base = &server.base;
        server
            .artifacts
            .put("archives/req-1.zip", b"PK fake".to_vec())
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let expires = unix_now() + 60;
        let signature = server.signer.signature("archives/req-1.zip", expires);
        let response = client
            .get(format!("{}/archives/req-1.zip", base))
            .query(&[
                ("expires", expires.to_string()),
                ("signature", signature.clone()),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap().as_ref(), b"PK fake");

        let forged = client
            .get(format!("{}/archives/req-2.zip", base))
            .query(&[("expires", expires.to_string()), ("signature", signature)])
            .send()
            .await
            .unwrap();
        assert_eq!(forged.status(), reqwest::StatusCode::FORBIDDEN);
    }
}
