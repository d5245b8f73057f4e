//! Item worker
//!
//! Renders one item page, extracts the mix and its tracks, stores the text
//! artifact and records the outcome. The blob write always completes before
//! the artifact row is recorded, so the completion count never runs ahead
//! of retrievable data. Every failure records the error sentinel so the
//! item still reaches a terminal outcome.

use crate::config::Config;
use crate::storage::{
    lock_storage, ArtifactStore, ItemArtifact, RequestStore, SharedStorage, ERROR_SENTINEL,
};
use crate::tasks::ItemTask;
use crate::worker::extract::{
    extract_record, extract_tracks, MixRecord, PollPolicy, Track, NAME_SELECTOR,
};
use crate::worker::format::{artifact_key, render_text, url_digest};
use crate::worker::render::{RenderError, RenderedPage, Renderer};
use crate::{ArchiverError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Blob store key for an item artifact of a request
///
/// Scoped by a digest of the item URL, since two items may share a title
/// and therefore an artifact key.
pub fn item_blob_key(request_id: &str, item_url: &str, artifact_key: &str) -> String {
    format!("items/{}/{}/{}", request_id, url_digest(item_url), artifact_key)
}

/// Processes single discovered items
pub struct ItemWorker {
    storage: SharedStorage,
    artifacts: Arc<dyn ArtifactStore>,
    renderer: Arc<dyn Renderer>,
    policy: PollPolicy,
    selector_timeout: Duration,
}

impl ItemWorker {
    pub fn new(
        storage: SharedStorage,
        artifacts: Arc<dyn ArtifactStore>,
        renderer: Arc<dyn Renderer>,
        config: &Config,
    ) -> Self {
        Self {
            storage,
            artifacts,
            renderer,
            policy: PollPolicy::from(&config.extraction),
            selector_timeout: Duration::from_millis(config.crawler.selector_timeout_ms),
        }
    }

    /// Processes one item and records its outcome
    ///
    /// Safe to run more than once for the same item: the artifact row is
    /// keyed by item URL, so completion is counted by presence.
    ///
    /// # Returns
    ///
    /// * `Ok(ItemArtifact)` - The artifact was stored and recorded
    /// * `Err(ArchiverError)` - The item failed; the error sentinel was recorded
    pub async fn process(&self, task: &ItemTask) -> Result<ItemArtifact> {
        tracing::info!("Processing {} of {}", task.count, task.total);

        match self.produce(task).await {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                tracing::warn!("Failed to process {}: {}", task.url, e);
                if let Err(record_err) = self.record(&task.id, &task.url, ERROR_SENTINEL) {
                    tracing::error!(
                        "Failed to record error outcome for {}: {}",
                        task.url,
                        record_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn produce(&self, task: &ItemTask) -> Result<ItemArtifact> {
        let page = self
            .renderer
            .open(&task.url)
            .await
            .map_err(|e| page_load_error(&task.url, e))?;
        tracing::debug!("Opened the page: {}", task.url);

        let extracted = self.extract(page.as_ref(), &task.url).await;
        page.close().await;
        let (record, tracks) = extracted?;

        let key = artifact_key(&record, &task.url);
        let text = render_text(&record, &tracks);
        self.artifacts
            .put(&item_blob_key(&task.id, &task.url, &key), text.into_bytes())
            .await?;

        let artifact = self.record(&task.id, &task.url, &key)?;
        tracing::info!("Successfully uploaded {}", key);
        Ok(artifact)
    }

    async fn extract(
        &self,
        page: &dyn RenderedPage,
        url: &str,
    ) -> Result<(MixRecord, Vec<Track>)> {
        // Static fields default to empty if the page never becomes ready
        if let Err(e) = page.wait_for(NAME_SELECTOR, self.selector_timeout).await {
            tracing::warn!("{} did not become ready: {}", url, e);
        }
        let record = extract_record(page).await;

        let tracks = extract_tracks(page, self.policy)
            .await
            .ok_or_else(|| ArchiverError::ExtractionTimeout {
                url: url.to_string(),
                attempts: self.policy.max_attempts,
            })?;

        Ok((record, tracks))
    }

    fn record(&self, request_id: &str, item_url: &str, key: &str) -> Result<ItemArtifact> {
        lock_storage(&self.storage)?.record_artifact(request_id, item_url, key)?;
        Ok(ItemArtifact {
            request_id: request_id.to_string(),
            item_url: item_url.to_string(),
            artifact_key: key.to_string(),
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

fn page_load_error(url: &str, error: RenderError) -> ArchiverError {
    match error {
        RenderError::Navigation { reason, .. } => ArchiverError::PageLoad {
            url: url.to_string(),
            reason,
        },
        RenderError::Timeout { .. } => ArchiverError::PageLoad {
            url: url.to_string(),
            reason: error.to_string(),
        },
        other => ArchiverError::Render(other),
    }
}
