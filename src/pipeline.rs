//! Wiring of the whole pipeline
//!
//! `Pipeline` routes queued tasks to the pagination coordinator or the item
//! worker. `Components` opens the stores named in the configuration and
//! builds every collaborator around one in-process task queue, so the CLI,
//! the server and the integration tests all run the same graph.

use crate::api::ArchiveApi;
use crate::archive::{ArchiveAssembler, CompletionTracker, UrlSigner};
use crate::config::Config;
use crate::crawler::{LinkExtractor, PaginationCoordinator};
use crate::storage::{open_shared_storage, ArtifactStore, FsArtifactStore, SharedStorage};
use crate::tasks::{Invoker, Task, TaskHandler, TaskQueue, TaskReceiver, WorkerPool};
use crate::worker::{ItemWorker, Renderer};
use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Routes each task to the component that handles it
pub struct Pipeline {
    coordinator: PaginationCoordinator,
    worker: ItemWorker,
}

impl Pipeline {
    pub fn new(coordinator: PaginationCoordinator, worker: ItemWorker) -> Self {
        Self {
            coordinator,
            worker,
        }
    }
}

#[async_trait]
impl TaskHandler for Pipeline {
    async fn handle(&self, task: Task) -> Result<()> {
        match task {
            Task::Page(page) => self.coordinator.run_page(&page).await,
            Task::Item(item) => self.worker.process(&item).await.map(|_| ()),
        }
    }
}

/// Every collaborator of a running archiver
pub struct Components {
    pub storage: SharedStorage,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub queue: TaskQueue,
    pub pool: WorkerPool,
    pub tracker: CompletionTracker,
    pub assembler: Arc<ArchiveAssembler>,
    pub signer: UrlSigner,
    pub api: Arc<ArchiveApi>,
}

impl Components {
    /// Opens the configured stores and builds the pipeline around them
    ///
    /// # Returns
    ///
    /// The components and the receiving end of their task queue, which a
    /// `WorkerPool` is expected to drain
    pub fn build(
        config: &Config,
        config_hash: &str,
        extractor: Arc<dyn LinkExtractor>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<(Self, TaskReceiver)> {
        let storage = open_shared_storage(Path::new(&config.storage.database_path))?;
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(FsArtifactStore::new(&config.storage.artifact_dir));
        let (queue, receiver) = TaskQueue::new();
        let invoker: Arc<dyn Invoker> = Arc::new(queue.clone());

        let coordinator = PaginationCoordinator::new(
            storage.clone(),
            extractor,
            invoker.clone(),
            &config.crawler,
        );
        let worker = ItemWorker::new(storage.clone(), artifacts.clone(), renderer, config);
        let pool = WorkerPool::new(
            Arc::new(Pipeline::new(coordinator, worker)),
            config.crawler.concurrency_limit,
        );

        let signer = UrlSigner::new(&config.archive);
        let assembler = Arc::new(ArchiveAssembler::new(
            storage.clone(),
            artifacts.clone(),
            signer.clone(),
        ));
        let api = Arc::new(ArchiveApi::new(
            storage.clone(),
            invoker,
            assembler.clone(),
            config_hash,
        ));

        tracing::debug!(
            "Pipeline ready: database {}, artifacts in {}",
            config.storage.database_path,
            config.storage.artifact_dir
        );

        Ok((
            Self {
                tracker: CompletionTracker::new(storage.clone()),
                storage,
                artifacts,
                queue,
                pool,
                assembler,
                signer,
                api,
            },
            receiver,
        ))
    }
}
