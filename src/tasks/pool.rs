//! Worker pool that runs queued tasks as detached tokio tasks
//!
//! Concurrency is limited with a semaphore; each task holds one permit for
//! the lifetime of its handler. A failing handler is logged and never
//! affects its siblings.

use crate::tasks::{Task, TaskReceiver};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Executes one task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task) -> crate::Result<()>;
}

/// Drains a task queue with bounded concurrency
pub struct WorkerPool {
    handler: Arc<dyn TaskHandler>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool running at most `max_in_flight` handlers at once
    pub fn new(handler: Arc<dyn TaskHandler>, max_in_flight: usize) -> Self {
        Self {
            handler,
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Runs tasks until the queue is closed and every handler has finished
    ///
    /// # Returns
    ///
    /// The number of tasks that ran
    pub async fn run(&self, mut receiver: TaskReceiver) -> usize {
        let mut in_flight = JoinSet::new();
        let mut processed = 0;

        loop {
            tokio::select! {
                task = receiver.recv() => match task {
                    Some(task) => {
                        if !self.spawn(&mut in_flight, task).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    processed += 1;
                    log_join(joined);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            processed += 1;
            log_join(joined);
        }

        tracing::info!("Worker pool stopped after {} tasks", processed);
        processed
    }

    /// Runs tasks until nothing is queued and nothing is running
    ///
    /// Handlers may enqueue follow-up tasks; those are picked up before the
    /// pool considers itself idle.
    ///
    /// # Returns
    ///
    /// The number of tasks that ran
    pub async fn run_until_idle(&self, receiver: &mut TaskReceiver) -> usize {
        let mut in_flight = JoinSet::new();
        let mut processed = 0;

        loop {
            while let Ok(task) = receiver.try_recv() {
                if !self.spawn(&mut in_flight, task).await {
                    return processed;
                }
            }

            // A finished handler has already sent its follow-ups, so an empty
            // set here means the queue was fully drained above.
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some(task) = receiver.recv() => {
                    if !self.spawn(&mut in_flight, task).await {
                        break;
                    }
                }
                Some(joined) = in_flight.join_next() => {
                    processed += 1;
                    log_join(joined);
                }
                else => break,
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            processed += 1;
            log_join(joined);
        }

        processed
    }

    async fn spawn(&self, in_flight: &mut JoinSet<crate::Result<()>>, task: Task) -> bool {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!("Worker pool semaphore closed: {}", e);
                return false;
            }
        };

        let handler = Arc::clone(&self.handler);
        in_flight.spawn(async move {
            let _permit = permit;
            let url = task.url().to_string();
            let request_id = task.request_id().to_string();
            let result = handler.handle(task).await;
            if let Err(e) = &result {
                tracing::warn!("Task for {} (request {}) failed: {}", url, request_id, e);
            }
            result
        });
        true
    }
}

fn log_join(joined: Result<crate::Result<()>, tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Task join error: {}", e);
    }
}
