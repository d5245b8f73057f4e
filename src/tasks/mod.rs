//! Asynchronous invocation interface
//!
//! Pagination and item extraction run as independent units of work. Each
//! unit is described by a serializable `Task` payload and submitted through
//! an `Invoker`; submission is fire-and-forget and delivery is assumed to be
//! at-least-once, so every handler must tolerate running twice.
//!
//! # Components
//!
//! - `Task`, `PageTask`, `ItemTask`: the `{ url, id, count, total, currentPage }` payloads
//! - `Invoker`: submits a task without waiting for it to run
//! - `TaskQueue`: in-process invoker backed by an unbounded channel
//! - `WorkerPool`: drains the queue, running each task as a detached tokio task

mod pool;

pub use pool::{TaskHandler, WorkerPool};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors raised while submitting a task
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task queue is closed")]
    QueueClosed,

    #[error("Invocation failed: {0}")]
    Invocation(String),
}

/// One listing page to walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTask {
    /// Listing source URL, without the page number
    pub url: String,
    /// Crawl request id
    pub id: String,
    /// 1-based page number to load
    pub current_page: u32,
    /// Items discovered before this page
    pub count: u64,
    /// Running discovered total, for progress logs
    pub total: u64,
}

impl PageTask {
    /// The first page of a freshly created request
    pub fn first(url: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id: id.into(),
            current_page: 1,
            count: 0,
            total: 0,
        }
    }
}

/// One discovered item to extract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTask {
    /// Item page URL
    pub url: String,
    /// Crawl request id
    pub id: String,
    /// 1-based position of this item in discovery order
    pub count: u64,
    /// Discovered total when this item was dispatched
    pub total: u64,
}

/// A unit of work submitted through an `Invoker`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Task {
    Page(PageTask),
    Item(ItemTask),
}

impl Task {
    pub fn url(&self) -> &str {
        match self {
            Task::Page(task) => &task.url,
            Task::Item(task) => &task.url,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Task::Page(task) => &task.id,
            Task::Item(task) => &task.id,
        }
    }
}

/// Submits tasks for asynchronous execution
///
/// `invoke` returns once the task has been accepted, not once it has run.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, task: Task) -> Result<(), DispatchError>;
}

/// Receiving half of an in-process task queue
pub type TaskReceiver = mpsc::UnboundedReceiver<Task>;

/// In-process invoker backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl TaskQueue {
    /// Creates a queue and the receiver a `WorkerPool` drains
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Invoker for TaskQueue {
    async fn invoke(&self, task: Task) -> Result<(), DispatchError> {
        self.sender
            .send(task)
            .map_err(|_| DispatchError::QueueClosed)
    }
}
