//! Bounded-concurrency fan-out
//!
//! At most `limit` invocations are in flight at once. As soon as one
//! resolves the next queued item starts; there is no barrier between
//! items. Each invocation's outcome is isolated: a failed or slow item
//! never cancels its siblings.

use crate::tasks::{DispatchError, Invoker, Task};
use futures::stream::{self, StreamExt};
use std::future::Future;

/// Default ceiling on simultaneously in-flight invocations
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 50;

/// Outcome of a detached fan-out
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Tasks accepted by the invoker
    pub submitted: usize,
    /// Tasks the invoker refused, with the reason
    pub failed: Vec<(Task, DispatchError)>,
}

/// Fans work out to a worker function under a concurrency ceiling
#[derive(Debug, Clone, Copy)]
pub struct FanOutDispatcher {
    limit: usize,
}

impl Default for FanOutDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

impl FanOutDispatcher {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs `worker` on every item and collects the results
    ///
    /// Results arrive in completion order, not input order.
    pub async fn dispatch<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Vec<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = R>,
    {
        stream::iter(items)
            .map(worker)
            .buffer_unordered(self.limit)
            .collect()
            .await
    }

    /// Submits every task through `invoker` without waiting for them to run
    ///
    /// The ceiling applies to submissions, which protects a remote
    /// invocation endpoint from bursts. Completion is observed later
    /// through the request store.
    pub async fn dispatch_detached(
        &self,
        tasks: Vec<Task>,
        invoker: &dyn Invoker,
    ) -> DispatchReport {
        let outcomes = self
            .dispatch(tasks, |task| async move {
                match invoker.invoke(task.clone()).await {
                    Ok(()) => Ok(()),
                    Err(e) => Err((task, e)),
                }
            })
            .await;

        let mut report = DispatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => report.submitted += 1,
                Err((task, e)) => {
                    tracing::warn!("Failed to dispatch {}: {}", task.url(), e);
                    report.failed.push((task, e));
                }
            }
        }
        report
    }
}
