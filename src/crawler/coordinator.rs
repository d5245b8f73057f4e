//! Pagination coordinator - listing walk and item fan-out
//!
//! Pages are walked starting at 1 until an empty page is seen. For every
//! non-empty page the links are added to the request's discovered set and
//! only the newly added ones are fanned out as item tasks. The fan-out for
//! a page always completes before the next page is requested.
//!
//! Two scheduling strategies are offered:
//! - `run_page` handles one page and submits the next page as a new task
//! - `run` loops locally over every page of a request
//!
//! A page that fails to load stops pagination. The total is then finalized
//! from what was discovered so far and the request is marked truncated.

use crate::config::CrawlerConfig;
use crate::crawler::dispatcher::FanOutDispatcher;
use crate::crawler::links::{listing_page_url, LinkExtractor};
use crate::state::{RequestKind, RequestStatus};
use crate::storage::{lock_storage, CrawlRequest, RequestStore, SharedStorage, ERROR_SENTINEL};
use crate::tasks::{Invoker, ItemTask, PageTask, Task};
use crate::{ArchiverError, Result};
use std::sync::Arc;

/// Result of walking one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageAdvance {
    /// Every link found on the page
    pub links: Vec<String>,
    /// Links that were not in the discovered set before, and were dispatched
    pub new_links: Vec<String>,
    /// True once an empty page has terminated pagination
    pub is_last_page: bool,
}

/// Walks a request's listing pages and fans out item work
pub struct PaginationCoordinator {
    storage: SharedStorage,
    extractor: Arc<dyn LinkExtractor>,
    invoker: Arc<dyn Invoker>,
    dispatcher: FanOutDispatcher,
    history_selector: String,
    collection_selector: String,
}

impl PaginationCoordinator {
    pub fn new(
        storage: SharedStorage,
        extractor: Arc<dyn LinkExtractor>,
        invoker: Arc<dyn Invoker>,
        config: &CrawlerConfig,
    ) -> Self {
        Self {
            storage,
            extractor,
            invoker,
            dispatcher: FanOutDispatcher::new(config.concurrency_limit),
            history_selector: config.history_selector.clone(),
            collection_selector: config.collection_selector.clone(),
        }
    }

    /// Item selector used for listings of the given kind
    pub fn selector_for(&self, kind: RequestKind) -> &str {
        match kind {
            RequestKind::History => &self.history_selector,
            RequestKind::Collection => &self.collection_selector,
        }
    }

    /// Processes one listing page of `request`
    ///
    /// # Returns
    ///
    /// * `Ok(PageAdvance)` - The page was handled; `is_last_page` is set when
    ///   it was empty and the total has been finalized
    /// * `Err(ArchiverError::PageLoad)` - The page could not be loaded; the
    ///   total has been finalized as truncated
    pub async fn advance(&self, request: &CrawlRequest, page: u32) -> Result<PageAdvance> {
        let page_url = listing_page_url(&request.source_url, page);
        let selector = self.selector_for(request.kind);

        let links = match self.extractor.page_links(&page_url, selector).await {
            Ok(links) => links,
            Err(e) => {
                tracing::error!(
                    "Stopping pagination for {} at page {}: {}",
                    request.id,
                    page,
                    e
                );
                let total = self.finalize(&request.id, RequestStatus::Truncated)?;
                tracing::warn!("Request {} truncated with {} items", request.id, total);
                return Err(e);
            }
        };

        if links.is_empty() {
            let total = self.finalize(&request.id, RequestStatus::Discovered)?;
            tracing::info!(
                "Pagination for {} finished after {} pages: {} items",
                request.id,
                page - 1,
                total
            );
            return Ok(PageAdvance {
                links,
                new_links: Vec::new(),
                is_last_page: true,
            });
        }

        let (new_links, discovered) = {
            let mut storage = lock_storage(&self.storage)?;
            let new_links = storage.add_discovered_links(&request.id, page, &links)?;
            let discovered = storage.count_discovered(&request.id)?;
            (new_links, discovered)
        };

        tracing::info!(
            "Page {} of {}: {} links, {} new, {} discovered so far",
            page,
            request.id,
            links.len(),
            new_links.len(),
            discovered
        );

        let first = discovered.saturating_sub(new_links.len() as u64);
        let tasks: Vec<Task> = new_links
            .iter()
            .enumerate()
            .map(|(i, url)| {
                Task::Item(ItemTask {
                    url: url.clone(),
                    id: request.id.clone(),
                    count: first + i as u64 + 1,
                    total: discovered,
                })
            })
            .collect();

        let report = self
            .dispatcher
            .dispatch_detached(tasks, self.invoker.as_ref())
            .await;

        // Items that were never submitted still need a terminal outcome
        if !report.failed.is_empty() {
            let mut storage = lock_storage(&self.storage)?;
            for (task, _) in &report.failed {
                storage.record_artifact(&request.id, task.url(), ERROR_SENTINEL)?;
            }
        }

        Ok(PageAdvance {
            links,
            new_links,
            is_last_page: false,
        })
    }

    /// Handles one page task and submits the task for the following page
    ///
    /// Page tasks for a request whose total is already final are ignored, so
    /// a redelivered page cannot grow the discovered set after the fact.
    pub async fn run_page(&self, task: &PageTask) -> Result<()> {
        let request = match self.begin(&task.id)? {
            Some(request) => request,
            None => {
                tracing::debug!(
                    "Ignoring page {} for finalized request {}",
                    task.current_page,
                    task.id
                );
                return Ok(());
            }
        };

        let advance = self.advance(&request, task.current_page).await?;
        if advance.is_last_page {
            return Ok(());
        }

        let discovered = lock_storage(&self.storage)?.count_discovered(&task.id)?;
        let next = PageTask {
            url: task.url.clone(),
            id: task.id.clone(),
            current_page: task.current_page + 1,
            count: discovered,
            total: discovered,
        };

        if let Err(e) = self.invoker.invoke(Task::Page(next)).await {
            tracing::error!(
                "Failed to submit page {} for {}: {}",
                task.current_page + 1,
                task.id,
                e
            );
            self.finalize(&task.id, RequestStatus::Truncated)?;
            return Err(e.into());
        }

        Ok(())
    }

    /// Walks every page of a request in a local loop
    ///
    /// # Returns
    ///
    /// The finalized total
    pub async fn run(&self, request_id: &str) -> Result<u64> {
        let request = match self.begin(request_id)? {
            Some(request) => request,
            None => {
                let total = lock_storage(&self.storage)?.count_discovered(request_id)?;
                return Ok(total);
            }
        };

        let mut page = 1;
        loop {
            let advance = self.advance(&request, page).await?;
            if advance.is_last_page {
                break;
            }
            page += 1;
        }

        let total = lock_storage(&self.storage)?.count_discovered(request_id)?;
        Ok(total)
    }

    /// Loads the request and marks it as discovering
    ///
    /// Returns None when the request has already been finalized.
    fn begin(&self, request_id: &str) -> Result<Option<CrawlRequest>> {
        let mut storage = lock_storage(&self.storage)?;
        let request = storage
            .get_request(request_id)?
            .ok_or_else(|| ArchiverError::RequestNotFound(request_id.to_string()))?;

        if request.status.is_finalized() {
            return Ok(None);
        }

        storage.mark_discovering(request_id)?;
        Ok(Some(request))
    }

    fn finalize(&self, request_id: &str, status: RequestStatus) -> Result<u64> {
        let total = lock_storage(&self.storage)?.finalize_total(request_id, status)?;
        Ok(total)
    }
}
