//! Crawler module for listing pagination and item fan-out
//!
//! This module contains the discovery side of the pipeline, including:
//! - HTTP fetching of listing pages
//! - Item link extraction with a record selector
//! - Bounded-concurrency fan-out of item tasks
//! - Page-by-page pagination with durable discovered counts

mod coordinator;
mod dispatcher;
mod fetcher;
mod links;
mod parser;

pub use coordinator::{PageAdvance, PaginationCoordinator};
pub use dispatcher::{DispatchReport, FanOutDispatcher, DEFAULT_CONCURRENCY_LIMIT};
pub use fetcher::{build_http_client, fetch_page, user_agent_string, FetchResult};
pub use links::{listing_page_url, LinkExtractor, PageLinkExtractor};
pub use parser::extract_item_links;
