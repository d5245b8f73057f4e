//! Listing page link extraction
//!
//! `PageLinkExtractor` loads one listing page and returns the item links on
//! it. An empty result means the listing has run out of pages; a load
//! failure is reported as `ArchiverError::PageLoad`.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_page, FetchResult};
use crate::crawler::parser::extract_item_links;
use crate::{ArchiverError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Source of item links for one listing page
#[async_trait]
pub trait LinkExtractor: Send + Sync {
    /// Loads `page_url` and returns the links matched by `selector`
    async fn page_links(&self, page_url: &str, selector: &str) -> Result<Vec<String>>;
}

/// Builds the URL of a numbered listing page: `{source}/{page}`
pub fn listing_page_url(source_url: &str, page: u32) -> String {
    format!("{}/{}", source_url.trim_end_matches('/'), page)
}

/// HTTP-backed link extractor
pub struct PageLinkExtractor {
    client: Client,
}

impl PageLinkExtractor {
    /// Creates an extractor whose page loads are bounded by the configured timeout
    pub fn new(config: &Config) -> Result<Self> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_millis(config.crawler.page_timeout_ms),
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkExtractor for PageLinkExtractor {
    async fn page_links(&self, page_url: &str, selector: &str) -> Result<Vec<String>> {
        tracing::debug!("Loading listing page {}", page_url);

        let result = fetch_page(&self.client, page_url).await;
        let (final_url, body) = match result {
            FetchResult::Success {
                final_url, body, ..
            } => (final_url, body),
            other => {
                let reason = other
                    .failure_reason()
                    .unwrap_or_else(|| "unknown failure".to_string());
                return Err(ArchiverError::PageLoad {
                    url: page_url.to_string(),
                    reason,
                });
            }
        };

        let base_url = Url::parse(&final_url)?;
        let links = extract_item_links(&body, &base_url, selector).map_err(|reason| {
            ArchiverError::PageLoad {
                url: page_url.to_string(),
                reason,
            }
        })?;

        tracing::debug!("Found {} item links on {}", links.len(), page_url);
        Ok(links)
    }
}
