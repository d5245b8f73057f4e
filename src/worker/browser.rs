//! Headless Chromium renderer
//!
//! Uses chromiumoxide (CDP). The browser is launched on first use and shared
//! by every page opened afterwards. Page loads and selector waits are
//! bounded by the configured timeouts, as is every script evaluation.

use crate::config::Config;
use crate::worker::render::{RenderError, Renderer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "browser")]
use crate::worker::render::RenderedPage;

#[cfg(feature = "browser")]
use async_trait::async_trait;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::OnceCell;

/// Interval between selector probes while waiting for readiness
#[cfg(feature = "browser")]
const SELECTOR_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Builds the renderer used by item workers
pub fn default_renderer(config: &Config) -> Result<Arc<dyn Renderer>, RenderError> {
    #[cfg(feature = "browser")]
    {
        Ok(Arc::new(ChromiumRenderer::new(config)))
    }

    #[cfg(not(feature = "browser"))]
    {
        let _ = config;
        Err(RenderError::Unavailable(
            "browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }
}

/// Runs one render operation, failing with `RenderError::Timeout` past `limit`
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
async fn bounded<T, F>(what: &str, limit: Duration, op: F) -> Result<T, RenderError>
where
    F: Future<Output = Result<T, RenderError>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::Timeout {
            what: what.to_string(),
            millis: limit.as_millis() as u64,
        }),
    }
}

/// Script returning the trimmed text of every element matching a selector
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
fn texts_script(selector: &str) -> String {
    let selector = serde_json::Value::String(selector.to_string());
    format!(
        "Array.from(document.querySelectorAll({})).map((el) => el.textContent.trim())",
        selector
    )
}

#[cfg(feature = "browser")]
pub struct ChromiumRenderer {
    headless: bool,
    chrome_path: Option<String>,
    page_timeout: Duration,
    browser: OnceCell<Arc<Browser>>,
}

#[cfg(feature = "browser")]
impl ChromiumRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            headless: config.browser.headless,
            chrome_path: config.browser.chrome_path.clone(),
            page_timeout: Duration::from_millis(config.crawler.page_timeout_ms),
            browser: OnceCell::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, RenderError> {
        self.browser
            .get_or_try_init(|| async {
                tracing::info!("Launching browser (headless={})", self.headless);

                let mut builder = BrowserConfig::builder();
                if let Some(path) = &self.chrome_path {
                    builder = builder.chrome_executable(path);
                }
                if !self.headless {
                    builder = builder.with_head();
                }
                builder = builder
                    .arg("--disable-dev-shm-usage")
                    .arg("--no-first-run")
                    .arg("--no-default-browser-check")
                    .arg("--no-sandbox")
                    .arg("--disable-gpu");

                let config = builder.build().map_err(RenderError::Launch)?;
                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| RenderError::Launch(e.to_string()))?;

                tokio::spawn(async move {
                    while let Some(h) = handler.next().await {
                        if h.is_err() {
                            break;
                        }
                    }
                });

                Ok(Arc::new(browser))
            })
            .await
            .cloned()
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError> {
        let browser = self.browser().await?;

        // The tab exists before navigation starts, so a failed load can close it
        let page = bounded("a new tab", self.page_timeout, async {
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| navigation_error(url, e))
        })
        .await?;

        let load = bounded(&format!("page load of {}", url), self.page_timeout, async {
            page.goto(url).await.map_err(|e| navigation_error(url, e))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| navigation_error(url, e))?;
            Ok(())
        })
        .await;

        match load {
            Ok(()) => {
                tracing::debug!("Opened the page: {}", url);
                Ok(Box::new(ChromiumPage {
                    page,
                    op_timeout: self.page_timeout,
                }))
            }
            Err(e) => {
                if let Err(close_err) = page.close().await {
                    tracing::debug!("Failed to close page for {}: {}", url, close_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(feature = "browser")]
fn navigation_error(url: &str, error: chromiumoxide::error::CdpError) -> RenderError {
    RenderError::Navigation {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

#[cfg(feature = "browser")]
struct ChromiumPage {
    page: Page,
    /// Upper bound for one script evaluation
    op_timeout: Duration,
}

#[cfg(feature = "browser")]
#[async_trait]
impl RenderedPage for ChromiumPage {
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), RenderError> {
        let probe = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(SELECTOR_PROBE_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, probe)
            .await
            .map_err(|_| RenderError::Timeout {
                what: format!("selector {}", selector),
                millis: timeout.as_millis() as u64,
            })
    }

    async fn text(&self, selector: &str) -> Option<String> {
        self.texts(selector).await.into_iter().next()
    }

    async fn texts(&self, selector: &str) -> Vec<String> {
        match self.evaluate(&texts_script(selector)).await {
            Ok(Some(value)) => serde_json::from_value(value).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::debug!("Query for {} failed: {}", selector, e);
                Vec::new()
            }
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, RenderError> {
        let result = bounded("script evaluation", self.op_timeout, async {
            self.page
                .evaluate(script.to_string())
                .await
                .map_err(|e| RenderError::Evaluation(e.to_string()))
        })
        .await?;
        Ok(result.value().cloned())
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close page: {}", e);
        }
    }
}
