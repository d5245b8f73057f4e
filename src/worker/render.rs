//! Render collaborator interface
//!
//! A `Renderer` opens a URL in a script-capable page. The returned
//! `RenderedPage` answers one-shot DOM queries and arbitrary script
//! evaluations that may be polled repeatedly.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a render collaborator
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to open {url}: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {millis}ms waiting for {what}")]
    Timeout { what: String, millis: u64 },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Rendering unavailable: {0}")]
    Unavailable(String),
}

/// Opens pages for item extraction
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn RenderedPage>, RenderError>;
}

/// A loaded page
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Waits until `selector` matches, bounded by `timeout`
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), RenderError>;

    /// Trimmed text content of the first element matching `selector`
    async fn text(&self, selector: &str) -> Option<String>;

    /// Trimmed text content of every element matching `selector`
    async fn texts(&self, selector: &str) -> Vec<String>;

    /// Evaluates a script, awaiting a returned promise
    ///
    /// `Ok(None)` means the script produced `undefined`.
    async fn evaluate(&self, script: &str) -> Result<Option<serde_json::Value>, RenderError>;

    /// Releases the page
    async fn close(&self);
}
