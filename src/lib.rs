//! Mixtape Archiver: a distributed crawl-and-archive pipeline
//!
//! This crate crawls a paginated listing of mixes, fans out one extraction job
//! per discovered mix, persists each result to an artifact store and finally
//! bundles every artifact belonging to one crawl request into a single archive.
//! All coordination happens through durable counters in the request store, so
//! workers may run as independent, failure-prone units.

pub mod api;
pub mod archive;
pub mod config;
pub mod crawler;
pub mod pipeline;
pub mod server;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod worker;

use thiserror::Error;

/// Main error type for archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network error or timeout while opening a page
    #[error("Failed to load page {url}: {reason}")]
    PageLoad { url: String, reason: String },

    /// The polling loop ran out of attempts before the page produced data
    #[error("Extraction timed out for {url} after {attempts} attempts")]
    ExtractionTimeout { url: String, attempts: u32 },

    /// Artifact put, archive upload or record store failure
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Render error: {0}")]
    Render(#[from] worker::RenderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] tasks::DispatchError),

    #[error("Unknown request id: {0}")]
    RequestNotFound(String),

    /// Assembly was attempted before the completion tracker reported ready
    #[error("Request {id} is not ready ({count} of {total} items complete)")]
    NotReady { id: String, total: u64, count: u64 },

    #[error("Archive encoding error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for archiver operations
pub type Result<T> = std::result::Result<T, ArchiverError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use archive::{ArchiveAssembler, ArchiveReference, CompletionTracker, Readiness};
pub use config::Config;
pub use crawler::{FanOutDispatcher, PageLinkExtractor, PaginationCoordinator};
pub use state::{RequestKind, RequestStatus};
pub use worker::ItemWorker;
