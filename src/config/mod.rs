//! Configuration module for the archiver
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use mixtape_archiver::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("archiver.toml")).unwrap();
//! println!("Fan-out limit: {}", config.crawler.concurrency_limit);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ArchiveConfig, BrowserConfig, Config, CrawlerConfig, ExtractionConfig, ServerConfig,
    StorageConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

/// Valid configuration shared by unit tests across modules
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    parse_config(
        r#"
[crawler]
concurrency-limit = 50

[extraction]
max-attempts = 5
attempt-delay-ms = 90

[user-agent]
crawler-name = "TestCrawler"
crawler-version = "1.0"
contact-url = "https://example.com/about"

[storage]
database-path = "unused.db"
artifact-dir = "unused"

[archive]
public-base-url = "http://127.0.0.1:8080"
signing-secret = "test-secret"
"#,
    )
    .unwrap()
}
