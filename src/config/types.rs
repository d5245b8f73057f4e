use serde::Deserialize;

/// Main configuration structure for the archiver
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Listing crawl and fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Selector for item links on a listen-history page
    #[serde(rename = "history-selector", default = "default_item_selector")]
    pub history_selector: String,

    /// Selector for item links on a collection page
    #[serde(rename = "collection-selector", default = "default_item_selector")]
    pub collection_selector: String,

    /// Maximum number of in-flight worker invocations per dispatch call
    #[serde(rename = "concurrency-limit", default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Upper bound for loading a page (milliseconds)
    #[serde(rename = "page-timeout-ms", default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Upper bound for a selector to become present after load (milliseconds)
    #[serde(rename = "selector-timeout-ms", default = "default_selector_timeout_ms")]
    pub selector_timeout_ms: u64,
}

/// Polling policy for asynchronously populated item data
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum number of evaluation attempts before an item is marked failed
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between consecutive attempts (milliseconds)
    #[serde(rename = "attempt-delay-ms", default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_delay_ms: default_attempt_delay_ms(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Durable storage locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite request/counter database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory backing the artifact blob store
    #[serde(rename = "artifact-dir")]
    pub artifact_dir: String,
}

/// Archive retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Base URL that signed archive references are issued against
    #[serde(rename = "public-base-url")]
    pub public_base_url: String,

    /// Secret mixed into archive URL signatures
    #[serde(rename = "signing-secret")]
    pub signing_secret: String,

    /// Lifetime of a signed archive URL (seconds)
    #[serde(rename = "url-ttl-secs", default = "default_url_ttl_secs")]
    pub url_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Headless browser settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable; discovered from PATH when unset
    #[serde(rename = "chrome-path", default)]
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            chrome_path: None,
        }
    }
}

fn default_item_selector() -> String {
    ".cover a.mix_url".to_string()
}

fn default_concurrency_limit() -> usize {
    50
}

fn default_page_timeout_ms() -> u64 {
    10_000
}

fn default_selector_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_attempt_delay_ms() -> u64 {
    90
}

fn default_url_ttl_secs() -> u64 {
    3600
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_headless() -> bool {
    true
}
