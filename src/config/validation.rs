use crate::config::types::{
    ArchiveConfig, Config, CrawlerConfig, ExtractionConfig, StorageConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_extraction_config(&config.extraction)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_archive_config(&config.archive)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > 500 {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and 500, got {}",
            config.concurrency_limit
        )));
    }

    if config.page_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms must be >= 100ms, got {}ms",
            config.page_timeout_ms
        )));
    }

    if config.selector_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "selector_timeout_ms must be >= 100ms, got {}ms",
            config.selector_timeout_ms
        )));
    }

    validate_selector("history_selector", &config.history_selector)?;
    validate_selector("collection_selector", &config.collection_selector)?;

    Ok(())
}

fn validate_selector(field: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::Validation(format!("{} '{}' is not a valid selector: {:?}", field, selector, e))
    })?;
    Ok(())
}

/// Validates the polling policy
fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 50 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 50, got {}",
            config.max_attempts
        )));
    }

    if config.attempt_delay_ms > 10_000 {
        return Err(ConfigError::Validation(format!(
            "attempt_delay_ms must be <= 10000ms, got {}ms",
            config.attempt_delay_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.artifact_dir.is_empty() {
        return Err(ConfigError::Validation(
            "artifact_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates archive retrieval configuration
fn validate_archive_config(config: &ArchiveConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.public_base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid public_base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "public_base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.signing_secret.len() < 8 {
        return Err(ConfigError::Validation(
            "signing_secret must be at least 8 characters".to_string(),
        ));
    }

    if config.url_ttl_secs < 60 {
        return Err(ConfigError::Validation(format!(
            "url_ttl_secs must be >= 60, got {}",
            config.url_ttl_secs
        )));
    }

    Ok(())
}
