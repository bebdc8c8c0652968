use crate::config::types::{ApiConfig, CatalogEntry, Config, FetchConfig, OutputConfig};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_fetch_config(&config.fetch)?;
    validate_output_config(&config.output)?;
    validate_catalogs(&config.catalogs)?;
    Ok(())
}

fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.keys.is_empty() {
        return Err(ConfigError::Validation(
            "at least one API key is required".to_string(),
        ));
    }

    if config.keys.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "API keys cannot be blank".to_string(),
        ));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.page_size < 1 || config.page_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 1000, got {}",
            config.page_size
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.retry_base_delay_ms > config.retry_max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry-base-delay-ms ({}) cannot exceed retry-max-delay-ms ({})",
            config.retry_base_delay_ms, config.retry_max_delay_ms
        )));
    }

    if config.max_consecutive_page_failures < 1 {
        return Err(ConfigError::Validation(
            "max-consecutive-page-failures must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_catalogs(catalogs: &[CatalogEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in catalogs {
        validate_catalog_code(&entry.code)?;

        if entry.game_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "Catalog '{}' must have a game-id",
                entry.code
            )));
        }

        if !seen.insert(entry.code.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Catalog '{}' is configured more than once",
                entry.code
            )));
        }
    }

    Ok(())
}

/// Catalog codes are lowercase identifiers: letters, digits, '-' and '_'
fn validate_catalog_code(code: &str) -> Result<(), ConfigError> {
    if code.is_empty() {
        return Err(ConfigError::Validation(
            "Catalog code cannot be empty".to_string(),
        ));
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "Catalog code '{}' must be lowercase letters, digits, '-' or '_'",
            code
        )));
    }

    Ok(())
}
