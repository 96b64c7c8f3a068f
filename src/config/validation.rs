use crate::config::types::{BrowserConfig, Config, DiscoveryConfig, FetchConfig, ScrapeConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scrape_config(&config.scrape)?;
    validate_browser_config(&config.browser)?;
    validate_discovery_config(&config.discovery)?;
    validate_fetch_config(&config.fetch)?;

    if config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates scrape configuration
fn validate_scrape_config(config: &ScrapeConfig) -> Result<(), ConfigError> {
    if let Some(target) = &config.target_url {
        validate_http_url(target, "target_url")?;
    }

    if config.max_items < 1 {
        return Err(ConfigError::Validation(format!(
            "max_items must be >= 1, got {}",
            config.max_items
        )));
    }

    if config.max_workers < 1 || config.max_workers > 16 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 16, got {}",
            config.max_workers
        )));
    }

    Ok(())
}

/// Validates renderer configuration
fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    if let Some(remote) = &config.remote_url {
        let url = Url::parse(remote)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid remote_url: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::Validation(format!(
                "remote_url must use http(s) or ws(s), got '{}'",
                remote
            )));
        }
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates discovery configuration
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.max_rounds < 1 {
        return Err(ConfigError::Validation(format!(
            "max_rounds must be >= 1, got {}",
            config.max_rounds
        )));
    }

    if config.stagnant_rounds < 1 {
        return Err(ConfigError::Validation(format!(
            "stagnant_rounds must be >= 1, got {}",
            config.stagnant_rounds
        )));
    }

    if config.link_patterns.is_empty() {
        return Err(ConfigError::Validation(
            "link_patterns must contain at least one pattern".to_string(),
        ));
    }

    if let Some(pattern) = config.link_patterns.iter().find(|p| !is_safe_pattern(p)) {
        return Err(ConfigError::Validation(format!(
            "link pattern '{}' must be a non-empty path fragment without quotes or whitespace",
            pattern
        )));
    }

    if let Some(origin) = &config.base_origin {
        validate_http_url(origin, "base_origin")?;
    }

    Ok(())
}

/// Validates fetch configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.tries < 1 {
        return Err(ConfigError::Validation(format!(
            "tries must be >= 1, got {}",
            config.tries
        )));
    }

    if !config.backoff.is_finite() || config.backoff < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff must be a finite number >= 1.0, got {}",
            config.backoff
        )));
    }

    if config.navigation_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "navigation_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use HTTP or HTTPS",
            field, value
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' has no host",
            field, value
        )));
    }

    Ok(())
}

/// Patterns end up inside a CSS attribute selector
fn is_safe_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && !pattern
            .chars()
            .any(|c| c == '\'' || c == '"' || c == '\\' || c.is_whitespace())
}
