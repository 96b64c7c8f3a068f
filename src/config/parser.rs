use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Values supplied on the command line or through the environment
///
/// Each `Some` replaces the corresponding file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub target_url: Option<String>,
    pub headless: Option<bool>,
    pub cookies_path: Option<PathBuf>,
    pub max_items: Option<u32>,
    pub max_workers: Option<u32>,
    pub database_path: Option<String>,
}

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// A missing target URL is not an error here; only scrape runs require one.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Applies command line / environment overrides on top of a loaded configuration
pub fn apply_overrides(config: &mut Config, overrides: ConfigOverrides) {
    if let Some(target_url) = overrides.target_url {
        config.scrape.target_url = Some(target_url);
    }
    if let Some(headless) = overrides.headless {
        config.browser.headless = headless;
    }
    if let Some(cookies_path) = overrides.cookies_path {
        config.browser.cookies_path = Some(cookies_path);
    }
    if let Some(max_items) = overrides.max_items {
        config.scrape.max_items = max_items;
    }
    if let Some(max_workers) = overrides.max_workers {
        config.scrape.max_workers = max_workers;
    }
    if let Some(database_path) = overrides.database_path {
        config.output.database_path = database_path;
    }
}

/// Computes a SHA-256 fingerprint of the effective configuration
///
/// Stored on every run row so runs made with different settings can be told apart.
pub fn config_fingerprint(config: &Config) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{:?}", config).as_bytes());
    hex::encode(hasher.finalize())
}
