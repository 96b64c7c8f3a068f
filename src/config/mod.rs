//! Configuration module for Market-Sweep
//!
//! This module handles loading, parsing, overriding and validating the TOML configuration.
//! Every value has a default except the target URL, so a run can be configured entirely
//! from the command line or environment.
//!
//! # Example
//!
//! ```no_run
//! use market_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Will collect at most {} listings", config.scrape.max_items);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrowserConfig, Config, DiscoveryConfig, FetchConfig, OutputConfig, ScrapeConfig,
};

// Re-export parser functions
pub use parser::{apply_overrides, config_fingerprint, load_config, ConfigOverrides};
pub use validation::validate;
