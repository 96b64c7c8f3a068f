//! Market-Sweep main entry point
//!
//! This is the command-line interface for the Market-Sweep listing harvester.

use anyhow::{bail, Context};
use clap::Parser;
use market_sweep::config::{apply_overrides, load_config, validate, Config, ConfigOverrides};
use market_sweep::crawler::run_scrape;
use market_sweep::output::{
    load_statistics, print_listing, print_listing_page, print_run_summary, print_statistics,
};
use market_sweep::render::browser_support;
use market_sweep::storage::{open_storage, ListingFilter, ListingUpdate, Storage};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Longest accepted --every interval, one year
const MAX_EVERY_MINUTES: u64 = 365 * 24 * 60;

/// Market-Sweep: a listing harvester for scroll-paginated marketplaces
///
/// Market-Sweep opens a marketplace feed in a headless browser, scrolls until the feed
/// stops producing new listings, extracts each listing and upserts it into SQLite.
#[derive(Parser, Debug)]
#[command(name = "market-sweep")]
#[command(version)]
#[command(about = "A listing harvester for scroll-paginated marketplaces", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Discovery entry page
    #[arg(long, env = "TARGET_URL", value_name = "URL")]
    target_url: Option<String>,

    /// Run the browser headless (true/false)
    #[arg(long, env = "HEADLESS", value_parser = clap::builder::BoolishValueParser::new())]
    headless: Option<bool>,

    /// JSON cookie jar injected into every session
    #[arg(long, env = "COOKIES_FILE", value_name = "PATH")]
    cookies: Option<PathBuf>,

    /// Upper bound on discovered URLs
    #[arg(long, env = "SCRAPE_MAX_ITEMS")]
    max_items: Option<u32>,

    /// Parallel renderer sessions for listing pages
    #[arg(long)]
    workers: Option<u32>,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", value_name = "PATH")]
    database: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be scraped without opening a browser
    #[arg(long, conflicts_with_all = ["stats", "list", "show", "delete", "update", "every"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list", "show", "delete", "update", "every"])]
    stats: bool,

    /// List stored listings and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "show", "delete", "update", "every"])]
    list: bool,

    /// Show one stored listing and exit
    #[arg(long, value_name = "LISTING_ID", conflicts_with_all = ["dry_run", "stats", "list", "delete", "update", "every"])]
    show: Option<String>,

    /// Delete one stored listing and exit
    #[arg(long, value_name = "LISTING_ID", conflicts_with_all = ["dry_run", "stats", "list", "show", "update", "every"])]
    delete: Option<String>,

    /// Edit fields of one stored listing and exit (use the --set-* flags)
    #[arg(long, value_name = "LISTING_ID", conflicts_with_all = ["dry_run", "stats", "list", "show", "delete", "every"])]
    update: Option<String>,

    /// Re-run the scrape every MINUTES until interrupted (at most one year)
    #[arg(long, value_name = "MINUTES", value_parser = clap::value_parser!(u64).range(1..=MAX_EVERY_MINUTES))]
    every: Option<u64>,

    /// Minimum price filter for --list
    #[arg(long, requires = "list")]
    min_price: Option<Decimal>,

    /// Maximum price filter for --list
    #[arg(long, requires = "list")]
    max_price: Option<Decimal>,

    /// Minimum model year filter for --list
    #[arg(long, requires = "list")]
    min_year: Option<i32>,

    /// Maximum model year filter for --list
    #[arg(long, requires = "list")]
    max_year: Option<i32>,

    /// New title for --update
    #[arg(long, requires = "update", value_name = "TITLE")]
    set_title: Option<String>,

    /// New price for --update
    #[arg(long, requires = "update", value_name = "PRICE")]
    set_price: Option<Decimal>,

    /// New model year for --update
    #[arg(long, requires = "update", value_name = "YEAR")]
    set_year: Option<i32>,

    /// New mileage in kilometres for --update
    #[arg(long, requires = "update", value_name = "KM")]
    set_mileage: Option<i64>,

    /// New location for --update
    #[arg(long, requires = "update", value_name = "LOCATION")]
    set_location: Option<String>,

    /// Location substring filter for --list
    #[arg(long, requires = "list")]
    location: Option<String>,

    /// Listings to skip for --list
    #[arg(long, default_value_t = 0)]
    skip: u64,

    /// Maximum listings to print for --list
    #[arg(long, default_value_t = 50)]
    limit: u64,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            target_url: self.target_url.clone(),
            headless: self.headless,
            cookies_path: self.cookies.clone(),
            max_items: self.max_items,
            max_workers: self.workers,
            database_path: self.database.clone(),
        }
    }

    fn listing_filter(&self) -> ListingFilter {
        ListingFilter {
            min_price: self.min_price,
            max_price: self.max_price,
            min_year: self.min_year,
            max_year: self.max_year,
            location: self.location.clone(),
        }
    }

    fn listing_update(&self) -> ListingUpdate {
        ListingUpdate {
            title: self.set_title.clone(),
            price: self.set_price,
            year: self.set_year,
            mileage: self.set_mileage,
            location: self.set_location.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = build_config(&cli)?;

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.list {
        handle_list(&config, &cli)?;
    } else if let Some(listing_id) = &cli.show {
        handle_show(&config, listing_id)?;
    } else if let Some(listing_id) = &cli.delete {
        handle_delete(&config, listing_id)?;
    } else if let Some(listing_id) = &cli.update {
        handle_update(&config, listing_id, &cli.listing_update())?;
    } else if let Some(minutes) = cli.every {
        handle_every(config, minutes).await;
    } else {
        handle_scrape(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("market_sweep=info,warn"),
            1 => EnvFilter::new("market_sweep=debug,info"),
            2 => EnvFilter::new("market_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file if one was given, then applies command line/environment overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, cli.overrides());
    validate(&config).context("Invalid configuration")?;

    Ok(config)
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Market-Sweep Dry Run ===\n");

    println!("Scrape:");
    println!(
        "  Target URL: {}",
        config.scrape.target_url.as_deref().unwrap_or("(not set)")
    );
    println!("  Max items: {}", config.scrape.max_items);
    println!("  Workers: {}", config.scrape.max_workers);

    println!("\nBrowser:");
    println!("  Support compiled in: {}", browser_support());
    println!("  Headless: {}", config.browser.headless);
    match &config.browser.remote_url {
        Some(remote) => println!("  Remote endpoint: {}", remote),
        None => println!("  Remote endpoint: (launch locally)"),
    }
    match &config.browser.cookies_path {
        Some(path) => println!("  Cookie jar: {}", path.display()),
        None => println!("  Cookie jar: (none)"),
    }

    println!("\nDiscovery:");
    println!("  Max rounds: {}", config.discovery.max_rounds);
    println!("  Stagnant rounds: {}", config.discovery.stagnant_rounds);
    println!(
        "  Network idle timeout: {}s",
        config.discovery.network_idle_timeout_secs
    );
    println!("  Link patterns: {}", config.discovery.link_patterns.join(", "));

    println!("\nFetch:");
    println!(
        "  Navigation timeout: {}s",
        config.fetch.navigation_timeout_secs
    );
    println!(
        "  Retries: {} tries, {}ms delay, x{} backoff",
        config.fetch.tries, config.fetch.retry_delay_ms, config.fetch.backoff
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    if config.scrape.target_url.is_some() {
        println!("\n✓ Configuration is valid");
    } else {
        println!("\n✗ No target URL configured; a scrape run would not start");
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list mode
fn handle_list(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    let page = storage.list_listings(&cli.listing_filter(), cli.skip, cli.limit)?;
    print_listing_page(&page, cli.skip);
    Ok(())
}

/// Handles the --show mode
fn handle_show(config: &Config, listing_id: &str) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    match storage.get_listing(listing_id)? {
        Some(listing) => print_listing(&listing),
        None => bail!("Listing {} not found", listing_id),
    }
    Ok(())
}

/// Handles the --delete mode
fn handle_delete(config: &Config, listing_id: &str) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    if !storage.delete_listing(listing_id)? {
        bail!("Listing {} not found", listing_id);
    }
    println!("✓ Deleted listing {}", listing_id);
    Ok(())
}

/// Handles the --update mode
fn handle_update(config: &Config, listing_id: &str, update: &ListingUpdate) -> anyhow::Result<()> {
    if update.is_empty() {
        bail!("Nothing to update; pass at least one --set-* flag");
    }

    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    match storage.update_listing(listing_id, update)? {
        Some(listing) => {
            println!("✓ Updated listing {}\n", listing_id);
            print_listing(&listing);
        }
        None => bail!("Listing {} not found", listing_id),
    }
    Ok(())
}

/// Handles the main scrape operation
async fn handle_scrape(config: Config) -> anyhow::Result<()> {
    match run_scrape(config).await {
        Ok(summary) => {
            print_run_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            Err(e.into())
        }
    }
}

/// Interval between scheduled scrapes; saturates instead of overflowing
fn every_period(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

/// Handles the --every mode: one scrape per interval until interrupted
async fn handle_every(config: Config, minutes: u64) {
    let mut ticker = tokio::time::interval(every_period(minutes));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!("Scraping every {} minutes; press Ctrl-C to stop", minutes);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = handle_scrape(config.clone()).await {
                    tracing::warn!("Scheduled scrape failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted; stopping scheduled scrapes");
                break;
            }
        }
    }
}
