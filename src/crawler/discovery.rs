//! Scroll-driven listing discovery
//!
//! Marketplaces load more results as the feed is scrolled. Each round walks through three
//! phases on the already-open entry page:
//!
//! 1. **Scrolling** - scroll to the bottom to trigger the next batch
//! 2. **Settling** - wait for network quiescence, then a short grace delay
//! 3. **Harvesting** - collect listing hrefs, resolve and normalize them, add new ones
//!
//! A round that adds nothing is stagnant. Discovery stops when enough consecutive rounds are
//! stagnant, when the URL cap is reached, or when the hard round limit is hit. All three
//! conditions are checked before every round.

use crate::config::Config;
use crate::crawler::fetcher::settle;
use crate::render::Renderer;
use crate::url::{is_listing_link, resolve_href};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Phase within a single discovery round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    Scrolling,
    Settling,
    Harvesting,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scrolling => "scrolling",
            Self::Settling => "settling",
            Self::Harvesting => "harvesting",
        };
        f.write_str(name)
    }
}

/// Why discovery stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Too many consecutive rounds without new URLs
    Stagnated,
    /// The URL cap was reached
    CapReached,
    /// The hard round limit was reached
    RoundLimit,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Stagnated => "feed stopped producing new listings",
            Self::CapReached => "item cap reached",
            Self::RoundLimit => "round limit reached",
        };
        f.write_str(reason)
    }
}

/// Insertion-ordered set of candidate URLs
///
/// Adding a URL that is already present is a no-op.
#[derive(Debug, Clone, Default)]
pub struct UrlSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `url`; returns false if it was already present
    pub fn insert(&mut self, url: String) -> bool {
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.order.push(url);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// URLs in first-seen order
    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

/// Discovery loop settings
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub max_items: usize,
    pub max_rounds: u32,
    pub stagnant_limit: u32,
    pub network_idle_timeout: Duration,
    pub settle: Duration,
    pub link_patterns: Vec<String>,
    /// Base for resolving relative hrefs
    pub origin: Url,
}

impl DiscoveryOptions {
    pub fn from_config(config: &Config, origin: Url) -> Self {
        Self {
            max_items: config.scrape.max_items as usize,
            max_rounds: config.discovery.max_rounds,
            stagnant_limit: config.discovery.stagnant_rounds,
            network_idle_timeout: Duration::from_secs(config.discovery.network_idle_timeout_secs),
            settle: Duration::from_millis(config.discovery.settle_ms),
            link_patterns: config.discovery.link_patterns.clone(),
            origin,
        }
    }
}

/// Result of a discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// Unique listing URLs in first-seen order
    pub urls: Vec<String>,
    pub rounds: u32,
    pub termination: Termination,
}

/// Runs scroll rounds on the open entry page until a termination condition holds
///
/// Failures inside a round never abort discovery: a failed scroll is logged and the round
/// continues, an idle timeout counts as settled, and a failed harvest counts as a round
/// without new URLs.
pub async fn discover(renderer: &dyn Renderer, options: &DiscoveryOptions) -> DiscoveryOutcome {
    let mut urls = UrlSet::new();
    let mut rounds = 0u32;
    let mut stagnant = 0u32;

    let termination = loop {
        if urls.len() >= options.max_items {
            break Termination::CapReached;
        }
        if stagnant >= options.stagnant_limit {
            break Termination::Stagnated;
        }
        if rounds >= options.max_rounds {
            break Termination::RoundLimit;
        }

        rounds += 1;
        let added = run_round(renderer, options, &mut urls, rounds).await;

        if added == 0 {
            stagnant += 1;
        } else {
            stagnant = 0;
        }

        debug!(
            "Round {}: +{} new, {} total, {} stagnant",
            rounds,
            added,
            urls.len(),
            stagnant
        );
    };

    info!(
        "Discovery finished after {} rounds with {} URLs ({})",
        rounds,
        urls.len(),
        termination
    );

    DiscoveryOutcome {
        urls: urls.into_vec(),
        rounds,
        termination,
    }
}

/// Runs one scroll/settle/harvest cycle and returns the number of new URLs
async fn run_round(
    renderer: &dyn Renderer,
    options: &DiscoveryOptions,
    urls: &mut UrlSet,
    round: u32,
) -> usize {
    let mut phase = DiscoveryPhase::Scrolling;

    loop {
        match phase {
            DiscoveryPhase::Scrolling => {
                if let Err(e) = renderer.scroll_to_bottom().await {
                    warn!("Round {} {}: {}", round, phase, e);
                }
                phase = DiscoveryPhase::Settling;
            }
            DiscoveryPhase::Settling => {
                if let Err(e) = renderer
                    .wait_network_idle(options.network_idle_timeout)
                    .await
                {
                    debug!("Round {} {}: {}; continuing", round, phase, e);
                }
                settle(options.settle).await;
                phase = DiscoveryPhase::Harvesting;
            }
            DiscoveryPhase::Harvesting => {
                return match renderer.query_anchors(&options.link_patterns).await {
                    Ok(hrefs) => harvest(&hrefs, options, urls),
                    Err(e) => {
                        warn!("Round {} {}: {}", round, phase, e);
                        0
                    }
                };
            }
        }
    }
}

/// Adds the listing links among `hrefs` to `urls`, stopping at the cap
fn harvest(hrefs: &[String], options: &DiscoveryOptions, urls: &mut UrlSet) -> usize {
    let mut added = 0;

    for href in hrefs {
        if urls.len() >= options.max_items {
            break;
        }

        let Some(url) = resolve_href(&options.origin, href) else {
            continue;
        };
        if !is_listing_link(&url, &options.link_patterns) {
            continue;
        }

        if urls.insert(url.to_string()) {
            added += 1;
        }
    }

    added
}
