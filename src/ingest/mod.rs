//! Candidate ingestion.
//!
//! `IngestionAdapter` is the only write path into the lifecycle cache for
//! new candidates: it validates feed events and drops malformed ones
//! without disturbing the engine. `ListingFeed` polls a pump.fun-style
//! new-listings endpoint and feeds each entry through the adapter; feed
//! outages are logged and retried on the next tick, never fatal.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::LifecycleCache;
use crate::types::TokenMetadata;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A discovery event as handed to the adapter. The address is optional
/// here because upstream feeds do emit entries without one; validation
/// happens at ingestion, not at parse time.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub address: Option<String>,
    pub name: String,
    pub symbol: String,
    pub liquidity_usd: Decimal,
    pub fdv_usd: Decimal,
    pub source: String,
}

/// One entry of the new-listings payload. Every field is optional on the
/// wire; tolerant parsing keeps one bad entry from sinking the batch.
#[derive(Debug, Deserialize)]
pub struct NewListing {
    #[serde(default)]
    pub mint: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub liquidity: Option<Decimal>,
    #[serde(default)]
    pub usd_market_cap: Option<Decimal>,
}

impl NewListing {
    pub fn into_event(self, source: &str) -> FeedEvent {
        FeedEvent {
            address: self.mint,
            name: self.name.unwrap_or_default(),
            symbol: self.symbol.unwrap_or_default(),
            liquidity_usd: self.liquidity.unwrap_or_default(),
            fdv_usd: self.usd_market_cap.unwrap_or_default(),
            source: source.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct IngestionAdapter {
    cache: Arc<LifecycleCache>,
}

impl IngestionAdapter {
    pub fn new(cache: Arc<LifecycleCache>) -> Self {
        Self { cache }
    }

    /// Ingest one event. Returns true when a new candidate was created.
    ///
    /// Events without an address are dropped; a known address refreshes
    /// the stored metadata snapshot and nothing else.
    pub fn ingest(&self, event: FeedEvent) -> bool {
        let address = match event.address.as_deref() {
            Some(a) if !a.trim().is_empty() => a.trim().to_string(),
            _ => {
                warn!(
                    name = %event.name,
                    source = %event.source,
                    "Dropping feed event without an address"
                );
                return false;
            }
        };

        let metadata = TokenMetadata {
            name: event.name,
            symbol: event.symbol,
            liquidity_usd: event.liquidity_usd,
            fdv_usd: event.fdv_usd,
            source: event.source,
        };

        let inserted = self.cache.insert_if_new(&address, metadata);
        if inserted {
            info!(%address, "New candidate discovered");
        } else {
            debug!(%address, "Known candidate, metadata refreshed");
        }
        inserted
    }
}

// ---------------------------------------------------------------------------
// HTTP feed poller
// ---------------------------------------------------------------------------

pub struct ListingFeed {
    http: Client,
    feed_url: String,
    poll_interval: Duration,
    adapter: IngestionAdapter,
}

impl ListingFeed {
    pub fn new(
        feed_url: &str,
        poll_interval: Duration,
        adapter: IngestionAdapter,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build feed HTTP client")?;

        Ok(Self {
            http,
            feed_url: feed_url.to_string(),
            poll_interval,
            adapter,
        })
    }

    /// Poll the feed forever. Runs as a background task; the engine aborts
    /// it on shutdown.
    pub async fn run(self) {
        info!(url = %self.feed_url, interval_secs = self.poll_interval.as_secs(), "Listing feed started");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;
            match self.poll_once().await {
                Ok(new) if new > 0 => info!(new_candidates = new, "Feed poll complete"),
                Ok(_) => debug!("Feed poll complete, nothing new"),
                Err(e) => error!(error = %e, "Feed poll failed"),
            }
        }
    }

    /// Fetch and ingest one batch. Returns the number of new candidates.
    async fn poll_once(&self) -> Result<usize> {
        let resp = self
            .http
            .get(&self.feed_url)
            .send()
            .await
            .context("Feed request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Feed returned HTTP {status}");
        }

        let entries: Vec<serde_json::Value> =
            resp.json().await.context("Feed payload was not an array")?;

        let mut new = 0usize;
        for entry in entries {
            // One malformed entry must not drop the rest of the batch.
            let listing: NewListing = match serde_json::from_value(entry) {
                Ok(l) => l,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable feed entry");
                    continue;
                }
            };
            if self.adapter.ingest(listing.into_event("pumpfun")) {
                new += 1;
            }
        }
        Ok(new)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
