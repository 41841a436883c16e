//! The evaluation pipeline: four ordered, short-circuiting stages.
//!
//! 1. Liquidity floor (pure metadata, no network)
//! 2. Valuation band (pure metadata, no network)
//! 3. Safety report from the reputation oracle
//! 4. Holder-distribution concentration from the supply oracle
//!
//! The pipeline is fail-closed: an oracle error that survives the retry
//! budget rejects the candidate at that stage. A rejection here is not
//! terminal — the scheduler retries the candidate on later cycles until
//! its tracking window expires.
//!
//! Concentration math is integer-only: ceilings are basis points and
//! balances are base units, so `amount * 10_000 >= total * ceiling_bps`
//! compares exact ratios without floating point.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::FiltersConfig;
use crate::oracle::retry::{with_retry, RetryPolicy};
use crate::oracle::{ReputationOracle, SafetyReport, SupplyOracle};
use crate::types::{CandidateToken, FilterStage, FilterVerdict};

/// How many of the largest holders the concentration check considers.
const TOP_HOLDER_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Filter thresholds in their internal representation.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_liquidity_usd: Decimal,
    pub min_fdv_usd: Decimal,
    pub max_fdv_usd: Decimal,
    /// Top-holder ceiling in basis points for mature candidates.
    pub top_holder_ceiling_bps: u128,
    /// Relaxed ceiling for candidates younger than the age cutoff.
    pub top_holder_ceiling_bps_new: u128,
    pub young_candidate_age: chrono::Duration,
}

impl From<&FiltersConfig> for FilterConfig {
    fn from(cfg: &FiltersConfig) -> Self {
        Self {
            min_liquidity_usd: cfg.min_liquidity_usd,
            min_fdv_usd: cfg.min_fdv_usd,
            max_fdv_usd: cfg.max_fdv_usd,
            top_holder_ceiling_bps: percent_to_bps(cfg.top_holder_max_percent),
            top_holder_ceiling_bps_new: percent_to_bps(cfg.top_holder_max_percent_new),
            young_candidate_age: chrono::Duration::seconds(cfg.young_candidate_age_secs as i64),
        }
    }
}

fn percent_to_bps(percent: f64) -> u128 {
    (percent * 100.0).round().max(0.0) as u128
}

// ---------------------------------------------------------------------------
// Rejection counters
// ---------------------------------------------------------------------------

/// Cumulative per-stage rejection counters, shared across cycles.
#[derive(Debug, Default)]
pub struct FilterStats {
    passed: AtomicU64,
    liquidity: AtomicU64,
    valuation: AtomicU64,
    safety: AtomicU64,
    distribution: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStatsSnapshot {
    pub passed: u64,
    pub liquidity: u64,
    pub valuation: u64,
    pub safety: u64,
    pub distribution: u64,
}

impl FilterStats {
    fn record(&self, verdict: &FilterVerdict) {
        let counter = match verdict.failed_stage {
            None => &self.passed,
            Some(FilterStage::Liquidity) => &self.liquidity,
            Some(FilterStage::Valuation) => &self.valuation,
            Some(FilterStage::Safety) => &self.safety,
            Some(FilterStage::Distribution) => &self.distribution,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FilterStatsSnapshot {
        FilterStatsSnapshot {
            passed: self.passed.load(Ordering::Relaxed),
            liquidity: self.liquidity.load(Ordering::Relaxed),
            valuation: self.valuation.load(Ordering::Relaxed),
            safety: self.safety.load(Ordering::Relaxed),
            distribution: self.distribution.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct FilterPipeline {
    reputation: Arc<dyn ReputationOracle>,
    supply: Arc<dyn SupplyOracle>,
    retry: RetryPolicy,
    cfg: FilterConfig,
    stats: FilterStats,
}

impl FilterPipeline {
    pub fn new(
        reputation: Arc<dyn ReputationOracle>,
        supply: Arc<dyn SupplyOracle>,
        cfg: FilterConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            reputation,
            supply,
            retry,
            cfg,
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> FilterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run the full pipeline against one candidate.
    ///
    /// Stages run in order and short-circuit on the first rejection, so
    /// the cheap metadata screens spare the oracles from obvious misses.
    pub async fn evaluate(&self, candidate: &CandidateToken) -> FilterVerdict {
        let verdict = self.evaluate_inner(candidate).await;
        self.stats.record(&verdict);

        if verdict.passed {
            info!(address = %candidate.address, symbol = %candidate.metadata.symbol, "Candidate passed all filter stages");
        } else {
            debug!(address = %candidate.address, verdict = %verdict, "Candidate rejected");
        }
        verdict
    }

    async fn evaluate_inner(&self, candidate: &CandidateToken) -> FilterVerdict {
        if let Some(verdict) = self.screen_metadata(candidate) {
            return verdict;
        }
        if let Some(verdict) = self.screen_safety(&candidate.address).await {
            return verdict;
        }
        if let Some(verdict) = self.screen_distribution(candidate).await {
            return verdict;
        }
        FilterVerdict::pass()
    }

    // -- Stage 1 & 2: metadata ------------------------------------------

    fn screen_metadata(&self, candidate: &CandidateToken) -> Option<FilterVerdict> {
        let meta = &candidate.metadata;

        if meta.liquidity_usd < self.cfg.min_liquidity_usd {
            return Some(FilterVerdict::fail(
                FilterStage::Liquidity,
                format!(
                    "liquidity ${} below floor ${}",
                    meta.liquidity_usd, self.cfg.min_liquidity_usd
                ),
            ));
        }

        if meta.fdv_usd <= Decimal::ZERO {
            return Some(FilterVerdict::fail(
                FilterStage::Valuation,
                "non-positive fully-diluted valuation",
            ));
        }
        if meta.fdv_usd < self.cfg.min_fdv_usd || meta.fdv_usd > self.cfg.max_fdv_usd {
            return Some(FilterVerdict::fail(
                FilterStage::Valuation,
                format!(
                    "fdv ${} outside band [${}, ${}]",
                    meta.fdv_usd, self.cfg.min_fdv_usd, self.cfg.max_fdv_usd
                ),
            ));
        }

        None
    }

    // -- Stage 3: safety -------------------------------------------------

    async fn screen_safety(&self, address: &str) -> Option<FilterVerdict> {
        let report = match with_retry(&self.retry, "safety report", || {
            self.reputation.safety_report(address)
        })
        .await
        {
            Ok(report) => report,
            Err(e) => {
                // Fail closed: no report, no pass.
                return Some(FilterVerdict::fail(
                    FilterStage::Safety,
                    format!("safety report unavailable: {e}"),
                ));
            }
        };

        Self::screen_safety_report(&report)
    }

    fn screen_safety_report(report: &SafetyReport) -> Option<FilterVerdict> {
        if report.rugged {
            return Some(FilterVerdict::fail(FilterStage::Safety, "flagged as rugged"));
        }

        let result = report.result.to_lowercase();
        if result == "danger" || result == "blacklisted" {
            return Some(FilterVerdict::fail(
                FilterStage::Safety,
                format!("oracle verdict: {result}"),
            ));
        }

        if SafetyReport::authority_active(&report.mint_authority) {
            return Some(FilterVerdict::fail(
                FilterStage::Safety,
                "mint authority still active",
            ));
        }
        if SafetyReport::authority_active(&report.freeze_authority) {
            return Some(FilterVerdict::fail(
                FilterStage::Safety,
                "freeze authority still active",
            ));
        }

        if !report.known_accounts.is_empty() {
            return Some(FilterVerdict::fail(
                FilterStage::Safety,
                format!("{} known bad-actor link(s)", report.known_accounts.len()),
            ));
        }

        None
    }

    // -- Stage 4: distribution -------------------------------------------

    async fn screen_distribution(&self, candidate: &CandidateToken) -> Option<FilterVerdict> {
        let address = &candidate.address;

        let total = match with_retry(&self.retry, "total supply", || {
            self.supply.total_supply(address)
        })
        .await
        {
            Ok(total) => total,
            Err(e) => {
                return Some(FilterVerdict::fail(
                    FilterStage::Distribution,
                    format!("supply unavailable: {e}"),
                ));
            }
        };

        if total == 0 {
            return Some(FilterVerdict::fail(
                FilterStage::Distribution,
                "zero total supply",
            ));
        }

        let holders = match with_retry(&self.retry, "largest holders", || {
            self.supply.largest_holders(address)
        })
        .await
        {
            Ok(holders) => holders,
            Err(e) => {
                return Some(FilterVerdict::fail(
                    FilterStage::Distribution,
                    format!("holder data unavailable: {e}"),
                ));
            }
        };

        if holders.is_empty() {
            return Some(FilterVerdict::fail(
                FilterStage::Distribution,
                "no holder data",
            ));
        }

        let ceiling_bps = if candidate.age() < self.cfg.young_candidate_age {
            self.cfg.top_holder_ceiling_bps_new
        } else {
            self.cfg.top_holder_ceiling_bps
        };

        // Each of the top holders is checked on its own: one whale is a
        // rejection even when the rest of the book is flat. Exact ratio
        // comparison, amount/total >= ceiling/10_000 rejects.
        for (idx, holder) in holders.iter().take(TOP_HOLDER_COUNT).enumerate() {
            if holder.amount * 10_000 >= total * ceiling_bps {
                return Some(FilterVerdict::fail(
                    FilterStage::Distribution,
                    format!(
                        "holder #{} owns {} of {total} base units (ceiling {ceiling_bps} bps)",
                        idx + 1,
                        holder.amount,
                    ),
                ));
            }
        }

        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
