//! Shared types for the VIGIL engine.
//!
//! These types form the data model used across all modules: the tracked
//! candidate record owned by the lifecycle cache, its metadata snapshot,
//! and the verdict produced by each filter-pipeline evaluation.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A newly discovered token under evaluation.
///
/// Created once by the ingestion adapter, mutated only through the
/// lifecycle cache's own methods, and removed on purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateToken {
    /// Token mint address — primary key, immutable.
    pub address: String,
    /// Metadata snapshot from ingestion; refreshed on re-ingestion.
    pub metadata: TokenMetadata,
    pub state: CandidateState,
    /// Set once at insertion, never reset.
    pub first_seen: DateTime<Utc>,
    /// Timestamp of the most recent pipeline evaluation.
    pub last_checked: Option<DateTime<Utc>>,
    /// After this instant, absent a positive signal, the candidate is
    /// purge-eligible. Monotonically non-decreasing while trackable.
    pub expires_at: DateTime<Utc>,
    pub retry_count: u32,
    /// 0 = no positive indicator, 1 = last evaluation passed.
    pub last_signal_strength: u8,
}

impl CandidateToken {
    /// Build a fresh record in the `New` state.
    pub fn new(address: String, metadata: TokenMetadata, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            address,
            metadata,
            state: CandidateState::New,
            first_seen: now,
            last_checked: None,
            expires_at: now + ttl,
            retry_count: 0,
            last_signal_strength: 0,
        }
    }

    /// Time since the candidate was first observed.
    pub fn age(&self) -> Duration {
        Utc::now() - self.first_seen
    }

    /// Whether the candidate is still eligible for scheduling.
    /// `Qualified` is terminal; `Purged` records never stay in the cache.
    pub fn is_trackable(&self) -> bool {
        matches!(
            self.state,
            CandidateState::New | CandidateState::Tracked | CandidateState::Filtered
        )
    }

    /// Whether enough time has elapsed since the last evaluation.
    /// Never-checked candidates are always due.
    pub fn is_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            Some(t) => now - t >= interval,
            None => true,
        }
    }

    /// The purge invariant: past expiry with no positive signal.
    pub fn purge_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_trackable() && now >= self.expires_at && self.last_signal_strength < 1
    }

    /// Helper to build a test candidate with sensible defaults.
    #[cfg(test)]
    pub fn sample(address: &str) -> Self {
        Self::new(
            address.to_string(),
            TokenMetadata::sample(),
            Duration::hours(3),
        )
    }
}

impl fmt::Display for CandidateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} (liq: ${} | fdv: ${} | checks: {})",
            self.metadata.symbol,
            self.state,
            self.address,
            self.metadata.liquidity_usd,
            self.metadata.fdv_usd,
            self.retry_count,
        )
    }
}

/// Metadata snapshot attached to a candidate at ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Pool liquidity in USD equivalent.
    pub liquidity_usd: Decimal,
    /// Fully-diluted valuation in USD equivalent.
    pub fdv_usd: Decimal,
    /// Where the candidate was discovered: "pumpfun", "dexscreener", ...
    pub source: String,
}

impl TokenMetadata {
    #[cfg(test)]
    pub fn sample() -> Self {
        use rust_decimal_macros::dec;
        Self {
            name: "Test Token".to_string(),
            symbol: "TEST".to_string(),
            liquidity_usd: dec!(50_000),
            fdv_usd: dec!(300_000),
            source: "pumpfun".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Candidate lifecycle state.
///
/// `New → Tracked/Filtered` after the first evaluation, `Tracked ↔ Filtered`
/// on subsequent verdicts, `Qualified` terminal, `Purged` on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateState {
    /// Inserted but never evaluated.
    New,
    /// Last evaluation passed (or candidate is mid-lifecycle).
    Tracked,
    /// All stages passed — terminal, sink notified at most once.
    Qualified,
    /// Last evaluation failed; retried on the next cycle until expiry.
    Filtered,
    /// Marked for removal; never persisted.
    Purged,
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateState::New => write!(f, "new"),
            CandidateState::Tracked => write!(f, "tracked"),
            CandidateState::Qualified => write!(f, "qualified"),
            CandidateState::Filtered => write!(f, "filtered"),
            CandidateState::Purged => write!(f, "purged"),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter verdict
// ---------------------------------------------------------------------------

/// The pipeline stage at which a candidate was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterStage {
    Liquidity,
    Valuation,
    Safety,
    Distribution,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterStage::Liquidity => write!(f, "liquidity"),
            FilterStage::Valuation => write!(f, "valuation"),
            FilterStage::Safety => write!(f, "safety"),
            FilterStage::Distribution => write!(f, "distribution"),
        }
    }
}

/// Outcome of a single pipeline evaluation. Ephemeral — drives cache
/// transitions and the per-stage counters, never persisted.
#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub passed: bool,
    pub failed_stage: Option<FilterStage>,
    pub detail: String,
}

impl FilterVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failed_stage: None,
            detail: String::new(),
        }
    }

    pub fn fail(stage: FilterStage, detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            failed_stage: Some(stage),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FilterVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failed_stage {
            None => write!(f, "PASS"),
            Some(stage) => write!(f, "FAIL at {stage}: {}", self.detail),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_candidate_defaults() {
        let c = CandidateToken::sample("addr1");
        assert_eq!(c.state, CandidateState::New);
        assert_eq!(c.retry_count, 0);
        assert_eq!(c.last_signal_strength, 0);
        assert!(c.last_checked.is_none());
        assert!(c.expires_at > c.first_seen);
    }

    #[test]
    fn test_never_checked_is_due() {
        let c = CandidateToken::sample("addr1");
        assert!(c.is_due(Duration::seconds(300), Utc::now()));
    }

    #[test]
    fn test_recently_checked_not_due() {
        let mut c = CandidateToken::sample("addr1");
        c.last_checked = Some(Utc::now());
        assert!(!c.is_due(Duration::seconds(300), Utc::now()));
    }

    #[test]
    fn test_purge_requires_expiry_and_no_signal() {
        let mut c = CandidateToken::sample("addr1");
        let now = Utc::now();

        // Not yet expired
        assert!(!c.purge_eligible(now));

        // Expired without a signal
        c.expires_at = now - Duration::seconds(1);
        assert!(c.purge_eligible(now));

        // Expired but carrying a positive signal
        c.last_signal_strength = 1;
        assert!(!c.purge_eligible(now));
    }

    #[test]
    fn test_qualified_not_trackable() {
        let mut c = CandidateToken::sample("addr1");
        c.state = CandidateState::Qualified;
        assert!(!c.is_trackable());
        c.expires_at = Utc::now() - Duration::hours(1);
        assert!(!c.purge_eligible(Utc::now()));
    }

    #[test]
    fn test_verdict_display() {
        let pass = FilterVerdict::pass();
        assert!(pass.passed);
        assert_eq!(format!("{pass}"), "PASS");

        let fail = FilterVerdict::fail(FilterStage::Liquidity, "below floor");
        assert!(!fail.passed);
        assert_eq!(fail.failed_stage, Some(FilterStage::Liquidity));
        assert_eq!(format!("{fail}"), "FAIL at liquidity: below floor");
    }

    #[test]
    fn test_candidate_serde_roundtrip() {
        let c = CandidateToken::sample("addr1");
        let json = serde_json::to_string(&c).unwrap();
        let back: CandidateToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address, c.address);
        assert_eq!(back.state, c.state);
        assert_eq!(back.metadata.liquidity_usd, c.metadata.liquidity_usd);
    }
}
