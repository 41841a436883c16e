//! Oracle client adapters.
//!
//! Defines the `ReputationOracle` and `SupplyOracle` traits, the classified
//! error taxonomy shared by all oracle calls, and provides implementations
//! for:
//! - RugCheck-style safety reports (`rugcheck`)
//! - Solana-style JSON-RPC supply/holder queries (`holders`)
//!
//! Every call site goes through the retry executor (`retry`), and every
//! unresolved error resolves to a filter rejection — never a pass.

pub mod holders;
pub mod retry;
pub mod rugcheck;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Classified failure of an oracle call.
///
/// The retry executor retries `RateLimited`, `Transient`, and `Timeout`
/// up to its attempt budget; the rest surface immediately. All variants
/// end as stage rejections at the filter layer.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient network error: {0}")]
    Transient(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("oracle failure: {0}")]
    Fatal(String),
}

impl OracleError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            OracleError::RateLimited(_) | OracleError::Transient(_) | OracleError::Timeout(_)
        )
    }
}

/// Map an HTTP status line onto the taxonomy. Shared by both clients.
pub(crate) fn classify_status(status: reqwest::StatusCode, what: &str) -> OracleError {
    if status == reqwest::StatusCode::NOT_FOUND {
        OracleError::NotFound(what.to_string())
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        OracleError::RateLimited(format!("{what}: HTTP 429"))
    } else if status.is_server_error() {
        OracleError::Transient(format!("{what}: HTTP {status}"))
    } else {
        OracleError::Fatal(format!("{what}: HTTP {status}"))
    }
}

/// Map a transport-level reqwest failure onto the taxonomy.
pub(crate) fn classify_transport(err: reqwest::Error, what: &str) -> OracleError {
    if err.is_timeout() || err.is_connect() {
        OracleError::Transient(format!("{what}: {err}"))
    } else if err.is_decode() {
        OracleError::Malformed(format!("{what}: {err}"))
    } else {
        OracleError::Fatal(format!("{what}: {err}"))
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Reputation/safety oracle: asked whether an asset is compromised.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReputationOracle: Send + Sync {
    /// Fetch the safety report for a token address.
    /// A 404-equivalent response surfaces as `OracleError::NotFound`.
    async fn safety_report(&self, address: &str) -> Result<SafetyReport, OracleError>;
}

/// Supply/holder-distribution oracle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SupplyOracle: Send + Sync {
    /// Total token supply in base units.
    async fn total_supply(&self, address: &str) -> Result<u128, OracleError>;

    /// Largest holder balances, ordered descending. Callers consume the
    /// top 10.
    async fn largest_holders(&self, address: &str) -> Result<Vec<HolderBalance>, OracleError>;
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Safety report consumed from the reputation oracle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SafetyReport {
    #[serde(default)]
    pub rugged: bool,
    /// "safe" | "warning" | "danger" | "blacklisted"
    #[serde(default)]
    pub result: String,
    #[serde(default, rename = "mintAuthority")]
    pub mint_authority: Option<String>,
    #[serde(default, rename = "freezeAuthority")]
    pub freeze_authority: Option<String>,
    #[serde(default, rename = "knownAccounts")]
    pub known_accounts: Vec<KnownAccount>,
}

impl SafetyReport {
    /// Whether an issuer-side authority field names a live key.
    /// Oracles report revoked authorities as null, "" or "null".
    pub fn authority_active(field: &Option<String>) -> bool {
        match field {
            Some(s) => !s.is_empty() && s != "null",
            None => false,
        }
    }
}

/// An account the oracle associates with known bad actors.
#[derive(Debug, Clone, Deserialize)]
pub struct KnownAccount {
    #[serde(default)]
    pub address: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// A single entry from the largest-holders listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderBalance {
    /// Balance in base units.
    pub amount: u128,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
