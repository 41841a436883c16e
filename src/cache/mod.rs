//! Lifecycle cache: the single source of truth for tracked candidates.
//!
//! Exclusive owner of all `CandidateToken` records — lifecycle fields are
//! mutated only through the methods here, never by external code reaching
//! into the map. Every operation takes the lock for the whole mutation, so
//! reads used for scheduling decisions are linearizable with respect to
//! outcome application and purging: a stale read can never double-purge a
//! candidate or lose a positive signal.
//!
//! Snapshot save/load mirrors the JSON state file used at startup and on
//! periodic checkpoints. Absence of the file is a fresh start, not an error.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{CandidateState, CandidateToken, FilterVerdict, TokenMetadata};

/// Default snapshot file path.
const DEFAULT_SNAPSHOT_FILE: &str = "vigil_state.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Consistency failures surfaced to the scheduler; the affected candidate
/// is skipped for the current cycle, never silently ignored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("address not tracked: {0}")]
    UnknownAddress(String),

    #[error("candidate in terminal state: {0}")]
    TerminalState(String),
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Aggregate counts per lifecycle state, for cycle logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub new: usize,
    pub tracked: usize,
    pub filtered: usize,
    pub qualified: usize,
}

pub struct LifecycleCache {
    inner: Mutex<HashMap<String, CandidateToken>>,
    /// Tracking window granted at insertion.
    ttl: Duration,
}

impl LifecycleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Rebuild a cache from a restored snapshot map.
    pub fn restore(snapshot: HashMap<String, CandidateToken>, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(snapshot),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CandidateToken>> {
        // A panic while holding the lock leaves only bookkeeping state
        // behind; recover the map rather than cascading the poison.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a candidate if its address is unknown.
    ///
    /// Returns true when a new record was created. Re-insertion of a known
    /// address refreshes the metadata snapshot only — liquidity and
    /// valuation move fast on new listings — and never touches `first_seen`,
    /// `state`, or any other lifecycle field.
    pub fn insert_if_new(&self, address: &str, metadata: TokenMetadata) -> bool {
        let mut map = self.lock();
        match map.get_mut(address) {
            Some(existing) => {
                existing.metadata = metadata;
                false
            }
            None => {
                debug!(address, "Tracking new candidate");
                map.insert(
                    address.to_string(),
                    CandidateToken::new(address.to_string(), metadata, self.ttl),
                );
                true
            }
        }
    }

    /// All trackable records whose last check is at least `interval` old.
    /// Returns clones taken under the lock — a consistent point-in-time view.
    pub fn due_for_recheck(&self, interval: Duration) -> Vec<CandidateToken> {
        let now = Utc::now();
        self.lock()
            .values()
            .filter(|c| c.is_trackable() && c.is_due(interval, now))
            .cloned()
            .collect()
    }

    /// Apply one evaluation outcome.
    ///
    /// On pass: extend `expires_at` to `now + extend_by` (never backwards)
    /// and record a positive signal. On fail: clear the signal and leave
    /// `expires_at` untouched. Either way the check is accounted for.
    pub fn record_outcome(
        &self,
        address: &str,
        verdict: &FilterVerdict,
        extend_by: Duration,
    ) -> Result<(), CacheError> {
        let mut map = self.lock();
        let candidate = map
            .get_mut(address)
            .ok_or_else(|| CacheError::UnknownAddress(address.to_string()))?;

        if !candidate.is_trackable() {
            return Err(CacheError::TerminalState(address.to_string()));
        }

        let now = Utc::now();
        candidate.retry_count += 1;
        candidate.last_checked = Some(now);

        if verdict.passed {
            candidate.last_signal_strength = 1;
            candidate.expires_at = candidate.expires_at.max(now + extend_by);
            candidate.state = CandidateState::Tracked;
        } else {
            candidate.last_signal_strength = 0;
            candidate.state = CandidateState::Filtered;
        }

        Ok(())
    }

    /// One-shot transition into the terminal `Qualified` state.
    ///
    /// Returns false if the candidate already qualified — the guard that
    /// keeps the qualification sink at-most-once per address.
    pub fn promote_to_qualified(&self, address: &str) -> Result<bool, CacheError> {
        let mut map = self.lock();
        let candidate = map
            .get_mut(address)
            .ok_or_else(|| CacheError::UnknownAddress(address.to_string()))?;

        if candidate.state == CandidateState::Qualified {
            return Ok(false);
        }

        candidate.state = CandidateState::Qualified;
        Ok(true)
    }

    /// Remove and return all addresses satisfying the purge invariant:
    /// past expiry with no positive signal. This is the only deletion path.
    pub fn purge_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let mut map = self.lock();

        let doomed: Vec<String> = map
            .values()
            .filter(|c| c.purge_eligible(now))
            .map(|c| c.address.clone())
            .collect();

        for address in &doomed {
            if let Some(mut candidate) = map.remove(address) {
                candidate.state = CandidateState::Purged;
                debug!(address = %candidate.address, checks = candidate.retry_count, "Candidate purged");
            }
        }

        doomed
    }

    /// Look up a single candidate (point-in-time clone).
    pub fn get(&self, address: &str) -> Option<CandidateToken> {
        self.lock().get(address).cloned()
    }

    /// Full point-in-time copy of the cache contents.
    pub fn snapshot(&self) -> HashMap<String, CandidateToken> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let map = self.lock();
        let mut stats = CacheStats {
            total: map.len(),
            ..Default::default()
        };
        for c in map.values() {
            match c.state {
                CandidateState::New => stats.new += 1,
                CandidateState::Tracked => stats.tracked += 1,
                CandidateState::Filtered => stats.filtered += 1,
                CandidateState::Qualified => stats.qualified += 1,
                CandidateState::Purged => {}
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// Snapshot persistence
// ---------------------------------------------------------------------------

/// Save the cache contents to a JSON file.
pub fn save_snapshot(cache: &LifecycleCache, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    let snapshot = cache.snapshot();
    let json = serde_json::to_string_pretty(&snapshot)
        .context("Failed to serialise cache snapshot")?;

    std::fs::write(path, &json)
        .with_context(|| format!("Failed to write snapshot to {path}"))?;

    debug!(path, candidates = snapshot.len(), "Snapshot saved");
    Ok(())
}

/// Load a snapshot from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_snapshot(path: Option<&str>) -> Result<Option<HashMap<String, CandidateToken>>> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved snapshot found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot from {path}"))?;

    let snapshot: HashMap<String, CandidateToken> = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse snapshot from {path}"))?;

    info!(path, candidates = snapshot.len(), "Snapshot loaded from disk");
    Ok(Some(snapshot))
}

/// Delete the snapshot file (for testing or reset).
pub fn delete_snapshot(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_SNAPSHOT_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete snapshot file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
