//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub filters: FiltersConfig,
    pub oracles: OraclesConfig,
    pub ingestion: IngestionConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Seconds between recheck cycles (and minimum age of a check
    /// before a candidate becomes due again).
    pub recheck_interval_secs: u64,
    /// Tracking window granted at insertion.
    pub candidate_ttl_secs: u64,
    /// Lifetime extension granted on a passing evaluation.
    pub extend_on_signal_secs: u64,
    /// Upper bound on concurrent candidate evaluations per cycle.
    pub max_concurrent_checks: usize,
    /// Path of the cache snapshot file.
    #[serde(default)]
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FiltersConfig {
    pub min_liquidity_usd: Decimal,
    pub min_fdv_usd: Decimal,
    pub max_fdv_usd: Decimal,
    /// Top-holder ceiling (percent of total supply) for mature candidates.
    pub top_holder_max_percent: f64,
    /// Relaxed ceiling for candidates younger than the age cutoff —
    /// distribution has not stabilised yet on very recent listings.
    pub top_holder_max_percent_new: f64,
    /// Age cutoff (seconds) below which the relaxed ceiling applies.
    pub young_candidate_age_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OraclesConfig {
    /// Reputation/safety oracle base URL (RugCheck-style report endpoint).
    pub rugcheck_base_url: String,
    /// Env var holding an optional API key for the safety oracle.
    #[serde(default)]
    pub rugcheck_api_key_env: Option<String>,
    /// JSON-RPC endpoint for supply and holder queries.
    pub rpc_url: String,
    /// Per-attempt timeout applied to every oracle call.
    pub request_timeout_secs: u64,
    /// Retry budget, including the first attempt.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    pub enabled: bool,
    /// New-listing endpoint polled by the feed adapter.
    pub feed_url: String,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would run a pipeline guaranteed to fail
    /// every candidate. These abort startup rather than limp along.
    pub fn validate(&self) -> Result<()> {
        if self.oracles.rugcheck_base_url.trim().is_empty() {
            anyhow::bail!("oracles.rugcheck_base_url must be configured");
        }
        if self.oracles.rpc_url.trim().is_empty() {
            anyhow::bail!("oracles.rpc_url must be configured");
        }
        if self.oracles.max_attempts == 0 {
            anyhow::bail!("oracles.max_attempts must be at least 1");
        }
        if self.agent.recheck_interval_secs == 0 {
            anyhow::bail!("agent.recheck_interval_secs must be positive");
        }
        if self.agent.max_concurrent_checks == 0 {
            anyhow::bail!("agent.max_concurrent_checks must be at least 1");
        }
        if self.ingestion.enabled && self.ingestion.feed_url.trim().is_empty() {
            anyhow::bail!("ingestion.feed_url must be configured when ingestion is enabled");
        }
        if self.filters.max_fdv_usd < self.filters.min_fdv_usd {
            anyhow::bail!("filters.max_fdv_usd must not be below filters.min_fdv_usd");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
        [agent]
        name = "VIGIL-001"
        recheck_interval_secs = 300
        candidate_ttl_secs = 10800
        extend_on_signal_secs = 3600
        max_concurrent_checks = 4

        [filters]
        min_liquidity_usd = 20000.0
        min_fdv_usd = 10000.0
        max_fdv_usd = 500000.0
        top_holder_max_percent = 5.0
        top_holder_max_percent_new = 80.0
        young_candidate_age_secs = 300

        [oracles]
        rugcheck_base_url = "https://api.rugcheck.xyz/token"
        rpc_url = "https://mainnet.example.com/rpc"
        request_timeout_secs = 10
        max_attempts = 5
        base_delay_ms = 1000

        [ingestion]
        enabled = true
        feed_url = "https://pump.fun/api/tokens"
        poll_interval_secs = 30

        [alerts]
        telegram_bot_token_env = "TELEGRAM_BOT_TOKEN"
        telegram_chat_id_env = "TELEGRAM_CHAT_ID"
    "#;

    #[test]
    fn test_parse_sample_config() {
        let cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.agent.name, "VIGIL-001");
        assert_eq!(cfg.agent.recheck_interval_secs, 300);
        assert_eq!(cfg.filters.min_liquidity_usd, dec!(20_000));
        assert_eq!(cfg.oracles.max_attempts, 5);
        assert!(cfg.ingestion.enabled);
        assert!(cfg.agent.snapshot_path.is_none());
    }

    #[test]
    fn test_missing_oracle_endpoint_rejected() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.oracles.rugcheck_base_url = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.oracles.rpc_url = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_retry_budget_rejected() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.oracles.max_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_feed_url_required_when_enabled() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.ingestion.feed_url = String::new();
        assert!(cfg.validate().is_err());

        // Disabled ingestion tolerates an empty URL
        cfg.ingestion.enabled = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_inverted_fdv_bounds_rejected() {
        let mut cfg: AppConfig = toml::from_str(SAMPLE).unwrap();
        cfg.filters.min_fdv_usd = dec!(1_000_000);
        assert!(cfg.validate().is_err());
    }
}
