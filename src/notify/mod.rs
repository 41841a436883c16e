//! Qualification sinks.
//!
//! A sink is notified exactly once per candidate, at the moment the cache
//! promotes it to `Qualified`. Delivery failures are logged and dropped —
//! the promotion already happened and is never rolled back, so a flaky
//! sink cannot cause duplicate alerts on later cycles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::time::Duration;
use tracing::info;

use crate::types::CandidateToken;

#[async_trait]
pub trait QualificationSink: Send + Sync {
    async fn notify_qualified(&self, candidate: &CandidateToken) -> Result<()>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------

/// Default sink: a structured log line. Used when no alert channel is
/// configured.
pub struct LogSink;

#[async_trait]
impl QualificationSink for LogSink {
    async fn notify_qualified(&self, candidate: &CandidateToken) -> Result<()> {
        info!(
            address = %candidate.address,
            symbol = %candidate.metadata.symbol,
            liquidity_usd = %candidate.metadata.liquidity_usd,
            fdv_usd = %candidate.metadata.fdv_usd,
            checks = candidate.retry_count,
            "QUALIFIED candidate"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ---------------------------------------------------------------------------
// Telegram sink
// ---------------------------------------------------------------------------

/// Pushes a Markdown alert through the Telegram bot API.
pub struct TelegramSink {
    http: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramSink {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http,
            bot_token,
            chat_id,
        })
    }

    fn format_alert(candidate: &CandidateToken) -> String {
        format!(
            "🚨 *New qualified token*\n\
             *{}* ({})\n\
             `{}`\n\
             Liquidity: ${}\n\
             FDV: ${}\n\
             Source: {}\n\
             Checks before qualification: {}",
            candidate.metadata.name,
            candidate.metadata.symbol,
            candidate.address,
            candidate.metadata.liquidity_usd,
            candidate.metadata.fdv_usd,
            candidate.metadata.source,
            candidate.retry_count,
        )
    }
}

#[async_trait]
impl QualificationSink for TelegramSink {
    async fn notify_qualified(&self, candidate: &CandidateToken) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token.expose_secret()
        );

        let resp = self
            .http
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": Self::format_alert(candidate),
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Telegram sendMessage returned HTTP {status}");
        }

        info!(address = %candidate.address, "Telegram alert sent");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        let sink = LogSink;
        assert_eq!(sink.name(), "log");
        assert!(sink
            .notify_qualified(&CandidateToken::sample("addr1"))
            .await
            .is_ok());
    }

    #[test]
    fn test_alert_formatting() {
        let c = CandidateToken::sample("So11111111111111111111111111111111111111112");
        let alert = TelegramSink::format_alert(&c);
        assert!(alert.contains("Test Token"));
        assert!(alert.contains("TEST"));
        assert!(alert.contains("So11111111111111111111111111111111111111112"));
        assert!(alert.contains("50000"));
        assert!(alert.contains("pumpfun"));
    }
}
