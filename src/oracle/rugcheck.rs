//! RugCheck-style reputation oracle client.
//!
//! Fetches the safety report for a token address from a
//! `{base_url}/{address}/report` endpoint. The report carries the rug
//! verdict, issuer-side authority fields, and known bad-actor links
//! consumed by the safety filter stage.
//!
//! Error handling is strictly classified: 404 means the oracle has never
//! seen the token (the filter treats that as fail-closed), 429 is a rate
//! limit for the retry executor, parse failures are malformed responses.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use crate::oracle::{classify_status, classify_transport, OracleError, ReputationOracle, SafetyReport};

pub struct RugcheckClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl RugcheckClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RugCheck HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn report_url(&self, address: &str) -> String {
        format!("{}/{}/report", self.base_url, urlencoding::encode(address))
    }
}

#[async_trait]
impl ReputationOracle for RugcheckClient {
    async fn safety_report(&self, address: &str) -> Result<SafetyReport, OracleError> {
        let url = self.report_url(address);
        debug!(address, "Fetching safety report");

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify_transport(e, "safety report"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, &format!("safety report for {address}")));
        }

        let report: SafetyReport = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("safety report for {address}: {e}")))?;

        debug!(
            address,
            rugged = report.rugged,
            result = %report.result,
            "Safety report received"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RugcheckClient {
        RugcheckClient::new(
            "https://api.rugcheck.xyz/token/",
            None,
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_report_url_strips_trailing_slash() {
        let c = client();
        assert_eq!(
            c.report_url("So11111111111111111111111111111111111111112"),
            "https://api.rugcheck.xyz/token/So11111111111111111111111111111111111111112/report"
        );
    }

    #[test]
    fn test_report_url_encodes_address() {
        let c = client();
        // Addresses are base58 in practice; the client must not build a
        // broken URL if an upstream feed hands us garbage.
        assert_eq!(
            c.report_url("a/b c"),
            "https://api.rugcheck.xyz/token/a%2Fb%20c/report"
        );
    }
}
