//! Supply/holder-distribution oracle over Solana-style JSON-RPC.
//!
//! Two methods are consumed by the distribution filter:
//! - `getTokenSupply` → total supply in base units
//! - `getTokenLargestAccounts` → holder balances, largest first
//!
//! Balances come back as decimal strings; any parse failure is a
//! malformed response, which the filter layer rejects fail-closed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::oracle::{classify_status, classify_transport, HolderBalance, OracleError, SupplyOracle};

pub struct RpcSupplyClient {
    http: Client,
    rpc_url: String,
}

// -- JSON-RPC response shapes ------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<RpcResult<T>>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcResult<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
}

impl RpcSupplyClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build RPC HTTP client")?;

        Ok(Self {
            http,
            rpc_url: rpc_url.to_string(),
        })
    }

    /// Issue one JSON-RPC call and unwrap the `result.value` payload.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        address: &str,
    ) -> Result<T, OracleError> {
        let what = format!("{method} for {address}");
        debug!(method, address, "RPC call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": [address],
        });

        let resp = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, &what))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, &what));
        }

        let parsed: RpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(format!("{what}: {e}")))?;

        if let Some(err) = parsed.error {
            let msg = err.message.to_lowercase();
            return if msg.contains("not found") || msg.contains("could not find") {
                Err(OracleError::NotFound(what))
            } else {
                Err(OracleError::Fatal(format!(
                    "{what}: RPC error {} ({})",
                    err.code, err.message
                )))
            };
        }

        match parsed.result {
            Some(r) => Ok(r.value),
            None => Err(OracleError::Malformed(format!(
                "{what}: response carried neither result nor error"
            ))),
        }
    }

    fn parse_amount(raw: &str, what: &str) -> Result<u128, OracleError> {
        raw.parse::<u128>()
            .map_err(|_| OracleError::Malformed(format!("{what}: bad amount {raw:?}")))
    }
}

#[async_trait]
impl SupplyOracle for RpcSupplyClient {
    async fn total_supply(&self, address: &str) -> Result<u128, OracleError> {
        let value: TokenAmount = self.call("getTokenSupply", address).await?;
        Self::parse_amount(&value.amount, &format!("total supply for {address}"))
    }

    async fn largest_holders(&self, address: &str) -> Result<Vec<HolderBalance>, OracleError> {
        let value: Vec<TokenAmount> = self.call("getTokenLargestAccounts", address).await?;
        value
            .iter()
            .map(|entry| {
                Self::parse_amount(&entry.amount, &format!("holder balance for {address}"))
                    .map(|amount| HolderBalance { amount })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
