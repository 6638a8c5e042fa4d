// =============================================================================
// Dominance Monitor — BTC share of total crypto market capitalisation
// =============================================================================
//
// Display-only context for the signal table.  The value never feeds an
// indicator and a failed fetch is shown as "unavailable"; it is fetched
// alongside, not before, the per-symbol work.
//
// Source: CoinGecko `GET /api/v3/global`
//   { "data": { "market_cap_percentage": { "btc": 52.31, ... } } }
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::market_data::DominanceSource;

const SOURCE_NAME: &str = "dominance";

/// Fetches the BTC dominance percentage.
pub struct DominanceMonitor {
    client: reqwest::Client,
    url: String,
}

impl DominanceMonitor {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for DominanceMonitor")?;
        Ok(Self::with_client(client, url))
    }

    /// Create a monitor that re-uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn fetch(&self) -> Result<f64> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse dominance response body")?;

        if !status.is_success() {
            anyhow::bail!("dominance API returned {}: {}", status, body);
        }

        let pct = parse_dominance(&body)?;
        debug!(dominance_pct = pct, "BTC dominance fetched");
        Ok(pct)
    }
}

#[async_trait]
impl DominanceSource for DominanceMonitor {
    async fn fetch_dominance(&self) -> Result<f64, CoreError> {
        self.fetch()
            .await
            .map_err(|e| CoreError::upstream(SOURCE_NAME, format!("{e:#}")))
    }
}

/// Extract and validate `data.market_cap_percentage.btc`.
fn parse_dominance(body: &serde_json::Value) -> Result<f64> {
    let pct = body["data"]["market_cap_percentage"]["btc"]
        .as_f64()
        .context("response missing data.market_cap_percentage.btc")?;

    if !(0.0..=100.0).contains(&pct) {
        anyhow::bail!("dominance {pct} outside [0, 100]");
    }
    Ok(pct)
}

/// Dominance as shown next to the signal table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DominanceReading {
    Available { percentage: f64 },
    Unavailable { reason: String },
}

impl DominanceReading {
    /// Fetch from `source`, folding any failure into `Unavailable`.
    pub async fn read(source: &dyn DominanceSource) -> Self {
        match source.fetch_dominance().await {
            Ok(percentage) => Self::Available { percentage },
            Err(e) => {
                debug!(error = %e, "dominance unavailable");
                Self::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }
}
