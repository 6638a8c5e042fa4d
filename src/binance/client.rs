// =============================================================================
// Binance REST API Client — public market data
// =============================================================================
//
// Only the unsigned `GET /api/v3/klines` endpoint is used.  Every response
// feeds the rate-limit tracker; requests that would push the minute weight
// over our hard cap are refused locally instead of risking a 418 ban.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use super::rate_limit::RateLimitTracker;
use crate::error::CoreError;
use crate::market_data::{Bar, BarSource};
use crate::types::{Symbol, Timeframe};

/// Largest `limit` accepted by `/api/v3/klines`.
const MAX_KLINES: usize = 1000;

/// Binance error code for an unknown symbol.
const INVALID_SYMBOL_CODE: i64 = -1121;

const SOURCE_NAME: &str = "binance";

/// Binance public REST client.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    /// Create a client against `base_url` (normally `https://api.binance.com`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for BinanceClient")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        })
    }

    /// GET /api/v3/klines (public — no signature required).
    ///
    /// Array indices of each kline:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume, ...
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, CoreError> {
        let limit = limit.clamp(1, MAX_KLINES);
        let now_ms = Utc::now().timestamp_millis();

        if !self.rate_limit.can_send_request(klines_weight(limit), now_ms) {
            return Err(CoreError::upstream(SOURCE_NAME, "local request-weight cap reached"));
        }

        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.exchange_id(),
            interval,
            limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::upstream(SOURCE_NAME, format!("GET /api/v3/klines failed: {e}")))?;

        self.rate_limit
            .update_from_headers(resp.headers(), Utc::now().timestamp_millis());

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.map_err(|e| {
            CoreError::upstream(SOURCE_NAME, format!("failed to parse klines response: {e}"))
        })?;

        if !status.is_success() {
            return Err(classify_failure(symbol, status, &body));
        }

        let bars = parse_klines(&body)
            .map_err(|e| CoreError::upstream(SOURCE_NAME, format!("{e:#}")))?;

        debug!(symbol = %symbol, interval = %interval, count = bars.len(), "klines fetched");
        Ok(bars)
    }
}

#[async_trait]
impl BarSource for BinanceClient {
    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, CoreError> {
        self.get_klines(symbol, timeframe, limit).await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -------------------------------------------------------------------------
// Internal helpers
// -------------------------------------------------------------------------

/// Request weight Binance charges for a klines call of `limit` bars.
fn klines_weight(limit: usize) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Map a non-2xx klines response to a core error kind.
fn classify_failure(symbol: &Symbol, status: StatusCode, body: &serde_json::Value) -> CoreError {
    if status == StatusCode::BAD_REQUEST && body["code"].as_i64() == Some(INVALID_SYMBOL_CODE) {
        return CoreError::InvalidSymbol {
            symbol: symbol.to_string(),
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
        warn!(symbol = %symbol, status = %status, "Binance rate limit hit");
    }

    CoreError::upstream(SOURCE_NAME, format!("GET /api/v3/klines returned {status}: {body}"))
}

/// Parse Binance's array-of-arrays klines payload into bars.
fn parse_klines(body: &serde_json::Value) -> Result<Vec<Bar>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut bars = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let timestamp = arr[0].as_i64().context("kline open time is not an integer")?;
        let open = parse_str_f64(&arr[1])?;
        let high = parse_str_f64(&arr[2])?;
        let low = parse_str_f64(&arr[3])?;
        let close = parse_str_f64(&arr[4])?;
        let volume = parse_str_f64(&arr[5])?;

        bars.push(Bar::new(timestamp, open, high, low, close, volume));
    }

    Ok(bars)
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    let parsed = if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))?
    } else if let Some(n) = val.as_f64() {
        n
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    };

    if !parsed.is_finite() {
        anyhow::bail!("non-finite price field: {val}");
    }
    Ok(parsed)
}
