// =============================================================================
// Asset Book — the tracked symbols, their position values and liquidity
// =============================================================================
//
// Owned by the surrounding application and re-read on every refresh tick so
// edits take effect without a restart.  Expected shape:
//
//   {
//     "assets": [ { "symbol": "ETH/USDT", "value": 1500.0 }, ... ],
//     "liquidity": { "usdt": 1000.0, "aed": 3672.5 }
//   }
//
// Rows with a blank symbol are skipped, repeated symbols keep their first
// occurrence, and a malformed symbol stays in the book so it can be reported
// as INVALID_SYMBOL next to the others.
// =============================================================================

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::CoreError;
use crate::types::Symbol;

#[derive(Debug, Default, Deserialize)]
struct RawAssetBook {
    #[serde(default)]
    assets: Vec<RawAsset>,
    #[serde(default)]
    liquidity: Option<RawLiquidity>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawLiquidity {
    #[serde(default)]
    usdt: Option<f64>,
    #[serde(default)]
    aed: Option<f64>,
}

/// Cash on hand, shown only when both currencies are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Liquidity {
    pub usdt: f64,
    pub aed: f64,
}

/// One row of the asset book.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedAsset {
    /// Symbol text as written in the file.
    pub label: String,
    pub symbol: Result<Symbol, CoreError>,
    /// Position value in USD, if given.
    pub value: Option<f64>,
}

/// Ordered, de-duplicated set of tracked assets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetBook {
    pub assets: Vec<TrackedAsset>,
    pub liquidity: Option<Liquidity>,
}

impl AssetBook {
    /// Load the asset book from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read asset book from {}", path.display()))?;

        let book = Self::parse(&content)
            .with_context(|| format!("failed to parse asset book from {}", path.display()))?;

        debug!(path = %path.display(), assets = book.assets.len(), "asset book loaded");
        Ok(book)
    }

    /// Load the asset book, falling back to an empty one when the file is
    /// missing or broken.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            error!(error = %format!("{e:#}"), "asset book unavailable — tracking nothing this tick");
            Self::default()
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawAssetBook = serde_json::from_str(content)?;

        let mut seen = HashSet::new();
        let assets = raw
            .assets
            .into_iter()
            .filter_map(|row| {
                let label = row.symbol?.trim().to_string();
                if label.is_empty() {
                    return None;
                }
                let symbol = Symbol::parse(&label);
                let dedup_key = match &symbol {
                    Ok(s) => s.to_string(),
                    Err(_) => label.clone(),
                };
                seen.insert(dedup_key).then_some(TrackedAsset {
                    label,
                    symbol,
                    value: row.value,
                })
            })
            .collect();

        let liquidity = raw.liquidity.and_then(|l| match (l.usdt, l.aed) {
            (Some(usdt), Some(aed)) => Some(Liquidity { usdt, aed }),
            _ => None,
        });

        Ok(Self { assets, liquidity })
    }

    /// Well-formed symbols in book order.
    pub fn symbols(&self) -> Vec<Symbol> {
        self.assets
            .iter()
            .filter_map(|a| a.symbol.as_ref().ok().cloned())
            .collect()
    }
}
