//! Collaborator interfaces for upstream data.

use async_trait::async_trait;

use super::Bar;
use crate::error::CoreError;
use crate::types::{Symbol, Timeframe};

/// Supplies ordered OHLCV bars for a symbol/timeframe pair.
///
/// Implementations report network, auth and rate-limit failures as
/// [`CoreError::UpstreamUnavailable`] and unknown symbols as
/// [`CoreError::InvalidSymbol`].
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, CoreError>;
}

/// Supplies the market-wide dominance percentage shown next to the signals.
#[async_trait]
pub trait DominanceSource: Send + Sync {
    async fn fetch_dominance(&self) -> Result<f64, CoreError>;
}
