use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Symbol, Timeframe};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV bar. `timestamp` is the bar open time in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Composite key that identifies a unique bar series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self { symbol, timeframe }
    }
}

impl std::fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

// ---------------------------------------------------------------------------
// BarSeries
// ---------------------------------------------------------------------------

/// Time-ascending bars for one symbol/timeframe with unique timestamps.
///
/// Built once from whatever the bar source returned and never mutated
/// afterwards; a refresh produces a brand new series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    key: SeriesKey,
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Normalise `bars` into a valid series: stable sort by timestamp, and for
    /// duplicated timestamps the last occurrence wins (the exchange re-sends
    /// the in-progress bar with fresher values).
    pub fn new(key: SeriesKey, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);

        let before = bars.len();
        let mut unique: Vec<Bar> = Vec::with_capacity(before);
        for bar in bars {
            match unique.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => unique.push(bar),
            }
        }

        if unique.len() != before {
            debug!(
                key = %key,
                dropped = before - unique.len(),
                "duplicate bar timestamps collapsed"
            );
        }

        Self { key, bars: unique }
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Close prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SeriesKey {
        SeriesKey::new(Symbol::parse("ETH/USDT").unwrap(), Timeframe::H1)
    }

    fn bar(ts: i64, close: f64) -> Bar {
        Bar::new(ts, close, close + 1.0, close - 1.0, close, 10.0)
    }

    #[test]
    fn series_is_sorted_by_timestamp() {
        let series = BarSeries::new(key(), vec![bar(3, 3.0), bar(1, 1.0), bar(2, 2.0)]);
        let ts: Vec<i64> = series.bars().iter().map(|b| b.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn duplicate_timestamps_keep_last_occurrence() {
        let series = BarSeries::new(key(), vec![bar(1, 1.0), bar(2, 2.0), bar(2, 2.5)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars().last().map(|b| b.close), Some(2.5));
    }

    #[test]
    fn empty_series() {
        let series = BarSeries::new(key(), Vec::new());
        assert!(series.is_empty());
        assert!(series.bars().is_empty());
    }

    #[test]
    fn key_display() {
        assert_eq!(key().to_string(), "ETH/USDT@1h");
    }
}
