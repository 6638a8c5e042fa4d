// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators behind the signal
// table.  Every column is recomputed over the whole series on each call and is
// aligned one-to-one with the bars; `None` marks insufficient history and is
// never conflated with zero.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use rsi::FlatRsi;

use serde::{Deserialize, Serialize};

use crate::market_data::BarSeries;

/// Look-back settings for every derived column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub rsi_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub flat_rsi: FlatRsi,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ema_fast: 50,
            ema_slow: 200,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            flat_rsi: FlatRsi::Midpoint,
        }
    }
}

impl IndicatorParams {
    /// Bars needed before every column of the latest row can be defined.
    pub fn required_history(&self) -> usize {
        let macd = self.macd_fast.max(self.macd_slow) + self.macd_signal.saturating_sub(1);
        (self.rsi_period + 1)
            .max(self.ema_fast)
            .max(self.ema_slow)
            .max(macd)
    }
}

/// Derived values for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub timestamp: i64,
    pub close: f64,
    pub rsi: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
}

impl IndicatorRow {
    /// Copy with values rounded for display: RSI to 1 decimal, the rest to 2.
    pub fn rounded(&self) -> Self {
        fn round(v: Option<f64>, digits: i32) -> Option<f64> {
            let scale = 10f64.powi(digits);
            v.map(|x| (x * scale).round() / scale)
        }

        Self {
            timestamp: self.timestamp,
            close: self.close,
            rsi: round(self.rsi, 1),
            ema_fast: round(self.ema_fast, 2),
            ema_slow: round(self.ema_slow, 2),
            macd: round(self.macd, 2),
            macd_signal: round(self.macd_signal, 2),
        }
    }
}

/// Indicator columns aligned with the bars of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorTable {
    rows: Vec<IndicatorRow>,
}

impl IndicatorTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of the most recent bar.
    pub fn latest(&self) -> Option<&IndicatorRow> {
        self.rows.last()
    }
}

/// Augment `series` with RSI, the two trend EMAs and MACD/signal.
pub fn compute(series: &BarSeries, params: &IndicatorParams) -> IndicatorTable {
    let closes = series.closes();

    let rsi = rsi::calculate_rsi(&closes, params.rsi_period, params.flat_rsi);
    let ema_fast = ema::calculate_ema(&closes, params.ema_fast);
    let ema_slow = ema::calculate_ema(&closes, params.ema_slow);
    let (macd, macd_signal) = macd::calculate_macd(
        &closes,
        params.macd_fast,
        params.macd_slow,
        params.macd_signal,
    );

    let rows = series
        .bars()
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorRow {
            timestamp: bar.timestamp,
            close: bar.close,
            rsi: rsi[i],
            ema_fast: ema_fast[i],
            ema_slow: ema_slow[i],
            macd: macd[i],
            macd_signal: macd_signal[i],
        })
        .collect();

    IndicatorTable { rows }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::{Bar, SeriesKey};
    use crate::types::{Symbol, Timeframe};

    fn series_from(closes: &[f64]) -> BarSeries {
        let key = SeriesKey::new(Symbol::parse("ETH/USDT").unwrap(), Timeframe::H1);
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64 * 3_600_000, c, c, c, c, 1.0))
            .collect();
        BarSeries::new(key, bars)
    }

    #[test]
    fn default_params_need_200_bars() {
        assert_eq!(IndicatorParams::default().required_history(), 200);
    }

    #[test]
    fn table_is_aligned_with_bars() {
        let series = series_from(&[1.0, 2.0, 3.0]);
        let table = compute(&series, &IndicatorParams::default());
        assert_eq!(table.len(), 3);
        assert_eq!(table.latest().map(|r| r.timestamp), Some(2 * 3_600_000));
        assert_eq!(table.latest().map(|r| r.close), Some(3.0));
    }

    #[test]
    fn empty_series_gives_empty_table() {
        let table = compute(&series_from(&[]), &IndicatorParams::default());
        assert!(table.is_empty());
        assert!(table.latest().is_none());
    }

    #[test]
    fn flat_200_bar_series() {
        let table = compute(&series_from(&[10.0; 200]), &IndicatorParams::default());
        let last = table.latest().unwrap();
        assert_eq!(last.rsi, Some(50.0));
        assert_eq!(last.ema_fast, Some(10.0));
        assert_eq!(last.ema_slow, Some(10.0));
        assert_eq!(last.macd, Some(0.0));
        assert_eq!(last.macd_signal, Some(0.0));
    }

    #[test]
    fn short_series_leaves_slow_ema_undefined() {
        let closes: Vec<f64> = (0..150).map(|i| 100.0 + i as f64).collect();
        let table = compute(&series_from(&closes), &IndicatorParams::default());
        let last = table.latest().unwrap();
        assert!(last.ema_slow.is_none());
        assert!(last.ema_fast.is_some());
        assert!(last.macd.is_some());
        assert!(last.rsi.is_some());
    }

    #[test]
    fn compute_is_idempotent() {
        let closes: Vec<f64> = (0..240).map(|i| 100.0 + ((i * 17) % 23) as f64).collect();
        let series = series_from(&closes);
        let params = IndicatorParams::default();
        assert_eq!(compute(&series, &params), compute(&series, &params));
    }

    #[test]
    fn rounded_row_for_display() {
        let row = IndicatorRow {
            timestamp: 0,
            close: 1.0,
            rsi: Some(28.456),
            ema_fast: Some(105.126),
            ema_slow: None,
            macd: Some(-0.3049),
            macd_signal: Some(0.1),
        };
        let r = row.rounded();
        assert_eq!(r.rsi, Some(28.5));
        assert_eq!(r.ema_fast, Some(105.13));
        assert_eq!(r.ema_slow, None);
        assert_eq!(r.macd, Some(-0.3));
    }
}
