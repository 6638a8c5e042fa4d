// =============================================================================
// Relative Strength Index (RSI) — simple-average variant
// =============================================================================
//
// Step 1 — Compute price changes (deltas) from consecutive closes.
// Step 2 — Split each delta into gain = max(delta, 0) and loss = max(-delta, 0).
// Step 3 — avg_gain / avg_loss are the plain means of the last `period` gains /
//          losses ending at the current bar (rolling window, not Wilder).
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// The first defined value sits at index `period`, since bar 0 has no delta.
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

use serde::{Deserialize, Serialize};

/// What to report when a window has neither gains nor losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlatRsi {
    /// No movement at all reads as 50.
    #[default]
    Midpoint,
    /// No movement leaves RSI undefined.
    Undefined,
}

/// Per-bar RSI aligned with `closes`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period + 1` => all undefined
/// - average loss zero with positive average gain => 100.0
/// - both averages zero => decided by `flat`
/// - a non-finite close makes every window containing it undefined
pub fn calculate_rsi(closes: &[f64], period: usize, flat: FlatRsi) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    // deltas[j] belongs to bar j + 1.
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    for (i, slot) in out.iter_mut().enumerate().skip(period) {
        let window = &deltas[i - period..i];
        if window.iter().any(|d| !d.is_finite()) {
            continue;
        }

        let (sum_gain, sum_loss) = window.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l - d)
            }
        });

        *slot = rsi_from_averages(sum_gain / period_f, sum_loss / period_f, flat);
    }

    out
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64, flat: FlatRsi) -> Option<f64> {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        match flat {
            FlatRsi::Midpoint => 50.0,
            FlatRsi::Undefined => return None,
        }
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}
