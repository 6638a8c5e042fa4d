// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// MACD   = EMA(fast) - EMA(slow)
// Signal = EMA(signal) of the MACD line, seeded on its first defined value
//
// Both EMAs run from the first close; the MACD line is exposed once the slow
// EMA has warmed up, and the signal line once it has consumed `signal` MACD
// values.  With the default 12/26/9 the first MACD sits at index 25 and the
// first signal at index 33.
// =============================================================================

use super::ema::ema_recurrence;

/// Per-bar MACD line and signal line aligned with `closes`.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let mut macd = vec![None; closes.len()];
    let mut sig = vec![None; closes.len()];
    if fast == 0 || slow == 0 || signal == 0 {
        return (macd, sig);
    }

    let fast_ema = ema_recurrence(closes, fast);
    let slow_ema = ema_recurrence(closes, slow);
    let warmup = fast.max(slow) - 1;

    for (i, slot) in macd.iter_mut().enumerate().skip(warmup) {
        let v = fast_ema[i] - slow_ema[i];
        *slot = v.is_finite().then_some(v);
    }

    // Signal runs over the contiguous defined run that starts at the first MACD.
    let Some(start) = macd.iter().position(Option::is_some) else {
        return (macd, sig);
    };
    let run: Vec<f64> = macd[start..].iter().map_while(|v| *v).collect();

    for (j, v) in ema_recurrence(&run, signal).into_iter().enumerate() {
        if j + 1 >= signal && v.is_finite() {
            sig[start + j] = Some(v);
        }
    }

    (macd, sig)
}
