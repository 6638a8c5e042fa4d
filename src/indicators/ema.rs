// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   alpha  = 2 / (span + 1)
//   EMA_0  = close_0
//   EMA_t  = EMA_{t-1} + alpha * (close_t - EMA_{t-1})
//
// The update form is algebraically identical to
// `alpha * close_t + (1 - alpha) * EMA_{t-1}` and leaves a constant series
// bit-for-bit constant.  Values are exposed only after `span` closes have been
// consumed; the earlier ones are warm-up and reported as undefined.
// =============================================================================

/// Smoothing factor for a given span.
pub fn alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// Run the raw EMA recurrence over `values`, seeded with the first value.
///
/// The output has the same length as the input and includes the warm-up
/// prefix.  Callers decide what to expose.
pub fn ema_recurrence(values: &[f64], span: usize) -> Vec<f64> {
    let Some((&seed, rest)) = values.split_first() else {
        return Vec::new();
    };
    let a = alpha(span);

    let mut out = Vec::with_capacity(values.len());
    out.push(seed);
    let mut prev = seed;
    for &v in rest {
        prev += a * (v - prev);
        out.push(prev);
    }
    out
}

/// Per-bar EMA aligned with `closes`.
///
/// # Edge cases
/// - `span == 0` => every value undefined
/// - indices below `span - 1` => undefined (warm-up)
/// - non-finite values (NaN in the input poisons the recurrence) => undefined
pub fn calculate_ema(closes: &[f64], span: usize) -> Vec<Option<f64>> {
    if span == 0 {
        return vec![None; closes.len()];
    }

    ema_recurrence(closes, span)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i + 1 >= span && v.is_finite()).then_some(v))
        .collect()
}
