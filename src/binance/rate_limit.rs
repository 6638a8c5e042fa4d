// =============================================================================
// Rate-Limit Tracker — monitors Binance request weight to avoid 429s
// =============================================================================
//
// Binance allows 1200 request weight per minute per IP; we hard-cap ourselves
// at 1000.  The tracker reads the `X-MBX-USED-WEIGHT-1M` response header after
// every request and keeps an atomic counter that any task may query lock-free.
// The counter is reset when the minute it was observed in has passed.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

/// Thread-safe request-weight tracker backed by atomic counters.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// Epoch minute in which `used_weight_1m` was last observed.
    observed_minute: AtomicI64,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            observed_minute: AtomicI64::new(0),
        }
    }

    /// Update the weight counter from Binance response headers.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap, now_ms: i64) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        self.observed_minute.store(now_ms / 60_000, Ordering::Relaxed);

        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "rate-limit weight updated from header");
    }

    /// Return `true` if `weight` more request weight fits under the hard limit.
    pub fn can_send_request(&self, weight: u32, now_ms: i64) -> bool {
        if self.observed_minute.load(Ordering::Relaxed) != now_ms / 60_000 {
            self.used_weight_1m.store(0, Ordering::Relaxed);
        }

        let current = self.used_weight_1m.load(Ordering::Relaxed);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked — would exceed rate-limit"
            );
        }
        allowed
    }

    pub fn used_weight(&self) -> u32 {
        self.used_weight_1m.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn headers(weight: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("X-MBX-USED-WEIGHT-1M", HeaderValue::from_str(weight).unwrap());
        h
    }

    #[test]
    fn blocks_above_hard_limit_within_same_minute() {
        let t = RateLimitTracker::new();
        let now = 10 * 60_000 + 5_000;
        t.update_from_headers(&headers("995"), now);
        assert_eq!(t.used_weight(), 995);
        assert!(t.can_send_request(2, now));
        assert!(!t.can_send_request(10, now));
    }

    #[test]
    fn weight_resets_in_next_minute() {
        let t = RateLimitTracker::new();
        t.update_from_headers(&headers("1000"), 60_000);
        assert!(!t.can_send_request(2, 60_500));
        assert!(t.can_send_request(2, 120_000));
        assert_eq!(t.used_weight(), 0);
    }

    #[test]
    fn ignores_missing_or_garbled_header() {
        let t = RateLimitTracker::new();
        t.update_from_headers(&HeaderMap::new(), 0);
        t.update_from_headers(&headers("lots"), 0);
        assert_eq!(t.used_weight(), 0);
    }
}
