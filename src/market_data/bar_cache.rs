// =============================================================================
// Bar Cache — TTL-bounded, single-flight cache of bar series per symbol
// =============================================================================
//
// Valid entries are served from a shared read lock without touching the bar
// source.  On a miss or expiry the caller takes the per-key flight lock,
// re-checks the entry (another caller may have refreshed it meanwhile) and
// only then goes upstream, so at most one fetch per key runs at a time and at
// most one per TTL window succeeds.
//
// Entries are replaced wholesale.  The indicator table is computed once per
// successful fetch and shared with every reader of that entry.
//
// When a refresh fails with a transient error the previous entry is served
// flagged `stale`; only a key that never fetched successfully surfaces the
// failure.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{BarSeries, BarSource, SeriesKey};
use crate::error::CoreError;
use crate::indicators::{self, IndicatorParams, IndicatorTable};
use crate::types::{Symbol, Timeframe};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// How long a fetched series is served without going upstream.
    pub ttl: Duration,
    /// Upper bound on a single bar source call.
    pub fetch_timeout: Duration,
    /// Settings used to augment every fetched series.
    pub params: IndicatorParams,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(240),
            fetch_timeout: Duration::from_secs(10),
            params: IndicatorParams::default(),
        }
    }
}

struct CacheEntry {
    series: Arc<BarSeries>,
    indicators: Arc<IndicatorTable>,
    fetched_at: DateTime<Utc>,
    /// Bar count asked of the source when this entry was fetched.
    requested: usize,
    /// Forced past its TTL; still usable as a stale fallback.
    expired: bool,
}

impl CacheEntry {
    fn expired_copy(&self) -> Self {
        Self {
            series: Arc::clone(&self.series),
            indicators: Arc::clone(&self.indicators),
            fetched_at: self.fetched_at,
            requested: self.requested,
            expired: true,
        }
    }

    fn view(&self, stale: bool) -> CachedSeries {
        CachedSeries {
            series: Arc::clone(&self.series),
            indicators: Arc::clone(&self.indicators),
            fetched_at: self.fetched_at,
            stale,
        }
    }
}

/// What a caller gets back from the cache.
#[derive(Debug, Clone)]
pub struct CachedSeries {
    pub series: Arc<BarSeries>,
    pub indicators: Arc<IndicatorTable>,
    pub fetched_at: DateTime<Utc>,
    /// Set when the refresh failed and an expired entry is being served.
    pub stale: bool,
}

// ---------------------------------------------------------------------------
// BarCache
// ---------------------------------------------------------------------------

pub struct BarCache {
    source: Arc<dyn BarSource>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    entries: RwLock<HashMap<SeriesKey, Arc<CacheEntry>>>,
    flights: Mutex<HashMap<SeriesKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl BarCache {
    pub fn new(source: Arc<dyn BarSource>, config: CacheConfig) -> Self {
        Self::with_clock(source, Arc::new(SystemClock), config)
    }

    pub fn with_clock(source: Arc<dyn BarSource>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            source,
            clock,
            config,
            entries: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Return the series for `symbol`, fetching it when the cached entry is
    /// missing, expired, or shorter than `min_bars` were requested.
    pub async fn get_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        min_bars: usize,
    ) -> Result<CachedSeries, CoreError> {
        let key = SeriesKey::new(symbol.clone(), timeframe);

        if let Some(hit) = self.fresh(&key, min_bars) {
            debug!(key = %key, "bar cache hit");
            return Ok(hit);
        }

        let flight = self.flight_lock(&key);
        let _guard = flight.lock().await;

        if let Some(hit) = self.fresh(&key, min_bars) {
            debug!(key = %key, "bar cache filled by concurrent fetch");
            return Ok(hit);
        }

        match self.refresh(&key, min_bars).await {
            Ok(entry) => Ok(entry.view(false)),
            Err(err) if err.is_transient() => {
                let previous = self.entries.read().get(&key).cloned();
                match previous {
                    Some(entry) => {
                        warn!(
                            key = %key,
                            error = %err,
                            fetched_at = %entry.fetched_at,
                            "bar source failed — serving stale series"
                        );
                        Ok(entry.view(true))
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Mark the entry for a key as expired so the next request goes
    /// upstream.  The entry is kept and still serves as the stale fallback.
    pub fn expire(&self, symbol: &Symbol, timeframe: Timeframe) -> bool {
        let key = SeriesKey::new(symbol.clone(), timeframe);
        let mut entries = self.entries.write();
        match entries.get_mut(&key) {
            Some(entry) => {
                *entry = Arc::new(entry.expired_copy());
                true
            }
            None => false,
        }
    }

    /// Number of keys with a stored entry (fresh or not).
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn fresh(&self, key: &SeriesKey, min_bars: usize) -> Option<CachedSeries> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        let usable =
            !entry.expired && entry.requested >= min_bars && self.is_fresh(entry.fetched_at);
        usable.then(|| entry.view(false))
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>) -> bool {
        // A clock that stepped backwards yields a negative age; treat as fresh.
        match (self.clock.now() - fetched_at).to_std() {
            Ok(age) => age < self.config.ttl,
            Err(_) => true,
        }
    }

    fn flight_lock(&self, key: &SeriesKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock();
        Arc::clone(flights.entry(key.clone()).or_default())
    }

    async fn refresh(&self, key: &SeriesKey, min_bars: usize) -> Result<Arc<CacheEntry>, CoreError> {
        debug!(key = %key, limit = min_bars, "fetching bars from source");

        let fetch = self.source.fetch(&key.symbol, key.timeframe, min_bars);
        let bars = match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::upstream(
                    "bar source",
                    format!("timed out after {:?}", self.config.fetch_timeout),
                ))
            }
        };

        let series = BarSeries::new(key.clone(), bars);
        let table = indicators::compute(&series, &self.config.params);

        let entry = Arc::new(CacheEntry {
            series: Arc::new(series),
            indicators: Arc::new(table),
            fetched_at: self.clock.now(),
            requested: min_bars,
            expired: false,
        });
        self.entries.write().insert(key.clone(), Arc::clone(&entry));

        debug!(key = %key, bars = entry.series.len(), "bar cache refreshed");
        Ok(entry)
    }
}

impl std::fmt::Debug for BarCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BarCache")
            .field("entries", &self.len())
            .field("ttl", &self.config.ttl)
            .field("fetch_timeout", &self.config.fetch_timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ManualClock, ScriptedBarSource};

    const TTL: Duration = Duration::from_secs(240);

    fn eth() -> Symbol {
        Symbol::parse("ETH/USDT").unwrap()
    }

    fn cache_with(source: Arc<ScriptedBarSource>, clock: Arc<ManualClock>) -> BarCache {
        let config = CacheConfig {
            ttl: TTL,
            fetch_timeout: Duration::from_millis(500),
            params: IndicatorParams::default(),
        };
        BarCache::with_clock(source, clock, config)
    }

    #[tokio::test]
    async fn second_request_within_ttl_is_served_from_cache() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(source.clone(), clock.clone());

        let first = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        clock.advance(Duration::from_secs(239));
        let second = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert!(!first.stale && !second.stale);
        assert!(Arc::ptr_eq(&first.series, &second.series));
        assert_eq!(second.series.len(), 200);
        assert_eq!(second.indicators.len(), 200);
    }

    #[tokio::test]
    async fn concurrent_misses_trigger_one_fetch() {
        let source = Arc::new(
            ScriptedBarSource::flat(10.0, 200).with_delay(Duration::from_millis(50)),
        );
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(source.clone(), clock);

        let eth = eth();
        let (a, b, c) = tokio::join!(
            cache.get_series(&eth, Timeframe::H1, 200),
            cache.get_series(&eth, Timeframe::H1, 200),
            cache.get_series(&eth, Timeframe::H1, 200),
        );

        assert_eq!(source.calls(), 1);
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(source.clone(), clock.clone());

        cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        clock.advance(TTL);
        let again = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert!(!again.stale);
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_series() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(source.clone(), clock.clone());

        let original = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();

        // Younger than 2 x TTL, but expired.
        clock.advance(Duration::from_secs(300));
        source.fail_with(CoreError::upstream("bar source", "HTTP 503"));
        let stale = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();

        assert_eq!(source.calls(), 2);
        assert!(stale.stale);
        assert!(Arc::ptr_eq(&original.series, &stale.series));
        assert_eq!(stale.fetched_at, original.fetched_at);
    }

    #[tokio::test]
    async fn failure_without_cached_data_surfaces() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        source.fail_with(CoreError::upstream("bar source", "connection refused"));
        let cache = cache_with(source.clone(), Arc::new(ManualClock::new()));

        let err = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn slow_source_times_out() {
        let source = Arc::new(
            ScriptedBarSource::flat(10.0, 200).with_delay(Duration::from_secs(5)),
        );
        let cache = cache_with(source, Arc::new(ManualClock::new()));

        let err = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap_err();
        assert!(matches!(err, CoreError::UpstreamUnavailable { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn invalid_symbol_is_not_masked_by_stale_data() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let clock = Arc::new(ManualClock::new());
        let cache = cache_with(source.clone(), clock.clone());

        cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        clock.advance(TTL * 2);
        source.fail_with(CoreError::InvalidSymbol {
            symbol: "ETH/USDT".into(),
        });

        let err = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_SYMBOL");
    }

    #[tokio::test]
    async fn larger_history_request_goes_upstream() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 300));
        let cache = cache_with(source.clone(), Arc::new(ManualClock::new()));

        cache.get_series(&eth(), Timeframe::H1, 100).await.unwrap();
        cache.get_series(&eth(), Timeframe::H1, 50).await.unwrap();
        assert_eq!(source.calls(), 1);

        let longer = cache.get_series(&eth(), Timeframe::H1, 300).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(longer.series.len(), 300);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let cache = cache_with(source.clone(), Arc::new(ManualClock::new()));
        let sol = Symbol::parse("SOL/USDT").unwrap();

        cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        cache.get_series(&sol, Timeframe::H1, 200).await.unwrap();
        cache.get_series(&eth(), Timeframe::H4, 200).await.unwrap();

        assert_eq!(source.calls(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn expire_forces_refetch() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let cache = cache_with(source.clone(), Arc::new(ManualClock::new()));

        assert!(!cache.expire(&eth(), Timeframe::H1));
        cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        assert!(cache.expire(&eth(), Timeframe::H1));
        assert_eq!(cache.len(), 1);

        let again = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert!(!again.stale);

        // The refetched entry is fresh again.
        cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn expired_entry_still_backs_a_failed_refetch() {
        let source = Arc::new(ScriptedBarSource::flat(10.0, 200));
        let cache = cache_with(source.clone(), Arc::new(ManualClock::new()));

        let original = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        cache.expire(&eth(), Timeframe::H1);
        source.fail_with(CoreError::upstream("bar source", "HTTP 503"));

        let stale = cache.get_series(&eth(), Timeframe::H1, 200).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert!(stale.stale);
        assert!(Arc::ptr_eq(&original.series, &stale.series));
    }
}
