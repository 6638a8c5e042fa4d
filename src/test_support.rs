//! Hand-written fakes shared by the unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::app_state::AppState;
use crate::error::CoreError;
use crate::market_data::bar_cache::Clock;
use crate::market_data::{Bar, BarCache, BarSource, CacheConfig, DominanceSource};
use crate::runtime_config::RuntimeConfig;
use crate::types::{Symbol, Timeframe};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Bar source returning a fixed close sequence, optionally slow or failing.
///
/// The returned series is the last `limit` closes of the script, so callers
/// asking for fewer bars than scripted get a shorter series.
pub struct ScriptedBarSource {
    closes: Vec<f64>,
    delay: Duration,
    calls: AtomicUsize,
    failure: Mutex<Option<CoreError>>,
    per_symbol: Mutex<Vec<(String, CoreError)>>,
}

impl ScriptedBarSource {
    pub fn new(closes: Vec<f64>) -> Self {
        Self {
            closes,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            per_symbol: Mutex::new(Vec::new()),
        }
    }

    pub fn flat(close: f64, len: usize) -> Self {
        Self::new(vec![close; len])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every following fetch fails with `err`.
    pub fn fail_with(&self, err: CoreError) {
        *self.failure.lock() = Some(err);
    }

    /// Fetches for `symbol` fail with `err`; other symbols are unaffected.
    pub fn fail_symbol(&self, symbol: &str, err: CoreError) {
        self.per_symbol.lock().push((symbol.to_string(), err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BarSource for ScriptedBarSource {
    async fn fetch(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        let name = symbol.to_string();
        if let Some((_, err)) = self.per_symbol.lock().iter().find(|(s, _)| *s == name) {
            return Err(err.clone());
        }

        let step = bar_step_ms(timeframe);
        let start = self.closes.len().saturating_sub(limit);
        Ok(self.closes[start..]
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64 * step, c, c, c, c, 1.0))
            .collect())
    }
}

fn bar_step_ms(timeframe: Timeframe) -> i64 {
    let minutes = match timeframe {
        Timeframe::M1 => 1,
        Timeframe::M5 => 5,
        Timeframe::M15 => 15,
        Timeframe::H1 => 60,
        Timeframe::H4 => 240,
        Timeframe::D1 => 1440,
    };
    minutes * 60_000
}

/// Dominance source with a canned answer.
pub struct FixedDominance(pub Result<f64, CoreError>);

#[async_trait]
impl DominanceSource for FixedDominance {
    async fn fetch_dominance(&self) -> Result<f64, CoreError> {
        self.0.clone()
    }
}

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Unique path under the system temp dir.
pub fn temp_path(prefix: &str) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("{prefix}-{}-{n}.json", std::process::id()))
}

/// App state over a flat 200-bar source whose asset book holds `json`.
///
/// Returns the book path so the caller can remove it.
pub fn state_with_book(json: &str) -> (AppState, PathBuf) {
    state_with_source(json, Arc::new(ScriptedBarSource::flat(2.0, 200)))
}

/// Like [`state_with_book`] but over a caller-held bar source.
pub fn state_with_source(json: &str, source: Arc<ScriptedBarSource>) -> (AppState, PathBuf) {
    let path = temp_path("asset-book");
    std::fs::write(&path, json).unwrap();

    let config = RuntimeConfig {
        assets_file: path.clone(),
        ..RuntimeConfig::default()
    };
    let cache = Arc::new(BarCache::new(source, CacheConfig::default()));
    (
        AppState::new(config, cache, Arc::new(FixedDominance(Ok(54.2)))),
        path,
    )
}
