// =============================================================================
// Central Application State — Altcoin Signal Service
// =============================================================================
//
// Ties the bar cache, the dominance source and the latest dashboard snapshot
// together for the refresh loop and the read API.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for the config and the published snapshot.
//   - The bar cache manages its own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::assets::AssetBook;
use crate::market_data::{BarCache, DominanceSource};
use crate::refresh::{self, DashboardSnapshot, RefreshSettings};
use crate::runtime_config::RuntimeConfig;

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented every time a new snapshot is published.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Data sources ────────────────────────────────────────────────────
    pub cache: Arc<BarCache>,
    pub dominance: Arc<dyn DominanceSource>,

    // ── Output ──────────────────────────────────────────────────────────
    pub latest_snapshot: RwLock<Option<Arc<DashboardSnapshot>>>,

    /// Wakes the refresh loop ahead of its timer.
    pub refresh_trigger: Notify,

    /// Set by a manual refresh so the next tick bypasses cached bars.
    force_refetch: AtomicBool,

    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        cache: Arc<BarCache>,
        dominance: Arc<dyn DominanceSource>,
    ) -> Self {
        Self {
            state_version: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            cache,
            dominance,
            latest_snapshot: RwLock::new(None),
            refresh_trigger: Notify::new(),
            force_refetch: AtomicBool::new(false),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Refresh ─────────────────────────────────────────────────────────

    /// Ask the refresh loop to run now, bypassing cached bars.  Multiple
    /// requests before the loop wakes collapse into one tick.
    pub fn request_refresh(&self) {
        self.force_refetch.store(true, Ordering::SeqCst);
        self.refresh_trigger.notify_one();
    }

    /// Re-read the asset book, evaluate every symbol and publish the result.
    pub async fn run_refresh(&self) -> Arc<DashboardSnapshot> {
        let (assets_file, settings) = {
            let config = self.runtime_config.read();
            (config.assets_file.clone(), RefreshSettings::from_config(&config))
        };

        let book = AssetBook::load_or_empty(&assets_file);
        if self.force_refetch.swap(false, Ordering::SeqCst) {
            let expired = book
                .symbols()
                .iter()
                .filter(|symbol| self.cache.expire(symbol, settings.timeframe))
                .count();
            debug!(expired, "manual refresh: cached series expired");
        }

        let snapshot = Arc::new(
            refresh::refresh_all(&self.cache, self.dominance.as_ref(), &book, &settings).await,
        );

        *self.latest_snapshot.write() = Some(Arc::clone(&snapshot));
        let version = self.increment_version();
        info!(
            version,
            symbols = snapshot.reports.len(),
            cached_keys = self.cache.len(),
            "snapshot published"
        );

        snapshot
    }

    pub fn snapshot(&self) -> Option<Arc<DashboardSnapshot>> {
        self.latest_snapshot.read().clone()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
