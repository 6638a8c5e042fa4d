// =============================================================================
// Refresh Pipeline — one tick of cache → indicators → classifier per symbol
// =============================================================================
//
// Every tracked asset is evaluated concurrently and independently: a failing
// symbol produces an `unavailable` report next to the others instead of
// aborting the tick.  The dominance fetch runs alongside the symbols.
// =============================================================================

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::assets::{AssetBook, Liquidity, TrackedAsset};
use crate::dominance::DominanceReading;
use crate::error::CoreError;
use crate::indicators::IndicatorRow;
use crate::market_data::{BarCache, DominanceSource};
use crate::runtime_config::RuntimeConfig;
use crate::signals::{classify_latest, ClassifierConfig, Reason, Signal};
use crate::types::Timeframe;

/// Per-tick inputs taken from the runtime config.
#[derive(Debug, Clone, Copy)]
pub struct RefreshSettings {
    pub timeframe: Timeframe,
    pub min_bars: usize,
    pub classifier: ClassifierConfig,
}

impl RefreshSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            timeframe: config.timeframe,
            min_bars: config.min_bars,
            classifier: config.classifier_config(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Fresh,
    Stale,
    Unavailable,
}

/// Everything the dashboard shows for one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub value: Option<f64>,
    pub status: ReportStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    pub bars: usize,
    /// Latest indicator values, rounded for display.
    pub latest: Option<IndicatorRow>,
    pub signal: Signal,
    pub reasons: Vec<Reason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<CoreError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CoreError>,
}

impl SymbolReport {
    fn unavailable(asset: &TrackedAsset, error: CoreError) -> Self {
        Self {
            symbol: asset.label.clone(),
            value: asset.value,
            status: ReportStatus::Unavailable,
            fetched_at: None,
            bars: 0,
            latest: None,
            signal: Signal::NoData,
            reasons: Vec::new(),
            warning: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LiquidityView {
    Defined { usdt: f64, aed: f64 },
    NotDefined,
}

impl From<Option<Liquidity>> for LiquidityView {
    fn from(liquidity: Option<Liquidity>) -> Self {
        match liquidity {
            Some(Liquidity { usdt, aed }) => Self::Defined { usdt, aed },
            None => Self::NotDefined,
        }
    }
}

/// Result of one refresh tick, served as-is by the read API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub reports: Vec<SymbolReport>,
    pub dominance: DominanceReading,
    pub liquidity: LiquidityView,
}

/// Evaluate a single asset.  Never fails; errors end up in the report.
pub async fn evaluate_symbol(
    cache: &BarCache,
    asset: &TrackedAsset,
    settings: &RefreshSettings,
) -> SymbolReport {
    let symbol = match &asset.symbol {
        Ok(symbol) => symbol,
        Err(e) => return SymbolReport::unavailable(asset, e.clone()),
    };

    let cached = match cache
        .get_series(symbol, settings.timeframe, settings.min_bars)
        .await
    {
        Ok(cached) => cached,
        Err(e) => return SymbolReport::unavailable(asset, e),
    };

    let bars = cached.series.len();
    let warning = (bars < settings.min_bars).then_some(CoreError::InsufficientHistory {
        have: bars,
        need: settings.min_bars,
    });

    let latest = cached.indicators.latest();
    let classification = classify_latest(latest, &settings.classifier);

    SymbolReport {
        symbol: asset.label.clone(),
        value: asset.value,
        status: if cached.stale {
            ReportStatus::Stale
        } else {
            ReportStatus::Fresh
        },
        fetched_at: Some(cached.fetched_at),
        bars,
        latest: latest.map(IndicatorRow::rounded),
        signal: classification.signal,
        reasons: classification.reasons,
        warning,
        error: None,
    }
}

/// Run one full tick over the asset book.
pub async fn refresh_all(
    cache: &BarCache,
    dominance: &dyn DominanceSource,
    book: &AssetBook,
    settings: &RefreshSettings,
) -> DashboardSnapshot {
    let symbols = join_all(
        book.assets
            .iter()
            .map(|asset| evaluate_symbol(cache, asset, settings)),
    );
    let (reports, dominance) = tokio::join!(symbols, DominanceReading::read(dominance));

    for report in &reports {
        log_report(report);
    }

    DashboardSnapshot {
        generated_at: Utc::now(),
        timeframe: settings.timeframe,
        reports,
        dominance,
        liquidity: book.liquidity.into(),
    }
}

fn log_report(report: &SymbolReport) {
    fn fmt(v: Option<f64>) -> String {
        v.map_or_else(|| "-".to_string(), |x| x.to_string())
    }

    if let Some(err) = &report.error {
        warn!(symbol = %report.symbol, error = %err, "no data");
        return;
    }

    let row = report.latest.as_ref();
    info!(
        symbol = %report.symbol,
        status = ?report.status,
        rsi = %fmt(row.and_then(|r| r.rsi)),
        macd = %fmt(row.and_then(|r| r.macd)),
        macd_signal = %fmt(row.and_then(|r| r.macd_signal)),
        ema50 = %fmt(row.and_then(|r| r.ema_fast)),
        ema200 = %fmt(row.and_then(|r| r.ema_slow)),
        signal = %report.signal,
        "signal"
    );
}
