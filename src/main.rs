// =============================================================================
// Altcoin Signal Service — Main Entry Point
// =============================================================================
//
// Periodically pulls bars for every asset in the asset book, derives RSI, EMA
// and MACD, classifies the latest row and publishes the result over a small
// read-only HTTP API.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod assets;
mod binance;
mod dominance;
mod error;
mod indicators;
mod market_data;
mod refresh;
mod runtime_config;
mod signals;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Context;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::BinanceClient;
use crate::dominance::DominanceMonitor;
use crate::market_data::BarCache;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "runtime_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Altcoin Signal Service — Starting Up              ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env(|key| std::env::var(key).ok());
    for warning in config.validate() {
        warn!("config: {warning}");
    }

    info!(
        assets_file = %config.assets_file.display(),
        timeframe = %config.timeframe,
        min_bars = config.min_bars,
        cache_ttl_secs = config.cache_ttl_secs,
        refresh_interval_secs = config.refresh_interval_secs,
        neutral_label = ?config.neutral_label,
        "Configuration resolved"
    );

    // ── 2. Upstream clients ──────────────────────────────────────────────
    let binance = BinanceClient::new(&config.binance_base_url, config.fetch_timeout())
        .context("building Binance client")?;
    let dominance = DominanceMonitor::new(&config.dominance_url, config.fetch_timeout())
        .context("building dominance monitor")?;

    // ── 3. Build shared state ────────────────────────────────────────────
    let cache = Arc::new(BarCache::new(Arc::new(binance), config.cache_config()));
    let bind_addr = config.bind_addr.clone();
    let refresh_interval = config.refresh_interval();
    let state = Arc::new(AppState::new(config, cache, Arc::new(dominance)));

    // ── 4. Refresh loop (timer or manual trigger) ────────────────────────
    let refresh_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(refresh_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = refresh_state.refresh_trigger.notified() => {
                    interval.reset();
                }
            }
            refresh_state.run_refresh().await;
        }
    });

    // ── 5. Start the API server ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Altcoin Signal Service shut down complete.");
    Ok(())
}
