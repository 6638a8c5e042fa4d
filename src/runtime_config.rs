// =============================================================================
// Runtime Configuration — engine settings with env overrides and atomic save
// =============================================================================
//
// Every tunable parameter of the signal engine lives here.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.  Persistence uses an atomic tmp + rename pattern.
// =============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indicators::{FlatRsi, IndicatorParams};
use crate::market_data::CacheConfig;
use crate::signals::{ClassifierConfig, NeutralLabel};
use crate::types::Timeframe;

/// Binance serves at most this many klines per request.
const MAX_MIN_BARS: usize = 1000;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_assets_file() -> PathBuf {
    PathBuf::from("assets.json")
}

fn default_min_bars() -> usize {
    200
}

fn default_cache_ttl_secs() -> u64 {
    240
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_binance_base_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_dominance_url() -> String {
    "https://api.coingecko.com/api/v3/global".to_string()
}

fn default_rsi_oversold() -> f64 {
    30.0
}

fn default_rsi_overbought() -> f64 {
    70.0
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Inputs --------------------------------------------------------------

    /// JSON asset book re-read on every tick.
    #[serde(default = "default_assets_file")]
    pub assets_file: PathBuf,

    /// Bar interval requested from the source.
    #[serde(default)]
    pub timeframe: Timeframe,

    /// Bars requested per symbol; 200 covers the slow EMA.
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    // --- Cache & refresh ----------------------------------------------------

    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Must stay above `cache_ttl_secs` so each tick can see fresh bars.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    // --- Endpoints ----------------------------------------------------------

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_binance_base_url")]
    pub binance_base_url: String,

    #[serde(default = "default_dominance_url")]
    pub dominance_url: String,

    // --- Classification -----------------------------------------------------

    #[serde(default)]
    pub neutral_label: NeutralLabel,

    #[serde(default)]
    pub flat_rsi: FlatRsi,

    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,

    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assets_file: default_assets_file(),
            timeframe: Timeframe::default(),
            min_bars: default_min_bars(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            bind_addr: default_bind_addr(),
            binance_base_url: default_binance_base_url(),
            dominance_url: default_dominance_url(),
            neutral_label: NeutralLabel::default(),
            flat_rsi: FlatRsi::default(),
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            timeframe = %config.timeframe,
            cache_ttl_secs = config.cache_ttl_secs,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Apply `SIGNAL_*` overrides from an environment lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SIGNAL_ASSETS_FILE") {
            self.assets_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("SIGNAL_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("SIGNAL_TIMEFRAME") {
            match v.parse() {
                Ok(tf) => self.timeframe = tf,
                Err(e) => warn!(value = %v, error = %e, "ignoring SIGNAL_TIMEFRAME"),
            }
        }
        if let Some(v) = lookup("SIGNAL_NEUTRAL_LABEL") {
            match v.parse() {
                Ok(label) => self.neutral_label = label,
                Err(e) => warn!(value = %v, error = %e, "ignoring SIGNAL_NEUTRAL_LABEL"),
            }
        }
        if let Some(v) = lookup("SIGNAL_CACHE_TTL_SECS") {
            match v.parse() {
                Ok(secs) => self.cache_ttl_secs = secs,
                Err(e) => warn!(value = %v, error = %e, "ignoring SIGNAL_CACHE_TTL_SECS"),
            }
        }
        if let Some(v) = lookup("SIGNAL_REFRESH_SECS") {
            match v.parse() {
                Ok(secs) => self.refresh_interval_secs = secs,
                Err(e) => warn!(value = %v, error = %e, "ignoring SIGNAL_REFRESH_SECS"),
            }
        }
    }

    /// Clamp out-of-range values and return a warning per questionable field.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.min_bars > MAX_MIN_BARS {
            warnings.push(format!(
                "min_bars {} exceeds the source limit, clamped to {MAX_MIN_BARS}",
                self.min_bars
            ));
            self.min_bars = MAX_MIN_BARS;
        }
        let needed = self.indicator_params().required_history();
        if self.min_bars < needed {
            warnings.push(format!(
                "min_bars {} is below the {needed} bars the indicators need; signals will be NO_DATA",
                self.min_bars
            ));
        }
        if self.refresh_interval_secs == 0 {
            warnings.push("refresh_interval_secs 0 is not allowed, using 1".to_string());
            self.refresh_interval_secs = 1;
        }
        if self.cache_ttl_secs >= self.refresh_interval_secs {
            warnings.push(format!(
                "cache_ttl_secs {} is not shorter than refresh_interval_secs {}; ticks may see stale bars",
                self.cache_ttl_secs, self.refresh_interval_secs
            ));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            warnings.push(format!(
                "rsi_oversold {} is not below rsi_overbought {}",
                self.rsi_oversold, self.rsi_overbought
            ));
        }

        warnings
    }

    pub fn indicator_params(&self) -> IndicatorParams {
        IndicatorParams {
            flat_rsi: self.flat_rsi,
            ..IndicatorParams::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            fetch_timeout: self.fetch_timeout(),
            params: self.indicator_params(),
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            rsi_oversold: self.rsi_oversold,
            rsi_overbought: self.rsi_overbought,
            neutral_label: self.neutral_label,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}
