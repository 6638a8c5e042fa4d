// =============================================================================
// Signal Classifier — rule table over the latest indicator row
// =============================================================================
//
//   any input undefined                                 => NO_DATA
//   RSI < oversold   AND MACD > SIGNAL AND EMA50 > EMA200 => BUY
//   RSI > overbought AND MACD < SIGNAL AND EMA50 < EMA200 => SELL
//   otherwise                                           => NEUTRAL / HOLD
//
// Reasons are collected per sub-condition in the order RSI, MACD, EMA, so a
// partially bullish row still explains itself even when it stays neutral.
// =============================================================================

use serde::{Deserialize, Serialize, Serializer};

use crate::indicators::IndicatorRow;

/// Discrete decision for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    Neutral,
    NoData,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::NoData => write!(f, "NO_DATA"),
        }
    }
}

/// Label used when neither BUY nor SELL fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NeutralLabel {
    #[default]
    Neutral,
    Hold,
}

impl NeutralLabel {
    fn signal(self) -> Signal {
        match self {
            Self::Neutral => Signal::Neutral,
            Self::Hold => Signal::Hold,
        }
    }
}

impl std::str::FromStr for NeutralLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NEUTRAL" => Ok(Self::Neutral),
            "HOLD" => Ok(Self::Hold),
            other => Err(format!("unknown neutral label '{other}'")),
        }
    }
}

/// Indicator columns the classifier depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Indicator {
    Rsi,
    Macd,
    MacdSignal,
    EmaFast,
    EmaSlow,
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsi => write!(f, "RSI"),
            Self::Macd => write!(f, "MACD"),
            Self::MacdSignal => write!(f, "MACD signal"),
            Self::EmaFast => write!(f, "EMA50"),
            Self::EmaSlow => write!(f, "EMA200"),
        }
    }
}

/// One piece of rationale behind a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    RsiOversold,
    RsiOverbought,
    MacdBullish,
    MacdBearish,
    EmaBullish,
    EmaBearish,
    NeutralConditions,
    Missing(Indicator),
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RsiOversold => write!(f, "RSI oversold"),
            Self::RsiOverbought => write!(f, "RSI overbought"),
            Self::MacdBullish => write!(f, "MACD bullish"),
            Self::MacdBearish => write!(f, "MACD bearish"),
            Self::EmaBullish => write!(f, "EMA bullish"),
            Self::EmaBearish => write!(f, "EMA bearish"),
            Self::NeutralConditions => write!(f, "Neutral conditions"),
            Self::Missing(ind) => write!(f, "{ind} unavailable"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Thresholds and labels for the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub neutral_label: NeutralLabel,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            neutral_label: NeutralLabel::Neutral,
        }
    }
}

/// A signal with the reasons that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub signal: Signal,
    pub reasons: Vec<Reason>,
}

/// Reduce the latest indicator row to a decision.
///
/// Pure: the same row and config always give the same classification.
pub fn classify(row: &IndicatorRow, config: &ClassifierConfig) -> Classification {
    let (Some(rsi), Some(macd), Some(signal), Some(ema_fast), Some(ema_slow)) = (
        row.rsi,
        row.macd,
        row.macd_signal,
        row.ema_fast,
        row.ema_slow,
    ) else {
        return Classification {
            signal: Signal::NoData,
            reasons: missing(row),
        };
    };

    let rsi_oversold = rsi < config.rsi_oversold;
    let rsi_overbought = rsi > config.rsi_overbought;
    let macd_bullish = macd > signal;
    let macd_bearish = macd < signal;
    let ema_bullish = ema_fast > ema_slow;
    let ema_bearish = ema_fast < ema_slow;

    let mut reasons = Vec::new();
    if rsi_oversold {
        reasons.push(Reason::RsiOversold);
    }
    if rsi_overbought {
        reasons.push(Reason::RsiOverbought);
    }
    if macd_bullish {
        reasons.push(Reason::MacdBullish);
    }
    if macd_bearish {
        reasons.push(Reason::MacdBearish);
    }
    if ema_bullish {
        reasons.push(Reason::EmaBullish);
    }
    if ema_bearish {
        reasons.push(Reason::EmaBearish);
    }

    let decision = if rsi_oversold && macd_bullish && ema_bullish {
        Signal::Buy
    } else if rsi_overbought && macd_bearish && ema_bearish {
        Signal::Sell
    } else {
        config.neutral_label.signal()
    };

    if reasons.is_empty() {
        reasons.push(Reason::NeutralConditions);
    }

    Classification {
        signal: decision,
        reasons,
    }
}

/// Convenience for callers holding an optional latest row.
pub fn classify_latest(row: Option<&IndicatorRow>, config: &ClassifierConfig) -> Classification {
    match row {
        Some(row) => classify(row, config),
        None => Classification {
            signal: Signal::NoData,
            reasons: vec![
                Reason::Missing(Indicator::Rsi),
                Reason::Missing(Indicator::Macd),
                Reason::Missing(Indicator::MacdSignal),
                Reason::Missing(Indicator::EmaFast),
                Reason::Missing(Indicator::EmaSlow),
            ],
        },
    }
}

fn missing(row: &IndicatorRow) -> Vec<Reason> {
    [
        (Indicator::Rsi, row.rsi),
        (Indicator::Macd, row.macd),
        (Indicator::MacdSignal, row.macd_signal),
        (Indicator::EmaFast, row.ema_fast),
        (Indicator::EmaSlow, row.ema_slow),
    ]
    .into_iter()
    .filter(|(_, v)| v.is_none())
    .map(|(ind, _)| Reason::Missing(ind))
    .collect()
}
