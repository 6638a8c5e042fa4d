// =============================================================================
// Core error kinds
// =============================================================================
//
// The calculator and the classifier never fail; only the collaborators at the
// edge of the core (bar source, dominance source, symbol list) produce these.
// Errors are `Clone` so a single upstream failure can be handed to every
// caller that was waiting on the same fetch.
// =============================================================================

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreError {
    /// Network, auth, rate-limit, timeout or malformed-body failure.
    #[error("{source_name} unavailable: {reason}")]
    UpstreamUnavailable {
        source_name: &'static str,
        reason: String,
    },

    /// Fewer bars than an indicator needs.
    #[error("insufficient history: have {have} bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// Symbol malformed or unknown to the bar source.
    #[error("invalid symbol '{symbol}'")]
    InvalidSymbol { symbol: String },
}

impl CoreError {
    pub fn upstream(source_name: &'static str, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            source_name,
            reason: reason.into(),
        }
    }

    /// Machine-readable code for dashboards and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::InsufficientHistory { .. } => "INSUFFICIENT_HISTORY",
            Self::InvalidSymbol { .. } => "INVALID_SYMBOL",
        }
    }

    /// Whether a stale cached value may stand in for a fresh one.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}
