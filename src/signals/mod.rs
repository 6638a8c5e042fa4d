// =============================================================================
// Signal Pipeline Module
// =============================================================================
//
// Rule-based classification of the latest indicator row into a trading
// signal with its rationale.

pub mod classifier;

pub use classifier::{classify_latest, ClassifierConfig, NeutralLabel, Reason, Signal};
