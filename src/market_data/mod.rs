pub mod bar;
pub mod bar_cache;
pub mod source;

// Re-export the bar types for convenient access (e.g. `use crate::market_data::Bar`).
pub use bar::{Bar, BarSeries, SeriesKey};
pub use bar_cache::{BarCache, CacheConfig};
pub use source::{BarSource, DominanceSource};
