//! Error types for the core.
//!
//! Two families only: configuration errors are raised when a component is
//! built, data-integrity errors when a bar series is handed to a component.
//! Everything that can go wrong on a single bar degrades to "no signal"
//! instead of becoming an error.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A component refused to be built from its parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("price increment must be > 0 (got {0})")]
    NonPositiveIncrement(f64),

    #[error("volume step must be > 0 (got {0})")]
    NonPositiveVolumeStep(f64),

    #[error("volume bounds are inverted: min {min} > max {max}")]
    InvertedVolumeBounds { min: f64, max: f64 },

    #[error("reward:risk ratio must be > 0 (got {0})")]
    NonPositiveRewardRisk(f64),

    #[error("risk percent must be in (0, 100] (got {0})")]
    RiskPercentOutOfRange(f64),

    #[error("{name} must be >= 1")]
    ZeroPeriod { name: &'static str },

    #[error("ribbon needs at least one fast period")]
    EmptyRibbon,

    #[error("{name} must be in ({low}, {high}) (got {value})")]
    LevelOutOfRange {
        name: &'static str,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("{name} must be >= 0 (got {value})")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be > 0 (got {value})")]
    NonPositive { name: &'static str, value: f64 },

    #[error("oversold level {oversold} must be below overbought level {overbought}")]
    InvertedBands { oversold: f64, overbought: f64 },

    #[error("max trade duration must be >= 1 bar")]
    ZeroTradeDuration,
}

/// The bar series handed over by the gateway violates a data contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("bar {index} opens at {current}, not after the previous bar at {previous}")]
    NonMonotonicTime {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("simulation start index {start} is beyond the series length {len}")]
    StartOutOfRange { start: usize, len: usize },
}
