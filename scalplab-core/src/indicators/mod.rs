//! Indicator trait, precomputed values container and concrete indicators.
//!
//! Indicators are pure functions: bar history in, numeric series out. Each
//! strategy computes the ones it needs once over the whole series before it
//! derives signals; nothing is recomputed per bar.

pub mod adx;
pub mod ema;
pub mod rsi;
pub mod stochastic;

pub use adx::Adx;
pub use ema::Ema;
pub use rsi::Rsi;
pub use stochastic::Stochastic;

use crate::domain::Bar;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. The first `lookback()` values are `f64::NAN` (warmup).
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
/// Every indicator must pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_8", "rsi_9").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Named indicator series, queried by bar index.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Compute `indicator` over `bars` and store it under its own name.
    pub fn compute_into(&mut self, indicator: &dyn Indicator, bars: &[Bar]) {
        self.insert(indicator.name().to_string(), indicator.compute(bars));
    }

    /// Value at a bar index; `None` for an unknown name or an out-of-range index.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    /// Value at a bar index, `NaN` when missing.
    pub fn value(&self, name: &str, bar_index: usize) -> f64 {
        self.get(name, bar_index).unwrap_or(f64::NAN)
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Series names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.series.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Close prices of a bar slice.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Create synthetic five-minute bars from close prices for testing.
///
/// open = prev_close (or close for the first bar),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    use chrono::TimeZone;
    let start = chrono::Utc
        .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                open_time: start + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_values_insert_and_get() {
        let mut iv = IndicatorValues::new();
        iv.insert(
            "ema_20",
            vec![f64::NAN; 19]
                .into_iter()
                .chain(vec![100.0, 101.0])
                .collect(),
        );
        assert!(iv.get("ema_20", 0).unwrap().is_nan());
        assert_eq!(iv.get("ema_20", 19), Some(100.0));
        assert_eq!(iv.get("ema_20", 20), Some(101.0));
        assert_eq!(iv.get("ema_20", 21), None);
        assert!(iv.value("ema_20", 21).is_nan());
    }

    #[test]
    fn indicator_values_missing_name() {
        let iv = IndicatorValues::new();
        assert_eq!(iv.get("nonexistent", 0), None);
        assert!(iv.is_empty());
    }

    #[test]
    fn compute_into_uses_indicator_name() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let mut iv = IndicatorValues::new();
        iv.compute_into(&Ema::new(2), &bars);
        iv.compute_into(&Rsi::new(2), &bars);
        assert_eq!(iv.names(), vec!["ema_2", "rsi_2"]);
        assert_eq!(iv.get_series("ema_2").map(|s| s.len()), Some(4));
    }
}
