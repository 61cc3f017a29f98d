//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// OHLCV bar for a single instrument and timeframe.
///
/// Bars are produced by the gateway and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any price field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// OHLC sanity: low <= open, close <= high and positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.low > 0.0
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

/// Check that `open_time` is strictly increasing across the series.
///
/// Ordering is the gateway's job; the core only refuses to work on a series
/// that breaks it.
pub fn ensure_chronological(bars: &[Bar]) -> Result<(), DataError> {
    check_open_times(bars.iter().map(|b| b.open_time))
}

/// Same check over any sequence of open times.
pub fn check_open_times<I>(times: I) -> Result<(), DataError>
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let mut previous: Option<DateTime<Utc>> = None;
    for (index, current) in times.into_iter().enumerate() {
        if let Some(previous) = previous {
            if current <= previous {
                return Err(DataError::NonMonotonicTime {
                    index,
                    previous,
                    current,
                });
            }
        }
        previous = Some(current);
    }
    Ok(())
}

/// Index of the first bar opening at or after `start`, if any.
pub fn first_index_at_or_after(bars: &[Bar], start: DateTime<Utc>) -> Option<usize> {
    bars.iter().position(|b| b.open_time >= start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_bar() -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            1.1000,
            1.1012,
            1.0995,
            1.1008,
            420.0,
        )
    }

    fn series(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut bar = sample_bar();
                bar.open_time = start + Duration::minutes(5 * i as i64);
                bar
            })
            .collect()
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 1.0990;
        assert!(!bar.is_sane());
    }

    #[test]
    fn chronological_series_passes() {
        assert!(ensure_chronological(&series(10)).is_ok());
        assert!(ensure_chronological(&[]).is_ok());
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let mut bars = series(5);
        bars[3].open_time = bars[2].open_time;
        let err = ensure_chronological(&bars).unwrap_err();
        assert!(matches!(err, DataError::NonMonotonicTime { index: 3, .. }));
    }

    #[test]
    fn reversed_series_is_rejected() {
        let mut bars = series(5);
        bars.reverse();
        assert!(matches!(
            ensure_chronological(&bars),
            Err(DataError::NonMonotonicTime { index: 1, .. })
        ));
    }

    #[test]
    fn first_index_lookup() {
        let bars = series(10);
        assert_eq!(first_index_at_or_after(&bars, bars[4].open_time), Some(4));
        assert_eq!(
            first_index_at_or_after(&bars, bars[4].open_time + Duration::minutes(1)),
            Some(5)
        );
        assert_eq!(
            first_index_at_or_after(&bars, bars[9].open_time + Duration::minutes(1)),
            None
        );
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, deser);
    }
}
