//! ADX: Average Directional Index (Wilder).
//!
//! 1. +DM / -DM from consecutive bars
//! 2. Wilder-smooth +DM, -DM and true range (alpha = 1/period)
//! 3. +DI, -DI = 100 * smoothed DM / smoothed TR
//! 4. DX = 100 * |+DI - -DI| / (+DI + -DI)
//! 5. ADX = Wilder-smoothed DX
//!
//! Lookback: 2 * period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ADX period must be >= 1");
        Self {
            period,
            name: format!("adx_{period}"),
        }
    }
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        if n < 2 {
            return vec![f64::NAN; n];
        }

        let mut plus_dm = vec![f64::NAN; n];
        let mut minus_dm = vec![f64::NAN; n];

        for i in 1..n {
            let high_diff = bars[i].high - bars[i - 1].high;
            let low_diff = bars[i - 1].low - bars[i].low;
            if high_diff.is_nan() || low_diff.is_nan() {
                continue;
            }
            plus_dm[i] = if high_diff > low_diff && high_diff > 0.0 {
                high_diff
            } else {
                0.0
            };
            minus_dm[i] = if low_diff > high_diff && low_diff > 0.0 {
                low_diff
            } else {
                0.0
            };
        }

        let smooth_tr = wilder_smooth(&true_range(bars), self.period);
        let smooth_plus_dm = wilder_smooth(&plus_dm, self.period);
        let smooth_minus_dm = wilder_smooth(&minus_dm, self.period);

        let mut dx = vec![f64::NAN; n];
        for i in 0..n {
            if smooth_tr[i].is_nan()
                || smooth_plus_dm[i].is_nan()
                || smooth_minus_dm[i].is_nan()
                || smooth_tr[i] == 0.0
            {
                continue;
            }

            let plus_di = 100.0 * smooth_plus_dm[i] / smooth_tr[i];
            let minus_di = 100.0 * smooth_minus_dm[i] / smooth_tr[i];
            let di_sum = plus_di + minus_di;

            dx[i] = if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / di_sum
            };
        }

        wilder_smooth(&dx, self.period)
    }
}

/// True range; the first bar has no previous close and uses high - low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let range = bar.high - bar.low;
        if i == 0 {
            tr.push(range);
            continue;
        }
        let pc = bars[i - 1].close;
        tr.push(range.max((bar.high - pc).abs()).max((bar.low - pc).abs()));
    }
    tr
}

/// Wilder smoothing: seeded with the mean of the first `period` consecutive
/// non-NaN values, then `alpha * x + (1 - alpha) * prev` with alpha = 1/period.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let Some(seed_start) = (0..=n - period)
        .find(|&start| values[start..start + period].iter().all(|v| !v.is_nan()))
    else {
        return result;
    };
    let seed_end = seed_start + period;

    let seed = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;
    use chrono::{Duration, TimeZone, Utc};

    fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                open_time: start + Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn adx_bounds() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0),
            (106.0, 107.0, 98.0, 99.0),
            (99.0, 103.0, 97.0, 101.0),
            (101.0, 106.0, 100.0, 105.0),
            (105.0, 110.0, 103.0, 108.0),
            (108.0, 112.0, 106.0, 110.0),
            (110.0, 111.0, 104.0, 105.0),
            (105.0, 109.0, 103.0, 107.0),
            (107.0, 113.0, 105.0, 112.0),
        ]);
        let result = Adx::new(3).compute(&bars);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "ADX out of bounds at bar {i}: {v}");
            }
        }
    }

    #[test]
    fn adx_first_value_at_lookback() {
        let data: Vec<_> = (0..20)
            .map(|i| {
                let base = 100.0 + i as f64;
                (base, base + 2.0, base - 2.0, base + 1.0)
            })
            .collect();
        let bars = make_ohlc_bars(&data);
        let adx = Adx::new(4);
        let result = adx.compute(&bars);
        assert!(result[..adx.lookback()].iter().all(|v| v.is_nan()));
        assert!(!result[adx.lookback()].is_nan());
    }

    #[test]
    fn adx_strong_trend_is_elevated() {
        let data: Vec<_> = (0..30)
            .map(|i| {
                let base = 100.0 + i as f64 * 5.0;
                (base - 1.0, base + 3.0, base - 3.0, base + 2.0)
            })
            .collect();
        let bars = make_ohlc_bars(&data);
        let result = Adx::new(5).compute(&bars);
        let last = result.iter().rev().find(|v| !v.is_nan()).copied();
        assert!(matches!(last, Some(v) if v > 25.0), "got {last:?}");
    }

    #[test]
    fn adx_lookback() {
        assert_eq!(Adx::new(14).lookback(), 27);
        assert_eq!(Adx::new(1).lookback(), 1);
    }

    #[test]
    fn adx_too_few_bars() {
        let bars = make_ohlc_bars(&[(100.0, 105.0, 95.0, 102.0)]);
        assert!(Adx::new(3).compute(&bars).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn wilder_smooth_known_values() {
        // seed = mean(2, 4) = 3; next = 0.5*6 + 0.5*3 = 4.5
        let result = wilder_smooth(&[f64::NAN, 2.0, 4.0, 6.0], 2);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 3.0, 1e-12);
        assert_approx(result[3], 4.5, 1e-12);
    }

    #[test]
    fn true_range_uses_previous_close() {
        let bars = make_ohlc_bars(&[(10.0, 11.0, 9.0, 10.0), (13.0, 14.0, 12.5, 13.5)]);
        let tr = true_range(&bars);
        assert_approx(tr[0], 2.0, 1e-12);
        assert_approx(tr[1], 4.0, 1e-12);
    }
}
