//! Stochastic %K with slowing.
//!
//! raw[t] = 100 * (close - lowest_low(k)) / (highest_high(k) - lowest_low(k))
//! %K = SMA(raw, slowing). A window with no range reads 50.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    slowing: usize,
    name: String,
}

impl Stochastic {
    pub fn new(k_period: usize, slowing: usize) -> Self {
        assert!(k_period >= 1 && slowing >= 1, "stochastic periods must be >= 1");
        Self {
            k_period,
            slowing,
            name: format!("stoch_k_{k_period}_{slowing}"),
        }
    }

    fn raw_k(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut raw = vec![f64::NAN; n];
        if n < self.k_period {
            return raw;
        }
        for (i, window) in bars.windows(self.k_period).enumerate() {
            let idx = i + self.k_period - 1;
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            if window.iter().any(Bar::is_void) {
                continue;
            }
            let range = highest - lowest;
            raw[idx] = if range == 0.0 {
                50.0
            } else {
                100.0 * (bars[idx].close - lowest) / range
            };
        }
        raw
    }
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.k_period - 1 + self.slowing - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        sma_of_series(&self.raw_k(bars), self.slowing)
    }
}

/// Trailing simple average; any NaN inside the window yields NaN.
fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }
    for (i, window) in values.windows(period).enumerate() {
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i + period - 1] = window.iter().sum::<f64>() / period as f64;
    }
    result
}
