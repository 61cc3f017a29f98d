//! EMA ribbon breakout.
//!
//! A tight ribbon of fast EMAs marks consolidation. The next bar closing
//! beyond the whole ribbon, with the ribbon on the right side of the slow EMA
//! and RSI crossing its trigger level the same way, is an entry.

use serde::{Deserialize, Serialize};

use super::{crossed_down, crossed_up, EntrySignal, Strategy};
use crate::domain::{Bar, Direction};
use crate::error::ConfigError;
use crate::indicators::{Ema, Indicator, IndicatorValues, Rsi};

/// Extra bars required on top of the longest indicator period.
const WARMUP_MARGIN: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RibbonParams {
    pub fast_periods: Vec<usize>,
    pub slow_period: usize,
    pub rsi_period: usize,
    pub rsi_level: f64,
    pub consolidation_threshold_pips: f64,
    pub reward_risk_ratio: f64,
}

impl Default for RibbonParams {
    fn default() -> Self {
        Self {
            fast_periods: vec![5, 8, 11, 14],
            slow_period: 50,
            rsi_period: 9,
            rsi_level: 50.0,
            consolidation_threshold_pips: 3.5,
            reward_risk_ratio: 1.2,
        }
    }
}

impl RibbonParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fast_periods.is_empty() {
            return Err(ConfigError::EmptyRibbon);
        }
        if self.fast_periods.contains(&0) {
            return Err(ConfigError::ZeroPeriod {
                name: "fast_periods",
            });
        }
        if self.slow_period == 0 {
            return Err(ConfigError::ZeroPeriod {
                name: "slow_period",
            });
        }
        if self.rsi_period == 0 {
            return Err(ConfigError::ZeroPeriod { name: "rsi_period" });
        }
        if !(self.rsi_level > 0.0 && self.rsi_level < 100.0) {
            return Err(ConfigError::LevelOutOfRange {
                name: "rsi_level",
                value: self.rsi_level,
                low: 0.0,
                high: 100.0,
            });
        }
        if !self.consolidation_threshold_pips.is_finite() || self.consolidation_threshold_pips < 0.0
        {
            return Err(ConfigError::Negative {
                name: "consolidation_threshold_pips",
                value: self.consolidation_threshold_pips,
            });
        }
        if !self.reward_risk_ratio.is_finite() || self.reward_risk_ratio <= 0.0 {
            return Err(ConfigError::NonPositiveRewardRisk(self.reward_risk_ratio));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RibbonBreakout {
    params: RibbonParams,
    threshold: f64,
    ribbon: Vec<Ema>,
    slow: Ema,
    rsi: Rsi,
    /// Index into `ribbon` of the longest-period EMA.
    slowest: usize,
}

impl RibbonBreakout {
    pub fn new(params: RibbonParams, price_increment: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        if !price_increment.is_finite() || price_increment <= 0.0 {
            return Err(ConfigError::NonPositiveIncrement(price_increment));
        }

        let ribbon: Vec<Ema> = params.fast_periods.iter().map(|&p| Ema::new(p)).collect();
        let slowest = ribbon
            .iter()
            .enumerate()
            .max_by_key(|(_, ema)| ema.period())
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(Self {
            threshold: params.consolidation_threshold_pips * price_increment,
            slow: Ema::new(params.slow_period),
            rsi: Rsi::new(params.rsi_period),
            ribbon,
            slowest,
            params,
        })
    }

    pub fn params(&self) -> &RibbonParams {
        &self.params
    }

    /// Consolidation threshold in price units.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// (min, max, slowest) of the ribbon at `i`; `None` while any EMA is warming up.
    fn ribbon_at(&self, indicators: &IndicatorValues, i: usize) -> Option<(f64, f64, f64)> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut slowest = f64::NAN;
        for (k, ema) in self.ribbon.iter().enumerate() {
            let v = indicators.value(ema.name(), i);
            if v.is_nan() {
                return None;
            }
            min = min.min(v);
            max = max.max(v);
            if k == self.slowest {
                slowest = v;
            }
        }
        Some((min, max, slowest))
    }
}

impl Strategy for RibbonBreakout {
    fn name(&self) -> &str {
        "ribbon_breakout"
    }

    fn warmup_bars(&self) -> usize {
        let longest = self
            .params
            .fast_periods
            .iter()
            .copied()
            .chain([self.params.slow_period, self.params.rsi_period])
            .max()
            .unwrap_or(0);
        longest + WARMUP_MARGIN
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        let mut out: Vec<Box<dyn Indicator>> = self
            .ribbon
            .iter()
            .map(|ema| Box::new(ema.clone()) as Box<dyn Indicator>)
            .collect();
        out.push(Box::new(self.slow.clone()));
        out.push(Box::new(self.rsi.clone()));
        out
    }

    fn evaluate(
        &self,
        bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
    ) -> Option<EntrySignal> {
        if bar_index == 0 {
            return None;
        }
        let bar = &bars[bar_index];
        let (prev_min, prev_max, _) = self.ribbon_at(indicators, bar_index - 1)?;
        let (ribbon_min, ribbon_max, ribbon_slowest) = self.ribbon_at(indicators, bar_index)?;
        let slow = indicators.value(self.slow.name(), bar_index);
        let rsi = indicators.value(self.rsi.name(), bar_index);
        let prev_rsi = indicators.value(self.rsi.name(), bar_index - 1);
        if slow.is_nan() || rsi.is_nan() || prev_rsi.is_nan() || bar.is_void() {
            return None;
        }

        if prev_max - prev_min >= self.threshold {
            return None;
        }

        let close = bar.close;
        let level = self.params.rsi_level;
        let long = close > slow
            && close > ribbon_max
            && ribbon_min > slow
            && crossed_up(prev_rsi, rsi, level);
        let short = close < slow
            && close < ribbon_min
            && ribbon_max < slow
            && crossed_down(prev_rsi, rsi, level);
        debug_assert!(!(long && short), "long and short fired on bar {bar_index}");

        let rr = self.params.reward_risk_ratio;
        if long {
            let stop = bar.low.min(ribbon_slowest);
            Some(EntrySignal::from_stop(Direction::Long, close, stop, rr))
        } else if short {
            let stop = bar.high.max(ribbon_slowest);
            Some(EntrySignal::from_stop(Direction::Short, close, stop, rr))
        } else {
            None
        }
    }
}
