//! Regime momentum: trade stochastic pullbacks in the EMA trend direction,
//! only while ADX says the market is trending.

use serde::{Deserialize, Serialize};

use super::{crossed_down, crossed_up, AnnotatedSeries, EntrySignal, Strategy};
use crate::domain::{Bar, Direction};
use crate::error::ConfigError;
use crate::indicators::{Adx, Ema, Indicator, IndicatorValues, Stochastic};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeParams {
    pub fast_ema_period: usize,
    pub slow_ema_period: usize,
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub stoch_k_period: usize,
    pub stoch_slowing: usize,
    pub stoch_oversold: f64,
    pub stoch_overbought: f64,
    /// Fixed stop distance from the entry close, in price increments.
    pub stop_loss_pips: f64,
    pub reward_risk_ratio: f64,
}

impl Default for RegimeParams {
    fn default() -> Self {
        Self {
            fast_ema_period: 20,
            slow_ema_period: 50,
            adx_period: 14,
            adx_threshold: 30.0,
            stoch_k_period: 14,
            stoch_slowing: 3,
            stoch_oversold: 20.0,
            stoch_overbought: 80.0,
            stop_loss_pips: 90.0,
            reward_risk_ratio: 1.8,
        }
    }
}

impl RegimeParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, period) in [
            ("fast_ema_period", self.fast_ema_period),
            ("slow_ema_period", self.slow_ema_period),
            ("adx_period", self.adx_period),
            ("stoch_k_period", self.stoch_k_period),
            ("stoch_slowing", self.stoch_slowing),
        ] {
            if period == 0 {
                return Err(ConfigError::ZeroPeriod { name });
            }
        }
        for (name, value) in [
            ("adx_threshold", self.adx_threshold),
            ("stoch_oversold", self.stoch_oversold),
            ("stoch_overbought", self.stoch_overbought),
        ] {
            if !(value > 0.0 && value < 100.0) {
                return Err(ConfigError::LevelOutOfRange {
                    name,
                    value,
                    low: 0.0,
                    high: 100.0,
                });
            }
        }
        if self.stoch_oversold >= self.stoch_overbought {
            return Err(ConfigError::InvertedBands {
                oversold: self.stoch_oversold,
                overbought: self.stoch_overbought,
            });
        }
        if !self.stop_loss_pips.is_finite() || self.stop_loss_pips <= 0.0 {
            return Err(ConfigError::NonPositive {
                name: "stop_loss_pips",
                value: self.stop_loss_pips,
            });
        }
        if !self.reward_risk_ratio.is_finite() || self.reward_risk_ratio <= 0.0 {
            return Err(ConfigError::NonPositiveRewardRisk(self.reward_risk_ratio));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RegimeMomentum {
    params: RegimeParams,
    stop_distance: f64,
    fast: Ema,
    slow: Ema,
    adx: Adx,
    stoch_k: Stochastic,
}

impl RegimeMomentum {
    pub fn new(params: RegimeParams, price_increment: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        if !price_increment.is_finite() || price_increment <= 0.0 {
            return Err(ConfigError::NonPositiveIncrement(price_increment));
        }
        Ok(Self {
            stop_distance: params.stop_loss_pips * price_increment,
            fast: Ema::new(params.fast_ema_period),
            slow: Ema::new(params.slow_ema_period),
            adx: Adx::new(params.adx_period),
            stoch_k: Stochastic::new(params.stoch_k_period, params.stoch_slowing),
            params,
        })
    }

    pub fn params(&self) -> &RegimeParams {
        &self.params
    }
}

impl Strategy for RegimeMomentum {
    fn name(&self) -> &str {
        "regime_momentum"
    }

    /// Longest indicator lookback plus one bar for the crossing's previous value.
    fn warmup_bars(&self) -> usize {
        [
            self.fast.lookback(),
            self.slow.lookback(),
            self.adx.lookback(),
            self.stoch_k.lookback(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![
            Box::new(self.fast.clone()),
            Box::new(self.slow.clone()),
            Box::new(self.adx.clone()),
            Box::new(self.stoch_k.clone()),
        ]
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
        let close = bars[bar_index].close;
        let fast = indicators.value(self.fast.name(), bar_index);
        let slow = indicators.value(self.slow.name(), bar_index);
        let adx = indicators.value(self.adx.name(), bar_index);
        let k = indicators.value(self.stoch_k.name(), bar_index);
        let prev_k = indicators.value(self.stoch_k.name(), bar_index - 1);
        if [close, fast, slow, adx, k, prev_k].iter().any(|v| v.is_nan()) {
            return None;
        }

        if adx <= self.params.adx_threshold {
            return None;
        }

        let rr = self.params.reward_risk_ratio;
        if fast > slow && crossed_up(prev_k, k, self.params.stoch_oversold) {
            let stop = close - self.stop_distance;
            return Some(EntrySignal::from_stop(Direction::Long, close, stop, rr));
        }
        if fast < slow && crossed_down(prev_k, k, self.params.stoch_overbought) {
            let stop = close + self.stop_distance;
            return Some(EntrySignal::from_stop(Direction::Short, close, stop, rr));
        }
        None
    }

    /// Trend-reversal exit: the fast EMA crossed the slow EMA against `direction`
    /// between `index - 1` and `index`.
    fn exit_signal(&self, series: &AnnotatedSeries, index: usize, direction: Direction) -> bool {
        if index == 0 {
            return false;
        }
        let iv = series.indicators();
        let fast = iv.value(self.fast.name(), index);
        let slow = iv.value(self.slow.name(), index);
        let prev_fast = iv.value(self.fast.name(), index - 1);
        let prev_slow = iv.value(self.slow.name(), index - 1);
        if [fast, slow, prev_fast, prev_slow].iter().any(|v| v.is_nan()) {
            return false;
        }
        match direction {
            Direction::Long => fast < slow && prev_fast >= prev_slow,
            Direction::Short => fast > slow && prev_fast <= prev_slow,
        }
    }
}
