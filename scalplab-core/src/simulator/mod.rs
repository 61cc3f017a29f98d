//! Trade-lifecycle simulator: replays an annotated series bar by bar with at
//! most one open position.
//!
//! Per bar: resolve the open position first (stop, target, time stop), then
//! consider a new entry. A bar that closes a trade may open the next one.
//! Entries fill at the bar's close; with a risk validator attached, at the
//! close-derived quote instead.

pub mod exit;

pub use exit::check_exit;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{check_open_times, CompletedTrade, OpenPosition};
use crate::error::{ConfigError, DataError};
use crate::risk::{CandidateEntry, Quote, RiskValidator};
use crate::strategy::{AnnotatedBar, AnnotatedSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// First bar eligible for exits and entries; earlier bars only warm indicators.
    pub start_index: usize,
    /// Bars after entry at which a still-open trade is closed at the bar close.
    pub max_trade_duration: usize,
    /// Simulated spread in price increments, used only with a risk validator.
    pub spread_increments: f64,
}

impl SimulationConfig {
    pub fn new(
        start_index: usize,
        max_trade_duration: usize,
        spread_increments: f64,
    ) -> Result<Self, ConfigError> {
        if max_trade_duration == 0 {
            return Err(ConfigError::ZeroTradeDuration);
        }
        if !spread_increments.is_finite() || spread_increments < 0.0 {
            return Err(ConfigError::Negative {
                name: "spread_increments",
                value: spread_increments,
            });
        }
        Ok(Self {
            start_index,
            max_trade_duration,
            spread_increments,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Closed trades in exit order.
    pub trades: Vec<CompletedTrade>,
    /// Position still open when the data ran out.
    pub open_position: Option<OpenPosition>,
    /// Entries the risk validator refused.
    pub rejected_entries: usize,
    pub bars_processed: usize,
}

#[derive(Debug, Clone)]
enum PositionState {
    Flat,
    Open(OpenPosition),
}

#[derive(Debug, Clone)]
struct RiskContext {
    validator: RiskValidator,
    balance: f64,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
    price_increment: f64,
    risk: Option<RiskContext>,
}

impl Simulator {
    pub fn new(config: SimulationConfig, price_increment: f64) -> Result<Self, ConfigError> {
        if !price_increment.is_finite() || price_increment <= 0.0 {
            return Err(ConfigError::NonPositiveIncrement(price_increment));
        }
        Ok(Self {
            config,
            price_increment,
            risk: None,
        })
    }

    /// Route every candidate entry through `validator`, sizing against `balance`.
    pub fn with_risk(mut self, validator: RiskValidator, balance: f64) -> Self {
        self.price_increment = validator.spec().price_increment();
        self.risk = Some(RiskContext { validator, balance });
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn run(&self, series: &AnnotatedSeries) -> Result<SimulationResult, DataError> {
        let bars = series.bars();
        check_open_times(bars.iter().map(|a| a.bar.open_time))?;
        if self.config.start_index > bars.len() {
            return Err(DataError::StartOutOfRange {
                start: self.config.start_index,
                len: bars.len(),
            });
        }

        let mut result = SimulationResult::default();
        let mut state = PositionState::Flat;

        for (index, annotated) in bars.iter().enumerate().skip(self.config.start_index) {
            result.bars_processed += 1;
            let bar = &annotated.bar;

            if let PositionState::Open(position) = &state {
                if let Some((price, reason)) =
                    check_exit(position, bar, index, self.config.max_trade_duration)
                {
                    let position = position.clone();
                    let trade =
                        position.close(bar.open_time, price, index, reason, self.price_increment);
                    debug!(
                        bar = index,
                        direction = %trade.direction,
                        reason = %reason,
                        profit = trade.profit_in_increments,
                        "trade closed"
                    );
                    result.trades.push(trade);
                    state = PositionState::Flat;
                }
            }

            if matches!(state, PositionState::Flat) {
                if let Some(position) = self.try_open(annotated, index, &mut result) {
                    state = PositionState::Open(position);
                }
            }
        }

        if let PositionState::Open(position) = state {
            result.open_position = Some(position);
        }

        info!(
            bars = result.bars_processed,
            trades = result.trades.len(),
            rejected = result.rejected_entries,
            open_at_end = result.open_position.is_some(),
            "simulation complete"
        );
        Ok(result)
    }

    fn try_open(
        &self,
        annotated: &AnnotatedBar,
        index: usize,
        result: &mut SimulationResult,
    ) -> Option<OpenPosition> {
        let entry = annotated.entry()?;
        let usable = |p: f64| p.is_finite() && p > 0.0;
        if !usable(entry.stop_price) || !usable(entry.target_price) {
            return None;
        }
        let bar = &annotated.bar;

        let Some(risk) = &self.risk else {
            return Some(OpenPosition {
                direction: entry.direction,
                entry_time: bar.open_time,
                entry_price: bar.close,
                stop_price: entry.stop_price,
                target_price: entry.target_price,
                entry_bar_index: index,
                position_size: None,
            });
        };

        let spec = risk.validator.spec();
        let candidate = CandidateEntry {
            symbol: spec.symbol().to_string(),
            direction: entry.direction,
            quote: self.simulated_quote(bar.close),
            suggested_stop_price: entry.stop_price,
        };
        match risk.validator.validate(&candidate, risk.balance) {
            Ok(order) => Some(OpenPosition {
                direction: order.direction,
                entry_time: bar.open_time,
                entry_price: order.entry_price,
                stop_price: order.final_stop_price,
                target_price: order.final_target_price,
                entry_bar_index: index,
                position_size: Some(order.position_size),
            }),
            Err(rejection) => {
                debug!(bar = index, %rejection, "entry skipped");
                result.rejected_entries += 1;
                None
            }
        }
    }

    /// bid = close, ask = close + spread.
    fn simulated_quote(&self, close: f64) -> Quote {
        Quote::new(
            close,
            close + self.config.spread_increments * self.price_increment,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, ExitReason, Signal, SymbolSpec};
    use crate::indicators::IndicatorValues;
    use crate::risk::RiskConfig;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        Bar::new(start + Duration::minutes(5 * i as i64), open, high, low, close, 1.0)
    }

    fn flat(i: usize, price: f64) -> AnnotatedBar {
        AnnotatedBar::flat(bar(i, price, price + 0.5, price - 0.5, price))
    }

    fn long_at(i: usize, close: f64, stop: f64, target: f64) -> AnnotatedBar {
        AnnotatedBar {
            bar: bar(i, close, close + 0.5, close - 0.5, close),
            signal: Signal::Long,
            stop_price: Some(stop),
            target_price: Some(target),
        }
    }

    fn series(bars: Vec<AnnotatedBar>) -> AnnotatedSeries {
        AnnotatedSeries::new(bars, IndicatorValues::new())
    }

    fn simulator(max_duration: usize) -> Simulator {
        Simulator::new(SimulationConfig::new(0, max_duration, 0.0).unwrap(), 0.01).unwrap()
    }

    #[test]
    fn config_rejects_zero_duration_and_negative_spread() {
        assert_eq!(
            SimulationConfig::new(0, 0, 0.0).unwrap_err(),
            ConfigError::ZeroTradeDuration
        );
        assert!(SimulationConfig::new(0, 5, -1.0).is_err());
    }

    #[test]
    fn take_profit_round_trip() {
        let s = series(vec![
            flat(0, 100.0),
            long_at(1, 100.0, 99.0, 102.0),
            flat(2, 101.0),
            AnnotatedBar::flat(bar(3, 101.0, 102.5, 100.8, 102.2)),
        ]);
        let result = simulator(10).run(&s).unwrap();
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.exit_price, 102.0);
        assert_eq!(trade.entry_bar_index, 1);
        assert_eq!(trade.exit_bar_index, 3);
        assert!((trade.profit_in_increments - 200.0).abs() < 1e-6);
        assert!(result.open_position.is_none());
    }

    #[test]
    fn signals_while_open_are_ignored() {
        let s = series(vec![
            long_at(0, 100.0, 99.0, 102.0),
            long_at(1, 100.2, 99.0, 103.0),
            long_at(2, 100.4, 99.0, 103.0),
        ]);
        let result = simulator(10).run(&s).unwrap();
        assert!(result.trades.is_empty());
        let open = result.open_position.unwrap();
        assert_eq!(open.entry_bar_index, 0);
        assert_eq!(open.target_price, 102.0);
    }

    #[test]
    fn exit_bar_can_reenter() {
        let s = series(vec![
            long_at(0, 100.0, 99.0, 102.0),
            // hits the stop, then carries a fresh signal
            AnnotatedBar {
                bar: bar(1, 99.5, 99.8, 98.5, 99.0),
                signal: Signal::Long,
                stop_price: Some(98.0),
                target_price: Some(101.0),
            },
        ]);
        let result = simulator(10).run(&s).unwrap();
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].exit_reason, ExitReason::StopLoss);
        let open = result.open_position.unwrap();
        assert_eq!(open.entry_bar_index, 1);
        assert_eq!(open.entry_price, 99.0);
    }

    #[test]
    fn start_index_skips_early_bars() {
        let s = series(vec![
            long_at(0, 100.0, 99.0, 102.0),
            flat(1, 100.0),
            long_at(2, 100.0, 99.0, 102.0),
        ]);
        let sim = Simulator::new(SimulationConfig::new(2, 5, 0.0).unwrap(), 0.01).unwrap();
        let result = sim.run(&s).unwrap();
        assert_eq!(result.bars_processed, 1);
        assert_eq!(result.open_position.unwrap().entry_bar_index, 2);
    }

    #[test]
    fn start_index_beyond_series_is_an_error() {
        let s = series(vec![flat(0, 100.0)]);
        let sim = Simulator::new(SimulationConfig::new(5, 5, 0.0).unwrap(), 0.01).unwrap();
        assert_eq!(
            sim.run(&s).unwrap_err(),
            DataError::StartOutOfRange { start: 5, len: 1 }
        );
    }

    #[test]
    fn non_monotonic_series_is_an_error() {
        let mut bars = vec![flat(0, 100.0), flat(1, 100.0), flat(2, 100.0)];
        bars[2].bar.open_time = bars[0].bar.open_time;
        let result = simulator(5).run(&series(bars));
        assert!(matches!(result, Err(DataError::NonMonotonicTime { index: 2, .. })));
    }

    #[test]
    fn risk_validator_sizes_and_prices_entries() {
        let spec = SymbolSpec::new("TEST", 0.01, 10, 0.01, 0.01, 100.0, 1.0).unwrap();
        let validator = RiskValidator::new(
            spec,
            RiskConfig {
                reward_risk_ratio: 2.0,
                risk_percent: 1.0,
            },
        )
        .unwrap();
        let sim = Simulator::new(SimulationConfig::new(0, 10, 2.0).unwrap(), 0.01)
            .unwrap()
            .with_risk(validator, 10_000.0);

        let s = series(vec![long_at(0, 100.0, 99.0, 102.0), flat(1, 100.0)]);
        let result = sim.run(&s).unwrap();
        let open = result.open_position.unwrap();
        // entry at ask = close + 2 increments
        assert!((open.entry_price - 100.02).abs() < 1e-9);
        assert_eq!(open.stop_price, 99.0);
        // target = 100.02 + 1.02 * 2
        assert!((open.target_price - 102.06).abs() < 1e-9);
        // 100 risk / 102 increments → 0.98
        assert_eq!(open.position_size, Some(0.98));
    }

    #[test]
    fn rejected_entries_are_skipped() {
        let spec = SymbolSpec::new("TEST", 0.01, 0, 1.0, 1.0, 100.0, 1.0).unwrap();
        let validator = RiskValidator::new(spec, RiskConfig::default()).unwrap();
        let sim = simulator(10).with_risk(validator, 1_000.0);
        // 10 risk / 100 increments → 0.1 < min volume 1.0
        let s = series(vec![long_at(0, 100.0, 99.0, 102.0), flat(1, 100.0)]);
        let result = sim.run(&s).unwrap();
        assert_eq!(result.rejected_entries, 1);
        assert!(result.open_position.is_none());
        assert!(result.trades.is_empty());
    }
}
