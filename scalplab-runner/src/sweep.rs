//! Parameter sweep over the optimizer grids.
//!
//! Every grid point is an independent backtest over the same bars, so points
//! run one per rayon task and the rows are merged by concatenation, then
//! ranked by profit factor.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use scalplab_core::domain::Bar;
use scalplab_core::strategy::{RegimeParams, RibbonParams};

use crate::config::{RunConfig, RunId, StrategyKind};
use crate::metrics::infinite_as_null;
use crate::runner::{run_backtest_from_bars, RunError};

/// Rows must beat this profit factor to count as robust.
pub const ROBUST_MIN_PROFIT_FACTOR: f64 = 1.2;

/// Rows must have more trades than this to count as robust.
pub const ROBUST_MIN_TRADES: usize = 10;

/// Parameter grid for one strategy family.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamGrid {
    Ribbon {
        consolidation_threshold_pips: Vec<f64>,
        reward_risk_ratios: Vec<f64>,
        max_trade_durations: Vec<usize>,
    },
    Regime {
        stop_loss_pips: Vec<f64>,
        reward_risk_ratios: Vec<f64>,
        adx_thresholds: Vec<f64>,
    },
}

impl ParamGrid {
    /// Threshold 2.5/3.5/4.5 pips × reward:risk 1.0/1.2/1.5 × duration 6/8/10 bars.
    pub fn ribbon_default() -> Self {
        ParamGrid::Ribbon {
            consolidation_threshold_pips: vec![2.5, 3.5, 4.5],
            reward_risk_ratios: vec![1.0, 1.2, 1.5],
            max_trade_durations: vec![6, 8, 10],
        }
    }

    /// Stop 70/90/110 pips × reward:risk 1.5/1.8/2.0 × ADX 28/30/32.
    pub fn regime_default() -> Self {
        ParamGrid::Regime {
            stop_loss_pips: vec![70.0, 90.0, 110.0],
            reward_risk_ratios: vec![1.5, 1.8, 2.0],
            adx_thresholds: vec![28.0, 30.0, 32.0],
        }
    }

    /// The default grid for the strategy family of `kind`.
    pub fn for_strategy(kind: &StrategyKind) -> Self {
        match kind {
            StrategyKind::RibbonBreakout(_) => Self::ribbon_default(),
            StrategyKind::RegimeMomentum(_) => Self::regime_default(),
        }
    }

    /// Returns the total number of configurations in this grid.
    pub fn size(&self) -> usize {
        match self {
            ParamGrid::Ribbon {
                consolidation_threshold_pips,
                reward_risk_ratios,
                max_trade_durations,
            } => {
                consolidation_threshold_pips.len()
                    * reward_risk_ratios.len()
                    * max_trade_durations.len()
            }
            ParamGrid::Regime {
                stop_loss_pips,
                reward_risk_ratios,
                adx_thresholds,
            } => stop_loss_pips.len() * reward_risk_ratios.len() * adx_thresholds.len(),
        }
    }

    /// Generates every grid point as (swept values, full run config).
    ///
    /// Parameters the grid does not sweep come from `base` when it is the
    /// same strategy family, otherwise from the strategy defaults.
    pub fn generate_configs(&self, base: &RunConfig) -> Vec<(BTreeMap<String, f64>, RunConfig)> {
        let mut configs = Vec::with_capacity(self.size());

        match self {
            ParamGrid::Ribbon {
                consolidation_threshold_pips,
                reward_risk_ratios,
                max_trade_durations,
            } => {
                let template = match &base.strategy.strategy {
                    StrategyKind::RibbonBreakout(p) => p.clone(),
                    StrategyKind::RegimeMomentum(_) => RibbonParams::default(),
                };
                for &threshold in consolidation_threshold_pips {
                    for &rr in reward_risk_ratios {
                        for &duration in max_trade_durations {
                            let mut config = base.clone();
                            config.strategy.max_trade_duration = duration;
                            config.strategy.strategy = StrategyKind::RibbonBreakout(RibbonParams {
                                consolidation_threshold_pips: threshold,
                                reward_risk_ratio: rr,
                                ..template.clone()
                            });
                            let params = BTreeMap::from([
                                ("consolidation_threshold_pips".to_string(), threshold),
                                ("reward_risk_ratio".to_string(), rr),
                                ("max_trade_duration".to_string(), duration as f64),
                            ]);
                            configs.push((params, config));
                        }
                    }
                }
            }
            ParamGrid::Regime {
                stop_loss_pips,
                reward_risk_ratios,
                adx_thresholds,
            } => {
                let template = match &base.strategy.strategy {
                    StrategyKind::RegimeMomentum(p) => p.clone(),
                    StrategyKind::RibbonBreakout(_) => RegimeParams::default(),
                };
                for &stop in stop_loss_pips {
                    for &rr in reward_risk_ratios {
                        for &adx in adx_thresholds {
                            let mut config = base.clone();
                            config.strategy.strategy = StrategyKind::RegimeMomentum(RegimeParams {
                                stop_loss_pips: stop,
                                reward_risk_ratio: rr,
                                adx_threshold: adx,
                                ..template.clone()
                            });
                            let params = BTreeMap::from([
                                ("stop_loss_pips".to_string(), stop),
                                ("reward_risk_ratio".to_string(), rr),
                                ("adx_threshold".to_string(), adx),
                            ]);
                            configs.push((params, config));
                        }
                    }
                }
            }
        }

        configs
    }
}

/// One grid point's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub params: BTreeMap<String, f64>,
    #[serde(with = "infinite_as_null")]
    pub profit_factor: f64,
    pub total_trades: usize,
    pub total_profit: f64,
    pub win_rate: f64,
    pub run_id: RunId,
}

impl SweepRow {
    /// Profit factor above 1.2 over more than ten trades.
    pub fn is_robust(&self) -> bool {
        self.profit_factor > ROBUST_MIN_PROFIT_FACTOR && self.total_trades > ROBUST_MIN_TRADES
    }
}

/// Parameter sweep executor over one pre-loaded bar series.
pub struct ParamSweep<'a> {
    bars: &'a [Bar],
    dataset_hash: &'a str,
    synthetic: bool,
    parallel: bool,
}

impl<'a> ParamSweep<'a> {
    pub fn new(bars: &'a [Bar], dataset_hash: &'a str, synthetic: bool) -> Self {
        Self {
            bars,
            dataset_hash,
            synthetic,
            parallel: true,
        }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs every grid point. Any failing point fails the sweep.
    pub fn sweep(&self, grid: &ParamGrid, base: &RunConfig) -> Result<SweepResults, RunError> {
        let configs = grid.generate_configs(base);
        info!(
            symbol = %base.symbol,
            points = configs.len(),
            parallel = self.parallel,
            "starting sweep"
        );

        let rows: Vec<SweepRow> = if self.parallel {
            configs
                .par_iter()
                .map(|(params, config)| self.run_point(params, config))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            configs
                .iter()
                .map(|(params, config)| self.run_point(params, config))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(rows))
    }

    fn run_point(
        &self,
        params: &BTreeMap<String, f64>,
        config: &RunConfig,
    ) -> Result<SweepRow, RunError> {
        let result = run_backtest_from_bars(config, self.bars, self.dataset_hash, self.synthetic)?;
        Ok(SweepRow {
            params: params.clone(),
            profit_factor: result.summary.profit_factor,
            total_trades: result.summary.total_trades,
            total_profit: result.summary.total_profit,
            win_rate: result.summary.win_rate,
            run_id: result.run_id,
        })
    }
}

/// Sweep rows ranked by profit factor, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    rows: Vec<SweepRow>,
}

impl SweepResults {
    pub fn new(mut rows: Vec<SweepRow>) -> Self {
        rows.sort_by(|a, b| b.profit_factor.total_cmp(&a.profit_factor));
        Self { rows }
    }

    pub fn all(&self) -> &[SweepRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn best(&self) -> Option<&SweepRow> {
        self.rows.first()
    }

    pub fn top_n(&self, n: usize) -> &[SweepRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn robust(&self) -> Vec<&SweepRow> {
        self.rows.iter().filter(|r| r.is_robust()).collect()
    }

    /// Robust rows, or the top `fallback` rows when none qualify.
    pub fn shortlist(&self, fallback: usize) -> Vec<&SweepRow> {
        let robust = self.robust();
        if robust.is_empty() {
            self.top_n(fallback).iter().collect()
        } else {
            robust
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstrumentSettings, StrategySettings};
    use chrono::NaiveDate;

    fn make_base_config(strategy: StrategyKind) -> RunConfig {
        RunConfig {
            symbol: "EURUSD".into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            end: None,
            instrument: InstrumentSettings {
                price_increment: 0.00001,
                min_stop_distance: 10,
                volume_step: 0.01,
                volume_min: 0.01,
                volume_max: 100.0,
                tick_value: 1.0,
            },
            strategy: StrategySettings {
                risk_percent: 1.0,
                max_trade_duration: 12,
                spread_increments: 0.0,
                strategy,
            },
            balance: None,
        }
    }

    fn row(pf: f64, trades: usize) -> SweepRow {
        SweepRow {
            params: BTreeMap::new(),
            profit_factor: pf,
            total_trades: trades,
            total_profit: 0.0,
            win_rate: 0.0,
            run_id: format!("{pf}-{trades}"),
        }
    }

    #[test]
    fn default_grids_have_27_points() {
        assert_eq!(ParamGrid::ribbon_default().size(), 27);
        assert_eq!(ParamGrid::regime_default().size(), 27);
    }

    #[test]
    fn ribbon_grid_keeps_unswept_params() {
        let base = make_base_config(StrategyKind::RibbonBreakout(RibbonParams {
            rsi_period: 7,
            ..RibbonParams::default()
        }));
        let configs = ParamGrid::ribbon_default().generate_configs(&base);
        assert_eq!(configs.len(), 27);

        for (params, config) in &configs {
            assert_eq!(
                config.strategy.max_trade_duration as f64,
                params["max_trade_duration"]
            );
            match &config.strategy.strategy {
                StrategyKind::RibbonBreakout(p) => {
                    assert_eq!(p.rsi_period, 7);
                    assert_eq!(p.fast_periods, vec![5, 8, 11, 14]);
                    assert_eq!(p.consolidation_threshold_pips, params["consolidation_threshold_pips"]);
                    assert_eq!(p.reward_risk_ratio, params["reward_risk_ratio"]);
                }
                other => panic!("unexpected strategy {other:?}"),
            }
        }
    }

    #[test]
    fn regime_grid_keeps_base_duration() {
        let base = make_base_config(StrategyKind::RegimeMomentum(RegimeParams::default()));
        let configs = ParamGrid::for_strategy(&base.strategy.strategy).generate_configs(&base);
        assert_eq!(configs.len(), 27);
        assert!(configs.iter().all(|(_, c)| c.strategy.max_trade_duration == 12));
        assert!(configs
            .iter()
            .all(|(p, _)| p.contains_key("adx_threshold") && p.contains_key("stop_loss_pips")));
    }

    #[test]
    fn grid_points_have_distinct_run_ids() {
        let base = make_base_config(StrategyKind::RibbonBreakout(RibbonParams::default()));
        let mut ids: Vec<String> = ParamGrid::ribbon_default()
            .generate_configs(&base)
            .iter()
            .map(|(_, c)| c.run_id().unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 27);
    }

    #[test]
    fn results_sorted_by_profit_factor() {
        let results = SweepResults::new(vec![
            row(1.1, 20),
            row(f64::INFINITY, 3),
            row(0.0, 0),
            row(2.5, 15),
        ]);
        let pfs: Vec<f64> = results.all().iter().map(|r| r.profit_factor).collect();
        assert_eq!(pfs, vec![f64::INFINITY, 2.5, 1.1, 0.0]);
        assert_eq!(results.best().unwrap().profit_factor, f64::INFINITY);
        assert_eq!(results.top_n(10).len(), 4);
    }

    #[test]
    fn robust_filter_needs_both_conditions() {
        let results = SweepResults::new(vec![
            row(1.5, 11),
            row(1.5, 10),
            row(1.2, 50),
            row(3.0, 40),
        ]);
        let robust: Vec<f64> = results.robust().iter().map(|r| r.profit_factor).collect();
        assert_eq!(robust, vec![3.0, 1.5]);
        assert_eq!(results.shortlist(5).len(), 2);
    }

    #[test]
    fn shortlist_falls_back_to_top_rows() {
        let results = SweepResults::new((0..8).map(|i| row(i as f64 * 0.1, 2)).collect());
        assert!(results.robust().is_empty());
        let shortlist = results.shortlist(5);
        assert_eq!(shortlist.len(), 5);
        assert!((shortlist[0].profit_factor - 0.7).abs() < 1e-12);
    }
}
