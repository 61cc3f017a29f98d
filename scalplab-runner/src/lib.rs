//! ScalpLab Runner: backtest orchestration, parameter sweeps, paper trading, export.
//!
//! This crate builds on `scalplab-core` to provide:
//! - TOML settings resolved into a fingerprinted run configuration
//! - Bar loading from broker CSV exports with a synthetic fallback
//! - Single-backtest runner with performance aggregation
//! - Parallel parameter sweeps over the optimizer grids
//! - A paper gateway that drives the live decision cycle over recorded bars
//! - JSON and CSV artifacts

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod paper;
pub mod runner;
pub mod sweep;

pub use config::{RunConfig, RunId, Settings, SettingsError, StrategyKind};
pub use data_loader::{load_bars, DataSource, LoadError, LoadOptions, LoadedData};
pub use metrics::{optimizer_score, PerformanceSummary};
pub use paper::{run_paper, PaperGateway, PaperReport};
pub use runner::{run_backtest, run_backtest_from_bars, BacktestResult, RunError};
pub use sweep::{ParamGrid, ParamSweep, SweepResults, SweepRow};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn performance_summary_is_send_sync() {
        assert_send::<PerformanceSummary>();
        assert_sync::<PerformanceSummary>();
    }

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<Settings>();
        assert_sync::<Settings>();
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn sweep_types_are_send_sync() {
        assert_send::<ParamGrid>();
        assert_sync::<ParamGrid>();
        assert_send::<SweepRow>();
        assert_sync::<SweepRow>();
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
    }

    #[test]
    fn run_error_is_send() {
        assert_send::<RunError>();
    }
}
