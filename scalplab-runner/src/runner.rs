//! Backtest runner: wires together settings, data, strategy, simulator and metrics.
//!
//! Two entry points:
//! - `run_backtest()`: loads bars for the configured symbol, then runs. Used by CLI.
//! - `run_backtest_from_bars()`: takes pre-loaded bars. Used by the sweep, which
//!   loads once and runs every grid point against the same series.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use scalplab_core::domain::{first_index_at_or_after, Bar, CompletedTrade, OpenPosition};
use scalplab_core::simulator::Simulator;
use scalplab_core::{ConfigError, DataError};

use crate::config::{RunConfig, RunId, Settings, SettingsError};
use crate::data_loader::{load_bars, LoadError, LoadOptions};
use crate::metrics::PerformanceSummary;

/// History loaded ahead of the start date so indicators are warm on day one.
const WARMUP_DAYS: i64 = 7;

/// Default span when `[backtest].end` is omitted and bars are synthetic.
const DEFAULT_SPAN_DAYS: i64 = 28;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("bar series error: {0}")]
    Data(#[from] DataError),
    #[error("no bars for '{symbol}' at or after {start}")]
    NoBarsAfterStart { symbol: String, start: NaiveDate },
    #[error("cannot fingerprint run: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub config: RunConfig,
    pub symbol: String,
    pub strategy: String,
    pub summary: PerformanceSummary,
    pub trades: Vec<CompletedTrade>,
    /// Position still open when the data ran out; not part of the summary.
    pub open_position: Option<OpenPosition>,
    pub rejected_entries: usize,
    /// First and last bar actually simulated.
    pub first_bar: Option<DateTime<Utc>>,
    pub last_bar: Option<DateTime<Utc>>,
    pub bar_count: usize,
    pub start_index: usize,
    pub warmup_bars: usize,
    /// Entry signals at or after the start index, taken or not.
    pub signal_count: usize,
    pub dataset_hash: String,
    pub synthetic: bool,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Options for fetching bars for `config`, including warmup history.
pub fn load_options(config: &RunConfig, synthetic: bool) -> LoadOptions {
    LoadOptions {
        synthetic,
        from: config.start - Duration::days(WARMUP_DAYS),
        to: config
            .end
            .unwrap_or(config.start + Duration::days(DEFAULT_SPAN_DAYS)),
        price_increment: config.instrument.price_increment,
    }
}

/// Run the `[backtest]` section of `settings` end to end.
pub fn run_backtest(settings: &Settings, synthetic: bool) -> Result<BacktestResult, RunError> {
    let config = settings.run_config()?;
    let loaded = load_bars(
        &config.symbol,
        settings.backtest.data.as_deref(),
        &load_options(&config, synthetic),
    )?;
    run_backtest_from_bars(
        &config,
        &loaded.bars,
        &loaded.dataset_hash,
        loaded.is_synthetic(),
    )
}

/// Run a backtest over pre-loaded bars: no I/O.
///
/// Bars after `config.end` are dropped. Bars before `config.start` only warm
/// the indicators: the simulation starts at the first bar opening on or
/// after the start date.
pub fn run_backtest_from_bars(
    config: &RunConfig,
    bars: &[Bar],
    dataset_hash: &str,
    synthetic: bool,
) -> Result<BacktestResult, RunError> {
    let (bars, start_index) = simulation_window(config, bars)?;

    let strategy = config.build_strategy()?;
    let series = strategy.compute_signals(bars)?;

    let mut simulator = Simulator::new(
        config.simulation_config(start_index)?,
        config.instrument.price_increment,
    )?;
    if let Some(balance) = config.balance {
        simulator = simulator.with_risk(config.risk_validator()?, balance);
    }
    let sim = simulator.run(&series)?;

    let signal_count = series
        .signal_indices()
        .into_iter()
        .filter(|&i| i >= start_index)
        .count();
    let summary = PerformanceSummary::compute(&sim.trades);

    debug!(
        symbol = %config.symbol,
        start_index,
        warmup = strategy.warmup_bars(),
        "series annotated"
    );
    info!(
        symbol = %config.symbol,
        strategy = strategy.name(),
        trades = summary.total_trades,
        profit = summary.total_profit,
        profit_factor = summary.profit_factor,
        rejected = sim.rejected_entries,
        "backtest complete"
    );

    Ok(BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        config: config.clone(),
        symbol: config.symbol.clone(),
        strategy: strategy.name().to_string(),
        summary,
        trades: sim.trades,
        open_position: sim.open_position,
        rejected_entries: sim.rejected_entries,
        first_bar: bars.get(start_index).map(|b| b.open_time),
        last_bar: bars.last().map(|b| b.open_time),
        bar_count: bars.len(),
        start_index,
        warmup_bars: strategy.warmup_bars(),
        signal_count,
        dataset_hash: dataset_hash.to_string(),
        synthetic,
    })
}

/// Bars up to the end date, and the index of the first bar on or after the start date.
pub fn simulation_window<'a>(
    config: &RunConfig,
    bars: &'a [Bar],
) -> Result<(&'a [Bar], usize), RunError> {
    let bars = clip_to_end(bars, config.end);
    let start_index = first_index_at_or_after(bars, start_of_day(config.start)).ok_or_else(|| {
        RunError::NoBarsAfterStart {
            symbol: config.symbol.clone(),
            start: config.start,
        }
    })?;
    Ok((bars, start_index))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Bars opening before the day after `end`.
fn clip_to_end(bars: &[Bar], end: Option<NaiveDate>) -> &[Bar] {
    match end.and_then(|d| d.succ_opt()) {
        Some(next_day) => {
            let cutoff = start_of_day(next_day);
            let len = bars.partition_point(|b| b.open_time < cutoff);
            &bars[..len]
        }
        None => bars,
    }
}
