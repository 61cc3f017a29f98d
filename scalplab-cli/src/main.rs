//! ScalpLab CLI: backtest, optimize, order validation and paper trading.
//!
//! Commands:
//! - `backtest`: run the `[backtest]` section of a TOML settings file
//! - `optimize`: sweep the strategy's parameter grid and rank by profit factor
//! - `order`: validate a hypothetical order against the risk rules
//! - `paper`: replay the live decision cycle over recorded bars

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scalplab_core::domain::Direction;
use scalplab_core::live::LiveTrader;
use scalplab_core::risk::{CandidateEntry, Quote};
use scalplab_runner::export::{save_artifacts, save_sweep_csv};
use scalplab_runner::runner::{load_options, run_backtest, simulation_window};
use scalplab_runner::sweep::{ParamGrid, ParamSweep, SweepRow};
use scalplab_runner::{load_bars, run_paper, BacktestResult, PaperGateway, PaperReport, Settings};

/// Balance used by `paper` when the settings give none.
const DEFAULT_PAPER_BALANCE: f64 = 10_000.0;

/// Rows shown by `optimize` when no configuration is robust.
const FALLBACK_ROWS: usize = 5;

#[derive(Parser)]
#[command(
    name = "scalplab",
    about = "ScalpLab CLI: intraday FX signal backtesting and risk validation"
)]
struct Cli {
    /// Log level filter; RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest from a TOML settings file.
    Backtest {
        /// Path to the settings file.
        #[arg(long)]
        config: PathBuf,

        /// Override `[backtest].symbol`.
        #[arg(long)]
        symbol: Option<String>,

        /// Generate synthetic bars when no data file is available.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Output directory for the manifest and trade log.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Sweep the parameter grid of the configured strategy.
    Optimize {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Run grid points one after another instead of in parallel.
        #[arg(long, default_value_t = false)]
        sequential: bool,

        /// Write the ranked table to this CSV file.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a hypothetical order: final stop, target and volume.
    Order {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, value_enum)]
        direction: Side,

        #[arg(long)]
        bid: f64,

        #[arg(long)]
        ask: f64,

        /// Proposed stop price. Omitted means the broker minimum distance.
        #[arg(long)]
        stop: Option<f64>,

        #[arg(long)]
        balance: f64,
    },
    /// Replay the live decision cycle over the backtest window.
    Paper {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Long,
    Short,
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Long,
            Side::Short => Direction::Short,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Backtest {
            config,
            symbol,
            synthetic,
            output_dir,
        } => run_backtest_cmd(&config, symbol, synthetic, &output_dir),
        Commands::Optimize {
            config,
            symbol,
            synthetic,
            sequential,
            output,
        } => run_optimize(&config, symbol, synthetic, sequential, output.as_deref()),
        Commands::Order {
            config,
            symbol,
            direction,
            bid,
            ask,
            stop,
            balance,
        } => run_order(&config, symbol, direction.into(), bid, ask, stop, balance),
        Commands::Paper {
            config,
            symbol,
            synthetic,
        } => run_paper_cmd(&config, symbol, synthetic),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;
    Ok(())
}

fn load_settings(path: &Path, symbol: Option<String>) -> Result<Settings> {
    let mut settings = Settings::load(path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    if let Some(symbol) = symbol {
        settings.backtest.symbol = symbol;
    }
    Ok(settings)
}

fn run_backtest_cmd(
    config_path: &Path,
    symbol: Option<String>,
    synthetic: bool,
    output_dir: &Path,
) -> Result<()> {
    let settings = load_settings(config_path, symbol)?;
    let result = run_backtest(&settings, synthetic)?;

    print_summary(&result);

    let run_dir = save_artifacts(&result, output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_optimize(
    config_path: &Path,
    symbol: Option<String>,
    synthetic: bool,
    sequential: bool,
    output: Option<&Path>,
) -> Result<()> {
    let settings = load_settings(config_path, symbol)?;
    let base = settings.run_config()?;
    let loaded = load_bars(
        &base.symbol,
        settings.backtest.data.as_deref(),
        &load_options(&base, synthetic),
    )?;

    let grid = ParamGrid::for_strategy(&base.strategy.strategy);
    println!(
        "Sweeping {} configurations of {} on {}...",
        grid.size(),
        base.strategy.strategy.name(),
        base.symbol
    );
    let results = ParamSweep::new(&loaded.bars, &loaded.dataset_hash, loaded.is_synthetic())
        .with_parallelism(!sequential)
        .sweep(&grid, &base)?;

    let robust = results.robust();
    println!();
    if robust.is_empty() {
        println!(
            "No robust configuration (PF > 1.2 and > 10 trades). Top {FALLBACK_ROWS} by profit factor:"
        );
    } else {
        println!("=== Robust configurations ({}) ===", robust.len());
    }
    for row in results.shortlist(FALLBACK_ROWS) {
        print_sweep_row(row);
    }
    if loaded.is_synthetic() {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }

    if let Some(path) = output {
        save_sweep_csv(&results, path)?;
        println!("Sweep table saved to: {}", path.display());
    }
    Ok(())
}

fn run_order(
    config_path: &Path,
    symbol: Option<String>,
    direction: Direction,
    bid: f64,
    ask: f64,
    stop: Option<f64>,
    balance: f64,
) -> Result<()> {
    let settings = load_settings(config_path, symbol)?;
    let config = settings.run_config()?;
    let validator = config.risk_validator()?;

    let candidate = CandidateEntry {
        symbol: config.symbol.clone(),
        direction,
        quote: Quote::new(bid, ask),
        suggested_stop_price: stop.unwrap_or(f64::NAN),
    };

    println!();
    println!("=== Order Validation ===");
    println!("Symbol:         {}", config.symbol);
    println!("Direction:      {direction}");
    match validator.validate(&candidate, balance) {
        Ok(order) => {
            println!("Entry:          {}", order.entry_price);
            println!("Stop:           {}", order.final_stop_price);
            println!("Target:         {}", order.final_target_price);
            println!("Stop Distance:  {:.1}", order.stop_distance_increments);
            println!("Volume:         {}", order.position_size);
        }
        Err(rejection) => println!("REJECTED:       {rejection}"),
    }
    println!();
    Ok(())
}

fn run_paper_cmd(config_path: &Path, symbol: Option<String>, synthetic: bool) -> Result<()> {
    let settings = load_settings(config_path, symbol)?;
    let config = settings.run_config()?;
    let loaded = load_bars(
        &config.symbol,
        settings.backtest.data.as_deref(),
        &load_options(&config, synthetic),
    )?;
    let (bars, start_index) = simulation_window(&config, &loaded.bars)?;

    let trader = LiveTrader::new(config.build_strategy()?, config.risk_validator()?);
    let mut gateway = PaperGateway::new(
        config.symbol_spec()?,
        bars.to_vec(),
        start_index + 1,
        config.strategy.spread_increments,
        config.balance.unwrap_or(DEFAULT_PAPER_BALANCE),
    );
    let report = run_paper(&trader, &mut gateway)?;

    print_paper_report(&config.symbol, &report);
    if loaded.is_synthetic() {
        println!("WARNING: Results based on SYNTHETIC data");
        println!();
    }
    Ok(())
}

fn format_params(params: &std::collections::BTreeMap<String, f64>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_sweep_row(row: &SweepRow) {
    println!(
        "PF {:>6.2}  trades {:>4}  profit {:>9.1}  win {:>5.1}%  [{}]",
        row.profit_factor,
        row.total_trades,
        row.total_profit,
        row.win_rate,
        format_params(&row.params)
    );
}

fn print_summary(result: &BacktestResult) {
    let s = &result.summary;
    println!();
    println!("=== Backtest Result ===");
    println!("Symbol:         {}", result.symbol);
    println!("Strategy:       {}", result.strategy);
    if let (Some(first), Some(last)) = (result.first_bar, result.last_bar) {
        println!("Period:         {first} to {last}");
    }
    println!(
        "Bars:           {} ({} before start, {} warmup)",
        result.bar_count, result.start_index, result.warmup_bars
    );
    println!("Signals:        {}", result.signal_count);
    println!("Trades:         {}", s.total_trades);
    println!("Rejected:       {}", result.rejected_entries);
    println!();
    println!("--- Performance (price increments) ---");
    println!("Net Profit:     {:.1}", s.total_profit);
    println!("Profit Factor:  {:.2}", s.profit_factor);
    println!("Win Rate:       {:.1}%", s.win_rate);
    println!("Avg Win:        {:.1}", s.average_win);
    println!("Avg Loss:       {:.1}", s.average_loss);
    println!("Largest Win:    {:.1}", s.largest_win);
    println!("Largest Loss:   {:.1}", s.largest_loss);
    println!("Max Drawdown:   {:.1}", s.max_drawdown);
    println!("Max Consec Loss:{}", s.max_consecutive_losses);
    for (reason, count) in &s.exit_reasons {
        println!("  {reason:<13} {count}");
    }
    if let Some(open) = &result.open_position {
        println!();
        println!(
            "Open at end:    {} from {} @ {}",
            open.direction, open.entry_time, open.entry_price
        );
    }
    if result.synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_paper_report(symbol: &str, report: &PaperReport) {
    let profit: f64 = report.fills.iter().map(|f| f.profit_in_increments).sum();
    println!();
    println!("=== Paper Session ===");
    println!("Symbol:         {symbol}");
    println!("Cycles:         {}", report.cycles);
    println!("Orders:         {}", report.orders);
    println!("Rejected:       {}", report.rejections);
    println!("Exit Signals:   {}", report.exit_signals);
    println!("Closed:         {}", report.fills.len());
    println!("Net Profit:     {profit:.1}");
    println!(
        "Balance:        {:.2} -> {:.2}",
        report.starting_balance, report.final_balance
    );
    if report.position_open_at_end {
        println!("Position still open at end of data");
    }
    println!();
}
