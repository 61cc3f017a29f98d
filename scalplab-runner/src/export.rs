//! Export: JSON and CSV artifacts for runs and sweeps.
//!
//! - **JSON**: full round-trip serialization of a `BacktestResult` with schema versioning
//! - **CSV**: trade log for one run, ranked table for a sweep
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scalplab_core::domain::CompletedTrade;

use crate::runner::{BacktestResult, SCHEMA_VERSION};
use crate::sweep::SweepResults;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Export a trade log as CSV.
///
/// Columns: direction, entry_time, entry_price, exit_time, exit_price,
/// exit_reason, profit_increments, bars_held, stop_price, target_price, volume
pub fn export_trades_csv(trades: &[CompletedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "direction",
        "entry_time",
        "entry_price",
        "exit_time",
        "exit_price",
        "exit_reason",
        "profit_increments",
        "bars_held",
        "stop_price",
        "target_price",
        "volume",
    ])?;

    for t in trades {
        wtr.write_record([
            format!("{:?}", t.direction),
            t.entry_time.to_rfc3339(),
            t.entry_price.to_string(),
            t.exit_time.to_rfc3339(),
            t.exit_price.to_string(),
            t.exit_reason.to_string(),
            format!("{:.1}", t.profit_in_increments),
            t.bars_held().to_string(),
            t.stop_price.to_string(),
            t.target_price.to_string(),
            t.position_size.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Export ranked sweep rows as CSV, one column per swept parameter.
///
/// An infinite profit factor is written as `inf`.
pub fn export_sweep_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let param_names: Vec<String> = results
        .all()
        .first()
        .map(|r| r.params.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = vec!["rank".to_string()];
    header.extend(param_names.iter().cloned());
    header.extend(
        ["profit_factor", "total_trades", "total_profit", "win_rate", "robust", "run_id"]
            .map(String::from),
    );
    wtr.write_record(&header)?;

    for (rank, row) in results.all().iter().enumerate() {
        let mut record = vec![(rank + 1).to_string()];
        record.extend(
            param_names
                .iter()
                .map(|name| row.params.get(name).map(|v| v.to_string()).unwrap_or_default()),
        );
        record.push(format!("{:.4}", row.profit_factor));
        record.push(row.total_trades.to_string());
        record.push(format!("{:.1}", row.total_profit));
        record.push(format!("{:.2}", row.win_rate));
        record.push(row.is_robust().to_string());
        record.push(row.run_id.clone());
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a single backtest run.
///
/// Creates `{symbol}_{timestamp}/` under `output_dir` containing
/// `manifest.json` (the full `BacktestResult`) and `trades.csv`.
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        result.symbol,
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let json = export_json(result)?;
    std::fs::write(run_dir.join("manifest.json"), &json)?;

    let trades_csv = export_trades_csv(&result.trades)?;
    std::fs::write(run_dir.join("trades.csv"), &trades_csv)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's manifest.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let manifest_path = dir.join("manifest.json");
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    import_json(&json)
}

/// Write a sweep table to `path`, creating parent directories.
pub fn save_sweep_csv(results: &SweepResults, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, export_sweep_csv(results)?)
        .with_context(|| format!("failed to write {}", path.display()))
}
