//! Bar loading for the runner.
//!
//! Resolution policy for one symbol:
//! 1. If a CSV file is configured and exists → read it
//! 2. If not and `synthetic` is set → generate seeded synthetic bars (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! CSV input follows the broker's rate export: a header row with `time`,
//! `open`, `high`, `low`, `close` and optionally `volume` or `tick_volume`.
//! Extra columns are ignored. `time` may be unix seconds, RFC 3339, or
//! `YYYY-MM-DD HH:MM[:SS]` (UTC).

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use scalplab_core::domain::Bar;

/// Bar spacing of generated data.
const SYNTHETIC_BAR_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bar data for '{symbol}' (set [backtest].data or use --synthetic)")]
    NoData { symbol: String },

    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: unparseable timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },

    #[error("row {row}: inconsistent OHLC at {time}")]
    InsaneBar { row: usize, time: DateTime<Utc> },

    #[error("duplicate bar timestamp {time}")]
    DuplicateTime { time: DateTime<Utc> },

    #[error("{path} contains no bars")]
    Empty { path: PathBuf },
}

/// Where a series came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Csv(PathBuf),
    Synthetic,
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Generate synthetic bars when no CSV is available.
    pub synthetic: bool,
    /// Synthetic range, inclusive days.
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Price grid of generated bars.
    pub price_increment: f64,
}

#[derive(Debug, Clone)]
pub struct LoadedData {
    pub bars: Vec<Bar>,
    pub source: DataSource,
    /// BLAKE3 over symbol and all bar data.
    pub dataset_hash: String,
}

impl LoadedData {
    pub fn is_synthetic(&self) -> bool {
        self.source == DataSource::Synthetic
    }
}

/// Load bars for `symbol` from `path`, with synthetic fallback.
pub fn load_bars(
    symbol: &str,
    path: Option<&Path>,
    opts: &LoadOptions,
) -> Result<LoadedData, LoadError> {
    if let Some(path) = path.filter(|p| p.exists()) {
        let bars = load_csv(path)?;
        info!(symbol, path = %path.display(), bars = bars.len(), "bars loaded");
        return Ok(LoadedData {
            dataset_hash: compute_dataset_hash(symbol, &bars),
            bars,
            source: DataSource::Csv(path.to_path_buf()),
        });
    }

    if opts.synthetic {
        warn!(symbol, "generating synthetic bars; results are tagged as synthetic");
        let bars = generate_synthetic_bars(symbol, opts.from, opts.to, opts.price_increment);
        return Ok(LoadedData {
            dataset_hash: compute_dataset_hash(symbol, &bars),
            bars,
            source: DataSource::Synthetic,
        });
    }

    match path {
        Some(path) => Err(LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }),
        None => Err(LoadError::NoData {
            symbol: symbol.to_string(),
        }),
    }
}

/// Read a CSV bar file into a chronologically sorted series.
pub fn load_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars_csv(file)?;
    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(bars)
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default, alias = "tick_volume")]
    volume: f64,
}

/// Parse CSV bars from any reader. Rows may come in any order; the result
/// is sorted by open time and must not repeat a timestamp.
pub fn read_bars_csv<R: Read>(reader: R) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (i, record) in rdr.deserialize::<CsvBar>().enumerate() {
        let row = i + 1;
        let raw = record?;
        let open_time = parse_time(&raw.time).ok_or_else(|| LoadError::BadTimestamp {
            row,
            value: raw.time.clone(),
        })?;
        let bar = Bar::new(open_time, raw.open, raw.high, raw.low, raw.close, raw.volume);
        if !bar.is_sane() {
            return Err(LoadError::InsaneBar {
                row,
                time: open_time,
            });
        }
        bars.push(bar);
    }

    bars.sort_by_key(|b| b.open_time);
    if let Some(pair) = bars.windows(2).find(|w| w[0].open_time == w[1].open_time) {
        return Err(LoadError::DuplicateTime {
            time: pair[1].open_time,
        });
    }
    Ok(bars)
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y.%m.%d %H:%M:%S", "%Y.%m.%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|t| t.and_utc())
}

/// Write bars in the same CSV layout `read_bars_csv` accepts.
pub fn write_bars_csv(path: &Path, bars: &[Bar]) -> Result<(), LoadError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["time", "open", "high", "low", "close", "volume"])?;
    for bar in bars {
        wtr.write_record([
            bar.open_time.to_rfc3339(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    wtr.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Deterministic BLAKE3 hash over the symbol and every bar field.
pub fn compute_dataset_hash(symbol: &str, bars: &[Bar]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    for bar in bars {
        hasher.update(&bar.open_time.timestamp().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&bar.volume.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Generate five-minute weekday bars for development runs.
///
/// A seeded random walk on the instrument's price grid that alternates
/// between quiet stretches and directional bursts, so both strategies find
/// something to trade. Clearly fake and tagged as synthetic.
pub fn generate_synthetic_bars(
    symbol: &str,
    from: NaiveDate,
    to: NaiveDate,
    price_increment: f64,
) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Deterministic seed from symbol name
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::new();
    let mut price = price_increment * 110_000.0;
    let mut quiet = true;
    let mut drift = 0.0;
    let mut day = from;

    while day <= to {
        let weekend = matches!(day.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
        if let (false, Some(midnight)) = (weekend, day.and_hms_opt(0, 0, 0)) {
            let midnight = midnight.and_utc();
            for slot in 0..(24 * 60 / SYNTHETIC_BAR_MINUTES) {
                if rng.gen_bool(if quiet { 0.02 } else { 0.08 }) {
                    quiet = !quiet;
                    drift = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                }
                let step: f64 = if quiet {
                    rng.gen_range(-1.0..1.0)
                } else {
                    drift * rng.gen_range(0.0..6.0) + rng.gen_range(-4.0..4.0)
                };

                let open = price;
                let close = (open + step.round() * price_increment).max(price_increment * 1_000.0);
                let high = open.max(close) + rng.gen_range(0..4) as f64 * price_increment;
                let low = open.min(close) - rng.gen_range(0..4) as f64 * price_increment;
                bars.push(Bar::new(
                    midnight + chrono::Duration::minutes(slot * SYNTHETIC_BAR_MINUTES),
                    open,
                    high,
                    low,
                    close,
                    rng.gen_range(50..500) as f64,
                ));
                price = close;
            }
        }

        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    bars
}
