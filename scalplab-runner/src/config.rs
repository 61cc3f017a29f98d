//! TOML settings and the resolved per-run configuration.
//!
//! ```toml
//! [backtest]
//! symbol = "EURUSD"
//! start = "2024-01-02"
//! end = "2024-03-29"
//! data = "data/EURUSD_M5.csv"
//! balance = 10000.0
//!
//! [instruments.EURUSD]
//! price_increment = 0.00001
//! min_stop_distance = 10
//!
//! [strategies.EURUSD]
//! risk_percent = 1.0
//! max_trade_duration = 10
//!
//! [strategies.EURUSD.strategy]
//! type = "ribbon_breakout"
//! consolidation_threshold_pips = 3.5
//! ```
//!
//! Omitted strategy parameters take the strategy defaults. Values are
//! validated when components are built from them, never silently clamped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scalplab_core::domain::SymbolSpec;
use scalplab_core::risk::{RiskConfig, RiskValidator};
use scalplab_core::simulator::SimulationConfig;
use scalplab_core::strategy::{
    RegimeMomentum, RegimeParams, RibbonBreakout, RibbonParams, Strategy,
};
use scalplab_core::ConfigError;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no [instruments.{0}] section")]
    UnknownInstrument(String),

    #[error("no [strategies.{0}] section")]
    MissingStrategy(String),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),
}

/// Whole settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentSettings>,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategySettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSection {
    pub symbol: String,
    /// First simulated day; earlier bars only warm the indicators.
    pub start: NaiveDate,
    /// Last simulated day, inclusive. Open-ended when absent.
    #[serde(default)]
    pub end: Option<NaiveDate>,
    /// CSV bar file. Relative paths resolve against the settings file.
    #[serde(default)]
    pub data: Option<PathBuf>,
    /// Account balance for risk-based sizing. Without it entries are unsized.
    #[serde(default)]
    pub balance: Option<f64>,
}

/// Broker constants for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSettings {
    pub price_increment: f64,
    #[serde(default)]
    pub min_stop_distance: u32,
    #[serde(default = "default_volume_step")]
    pub volume_step: f64,
    #[serde(default = "default_volume_step")]
    pub volume_min: f64,
    #[serde(default = "default_volume_max")]
    pub volume_max: f64,
    #[serde(default = "default_tick_value")]
    pub tick_value: f64,
}

impl InstrumentSettings {
    pub fn to_spec(&self, symbol: &str) -> Result<SymbolSpec, ConfigError> {
        SymbolSpec::new(
            symbol,
            self.price_increment,
            self.min_stop_distance,
            self.volume_step,
            self.volume_min,
            self.volume_max,
            self.tick_value,
        )
    }
}

/// Strategy variant with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    RibbonBreakout(RibbonParams),
    RegimeMomentum(RegimeParams),
}

impl StrategyKind {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::RibbonBreakout(_) => "ribbon_breakout",
            StrategyKind::RegimeMomentum(_) => "regime_momentum",
        }
    }

    pub fn reward_risk_ratio(&self) -> f64 {
        match self {
            StrategyKind::RibbonBreakout(p) => p.reward_risk_ratio,
            StrategyKind::RegimeMomentum(p) => p.reward_risk_ratio,
        }
    }

    pub fn build(&self, price_increment: f64) -> Result<Box<dyn Strategy>, ConfigError> {
        Ok(match self {
            StrategyKind::RibbonBreakout(p) => {
                Box::new(RibbonBreakout::new(p.clone(), price_increment)?)
            }
            StrategyKind::RegimeMomentum(p) => {
                Box::new(RegimeMomentum::new(p.clone(), price_increment)?)
            }
        })
    }
}

/// Per-symbol strategy, risk and lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    #[serde(default = "default_risk_percent")]
    pub risk_percent: f64,
    #[serde(default = "default_max_trade_duration")]
    pub max_trade_duration: usize,
    /// Simulated spread in price increments.
    #[serde(default)]
    pub spread_increments: f64,
    pub strategy: StrategyKind,
}

impl StrategySettings {
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            reward_risk_ratio: self.strategy.reward_risk_ratio(),
            risk_percent: self.risk_percent,
        }
    }
}

fn default_volume_step() -> f64 {
    0.01
}

fn default_volume_max() -> f64 {
    100.0
}

fn default_tick_value() -> f64 {
    1.0
}

fn default_risk_percent() -> f64 {
    1.0
}

fn default_max_trade_duration() -> usize {
    10
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml(&content)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(data) = settings.backtest.data.as_mut() {
            if data.is_relative() {
                *data = dir.join(&*data);
            }
        }
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Run configuration for the `[backtest]` symbol.
    pub fn run_config(&self) -> Result<RunConfig, SettingsError> {
        self.run_config_for(&self.backtest.symbol)
    }

    /// Run configuration for `symbol`, with every component validated.
    pub fn run_config_for(&self, symbol: &str) -> Result<RunConfig, SettingsError> {
        let instrument = self
            .instruments
            .get(symbol)
            .ok_or_else(|| SettingsError::UnknownInstrument(symbol.to_string()))?;
        let strategy = self
            .strategies
            .get(symbol)
            .ok_or_else(|| SettingsError::MissingStrategy(symbol.to_string()))?;

        let config = RunConfig {
            symbol: symbol.to_string(),
            start: self.backtest.start,
            end: self.backtest.end,
            instrument: instrument.clone(),
            strategy: strategy.clone(),
            balance: self.backtest.balance,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Everything needed to reproduce one backtest, minus the bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    pub instrument: InstrumentSettings,
    pub strategy: StrategySettings,
    pub balance: Option<f64>,
}

impl RunConfig {
    /// BLAKE3 of the canonical JSON form. Equal configs share a run id.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn symbol_spec(&self) -> Result<SymbolSpec, ConfigError> {
        self.instrument.to_spec(&self.symbol)
    }

    pub fn build_strategy(&self) -> Result<Box<dyn Strategy>, ConfigError> {
        self.strategy.strategy.build(self.instrument.price_increment)
    }

    pub fn risk_validator(&self) -> Result<RiskValidator, ConfigError> {
        RiskValidator::new(self.symbol_spec()?, self.strategy.risk_config())
    }

    pub fn simulation_config(&self, start_index: usize) -> Result<SimulationConfig, ConfigError> {
        SimulationConfig::new(
            start_index,
            self.strategy.max_trade_duration,
            self.strategy.spread_increments,
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build_strategy()?;
        self.risk_validator()?;
        self.simulation_config(0)?;
        if let Some(balance) = self.balance {
            if !balance.is_finite() || balance <= 0.0 {
                return Err(ConfigError::NonPositive {
                    name: "balance",
                    value: balance,
                });
            }
        }
        Ok(())
    }
}
