//! Signal generation: one pass over a bar series, one annotation per bar.
//!
//! Strategies are stateless across calls and portfolio-agnostic: they see bar
//! history and precomputed indicator values, never positions or balances.
//! The simulator depends only on the [`AnnotatedSeries`] they produce.

pub mod regime;
pub mod ribbon;

pub use regime::{RegimeMomentum, RegimeParams};
pub use ribbon::{RibbonBreakout, RibbonParams};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ensure_chronological, Bar, Direction, Signal};
use crate::error::DataError;
use crate::indicators::{Indicator, IndicatorValues};

/// A bar with the strategy's verdict attached.
///
/// `stop_price` and `target_price` are `Some` exactly when `signal` is an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedBar {
    pub bar: Bar,
    pub signal: Signal,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
}

impl AnnotatedBar {
    pub fn flat(bar: Bar) -> Self {
        Self {
            bar,
            signal: Signal::None,
            stop_price: None,
            target_price: None,
        }
    }

    pub fn with_entry(bar: Bar, entry: EntrySignal) -> Self {
        Self {
            bar,
            signal: entry.direction.into(),
            stop_price: Some(entry.stop_price),
            target_price: Some(entry.target_price),
        }
    }

    /// The entry carried by this bar, if any.
    pub fn entry(&self) -> Option<EntrySignal> {
        let direction = self.signal.direction()?;
        Some(EntrySignal {
            direction,
            stop_price: self.stop_price?,
            target_price: self.target_price?,
        })
    }
}

/// Output of a strategy run: annotated bars plus the indicator series behind them.
#[derive(Debug, Clone, Default)]
pub struct AnnotatedSeries {
    bars: Vec<AnnotatedBar>,
    indicators: IndicatorValues,
}

impl AnnotatedSeries {
    pub fn new(bars: Vec<AnnotatedBar>, indicators: IndicatorValues) -> Self {
        Self { bars, indicators }
    }

    pub fn bars(&self) -> &[AnnotatedBar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&AnnotatedBar> {
        self.bars.get(index)
    }

    pub fn indicators(&self) -> &IndicatorValues {
        &self.indicators
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Indices of bars carrying an entry signal.
    pub fn signal_indices(&self) -> Vec<usize> {
        self.bars
            .iter()
            .enumerate()
            .filter(|(_, b)| b.signal.is_entry())
            .map(|(i, _)| i)
            .collect()
    }
}

/// An entry proposed by a strategy on one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub direction: Direction,
    pub stop_price: f64,
    pub target_price: f64,
}

impl EntrySignal {
    /// Build an entry whose target sits `reward_risk` stop distances from `close`.
    pub fn from_stop(direction: Direction, close: f64, stop_price: f64, reward_risk: f64) -> Self {
        let distance = (close - stop_price).abs();
        Self {
            direction,
            stop_price,
            target_price: close + direction.sign() * distance * reward_risk,
        }
    }

    /// Finite, positive levels and a non-zero stop distance from `close`.
    pub fn is_usable(&self, close: f64) -> bool {
        self.stop_price.is_finite()
            && self.target_price.is_finite()
            && self.stop_price > 0.0
            && self.target_price > 0.0
            && (close - self.stop_price).abs() > 0.0
    }
}

/// Trait for signal strategies.
///
/// # Causality
/// `evaluate` must only use `bars[0..=bar_index]` and indicator values up to
/// `bar_index`. The default `compute_signals` never lets a strategy see the
/// future, but the indicators themselves must also be causal.
pub trait Strategy: Send + Sync {
    /// Human-readable name (e.g., "ribbon_breakout").
    fn name(&self) -> &str;

    /// Bars before this index never carry a signal.
    fn warmup_bars(&self) -> usize;

    /// Indicators to precompute before evaluation.
    fn indicators(&self) -> Vec<Box<dyn Indicator>>;

    /// Evaluate one bar. Called only for `bar_index >= warmup_bars()`.
    fn evaluate(
        &self,
        bars: &[Bar],
        bar_index: usize,
        indicators: &IndicatorValues,
    ) -> Option<EntrySignal>;

    /// Whether an open position in `direction` should be closed at `index`
    /// ahead of its stop or target. Strategies without an exit rule never do.
    fn exit_signal(&self, series: &AnnotatedSeries, index: usize, direction: Direction) -> bool {
        let _ = (series, index, direction);
        false
    }

    /// Annotate a whole series. Fails only on non-increasing timestamps.
    fn compute_signals(&self, bars: &[Bar]) -> Result<AnnotatedSeries, DataError> {
        ensure_chronological(bars)?;

        let mut indicators = IndicatorValues::new();
        for indicator in self.indicators() {
            indicators.compute_into(indicator.as_ref(), bars);
        }

        let warmup = self.warmup_bars();
        let annotated = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| {
                if i < warmup {
                    return AnnotatedBar::flat(bar.clone());
                }
                match self.evaluate(bars, i, &indicators) {
                    Some(entry) if entry.is_usable(bar.close) => {
                        AnnotatedBar::with_entry(bar.clone(), entry)
                    }
                    Some(entry) => {
                        debug!(
                            strategy = self.name(),
                            bar = i,
                            stop = entry.stop_price,
                            target = entry.target_price,
                            "signal dropped: unusable stop/target"
                        );
                        AnnotatedBar::flat(bar.clone())
                    }
                    None => AnnotatedBar::flat(bar.clone()),
                }
            })
            .collect();

        Ok(AnnotatedSeries::new(annotated, indicators))
    }
}

/// `prev ≤ level < current`
pub(crate) fn crossed_up(prev: f64, current: f64, level: f64) -> bool {
    prev <= level && current > level
}

/// `prev ≥ level > current`
pub(crate) fn crossed_down(prev: f64, current: f64, level: f64) -> bool {
    prev >= level && current < level
}
