//! Stop validation, target derivation and position sizing.
//!
//! # Sizing formula
//! ```text
//! risk          = balance * risk_percent / 100
//! loss_per_unit = stop_distance_increments * tick_value
//! volume        = floor(risk / loss_per_unit, volume_step), capped at volume_max
//! ```
//! Volumes below `volume_min` are rejected rather than rounded up, since that
//! would exceed the risk budget. Volumes above `volume_max` are capped, which
//! only ever risks less.

use tracing::{debug, warn};

use super::{CandidateEntry, Quote, Rejection, RiskConfig, ValidatedOrder};
use crate::domain::symbol::{decimals_of, round_to};
use crate::domain::{Direction, SymbolSpec};
use crate::error::ConfigError;

/// Tolerance for flooring `risk / loss_per_unit` onto the volume grid.
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct RiskValidator {
    spec: SymbolSpec,
    config: RiskConfig,
    volume_decimals: u32,
}

impl RiskValidator {
    pub fn new(spec: SymbolSpec, config: RiskConfig) -> Result<Self, ConfigError> {
        if !config.reward_risk_ratio.is_finite() || config.reward_risk_ratio <= 0.0 {
            return Err(ConfigError::NonPositiveRewardRisk(config.reward_risk_ratio));
        }
        if !(config.risk_percent > 0.0 && config.risk_percent <= 100.0) {
            return Err(ConfigError::RiskPercentOutOfRange(config.risk_percent));
        }
        Ok(Self {
            volume_decimals: decimals_of(spec.volume_step()),
            spec,
            config,
        })
    }

    pub fn spec(&self) -> &SymbolSpec {
        &self.spec
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Push the stop out to the broker minimum distance from the reference
    /// price when it is too close, non-finite or on the wrong side.
    /// Total and idempotent.
    pub fn validate_stop(&self, proposed_stop: f64, quote: &Quote, direction: Direction) -> f64 {
        let reference = quote.stop_reference(direction);
        let min = self.spec.min_stop_price_distance();
        let distance = direction.sign() * (reference - proposed_stop);
        if distance.is_nan() || distance < min {
            let adjusted = reference - direction.sign() * min;
            warn!(
                symbol = self.spec.symbol(),
                %direction,
                proposed = proposed_stop,
                adjusted,
                "stop too tight, moved to broker minimum"
            );
            adjusted
        } else {
            proposed_stop
        }
    }

    /// Target at `reward_risk_ratio` stop distances from `entry`, pushed out to
    /// the broker minimum when closer.
    pub fn derive_target(&self, entry: f64, final_stop: f64, direction: Direction) -> f64 {
        let sign = direction.sign();
        let min = self.spec.min_stop_price_distance();
        let offset = (entry - final_stop).abs() * self.config.reward_risk_ratio;
        entry + sign * offset.max(min)
    }

    /// Volume risking at most `risk_percent` of `balance` over the stop distance.
    pub fn size_position(
        &self,
        balance: f64,
        risk_percent: f64,
        stop_distance_increments: f64,
    ) -> Result<f64, Rejection> {
        let risk = balance * risk_percent / 100.0;
        let loss_per_unit = stop_distance_increments * self.spec.tick_value();
        if loss_per_unit.is_nan() || loss_per_unit <= 0.0 {
            return Err(Rejection::NonPositiveLossPerUnit(loss_per_unit));
        }

        let step = self.spec.volume_step();
        let raw = risk / loss_per_unit;
        let steps = if raw.is_finite() && raw > 0.0 {
            (raw / step + STEP_EPSILON).floor()
        } else {
            0.0
        };
        let volume = round_to(steps * step, self.volume_decimals);

        let min = self.spec.volume_min();
        if volume < min || volume <= 0.0 {
            debug!(symbol = self.spec.symbol(), volume, min, "volume below minimum");
            return Err(Rejection::BelowMinimumVolume { volume, min });
        }
        let max = self.spec.volume_max();
        if volume > max {
            warn!(symbol = self.spec.symbol(), volume, max, "volume capped at maximum");
            return Ok(max);
        }
        Ok(volume)
    }

    /// Full pipeline: entry from the quote, validated stop, derived target,
    /// prices rounded to the instrument's precision, then sizing.
    pub fn validate(
        &self,
        candidate: &CandidateEntry,
        balance: f64,
    ) -> Result<ValidatedOrder, Rejection> {
        let quote = candidate.quote;
        if !quote.is_valid() {
            return Err(Rejection::InvalidQuote {
                bid: quote.bid,
                ask: quote.ask,
            });
        }
        let direction = candidate.direction;
        let entry_price = quote.entry_price(direction);

        let stop = self.validate_stop(candidate.suggested_stop_price, &quote, direction);
        let final_stop_price = self.spec.round_price(stop);
        let final_target_price = self
            .spec
            .round_price(self.derive_target(entry_price, final_stop_price, direction));

        let stop_distance_increments = self
            .spec
            .to_increments((entry_price - final_stop_price).abs());
        let position_size =
            self.size_position(balance, self.config.risk_percent, stop_distance_increments)?;

        Ok(ValidatedOrder {
            direction,
            entry_price,
            final_stop_price,
            final_target_price,
            stop_distance_increments,
            position_size,
        })
    }
}
