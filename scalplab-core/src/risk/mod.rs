//! Risk & stop validation: turns a strategy's suggested stop into a
//! broker-compliant stop/target pair and a risk-bounded position size.
//!
//! Stateless: one call per candidate entry. Portfolio-aware only through the
//! account balance passed in by the caller.

pub mod validator;

pub use validator::RiskValidator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Direction;

/// Capital-at-risk settings for one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub reward_risk_ratio: f64,
    /// Percent of balance risked per trade, in (0, 100].
    pub risk_percent: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            reward_risk_ratio: 1.5,
            risk_percent: 1.0,
        }
    }
}

/// Best bid and ask at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }

    /// Reference price for stop distances: bid for Long, ask for Short.
    pub fn stop_reference(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.bid,
            Direction::Short => self.ask,
        }
    }

    /// Fill price for a market entry: ask for Long, bid for Short.
    pub fn entry_price(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.ask,
            Direction::Short => self.bid,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.bid.is_finite() && self.ask.is_finite() && self.bid > 0.0 && self.ask >= self.bid
    }
}

/// A strategy's proposed entry, priced against the live or simulated quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub symbol: String,
    pub direction: Direction,
    pub quote: Quote,
    pub suggested_stop_price: f64,
}

/// Order parameters ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidatedOrder {
    pub direction: Direction,
    pub entry_price: f64,
    pub final_stop_price: f64,
    pub final_target_price: f64,
    pub stop_distance_increments: f64,
    pub position_size: f64,
}

/// Why a candidate entry must be skipped.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("loss per unit is {0}, cannot size a position")]
    NonPositiveLossPerUnit(f64),

    #[error("sized volume {volume} is below the instrument minimum {min}")]
    BelowMinimumVolume { volume: f64, min: f64 },

    #[error("quote is unusable: bid {bid}, ask {ask}")]
    InvalidQuote { bid: f64, ask: f64 },
}
