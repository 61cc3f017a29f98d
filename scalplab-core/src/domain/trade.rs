//! Directions, signals, positions and completed trades.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for Long, -1 for Short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Per-bar entry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    #[default]
    None,
}

impl Signal {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::None => None,
        }
    }

    pub fn is_entry(self) -> bool {
        !matches!(self, Signal::None)
    }
}

impl From<Direction> for Signal {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::Long,
            Direction::Short => Signal::Short,
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeStop,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::TimeStop => write!(f, "time_stop"),
        }
    }
}

/// A position the simulator currently holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub entry_bar_index: usize,
    /// Volume from the risk validator, when one was consulted.
    pub position_size: Option<f64>,
}

impl OpenPosition {
    /// Close the position at `exit_price`, measuring profit in price increments.
    pub fn close(
        self,
        exit_time: DateTime<Utc>,
        exit_price: f64,
        exit_bar_index: usize,
        exit_reason: ExitReason,
        price_increment: f64,
    ) -> CompletedTrade {
        let profit = self.direction.sign() * (exit_price - self.entry_price) / price_increment;
        CompletedTrade {
            direction: self.direction,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            exit_time,
            exit_price,
            exit_reason,
            profit_in_increments: profit,
            entry_bar_index: self.entry_bar_index,
            exit_bar_index,
            stop_price: self.stop_price,
            target_price: self.target_price,
            position_size: self.position_size,
        }
    }
}

/// A closed round trip. Append-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    // ── Entry ──
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Result ──
    pub profit_in_increments: f64,

    // ── Traceability ──
    pub entry_bar_index: usize,
    pub exit_bar_index: usize,
    pub stop_price: f64,
    pub target_price: f64,
    pub position_size: Option<f64>,
}

impl CompletedTrade {
    /// Zero-profit trades count as losers.
    pub fn is_winner(&self) -> bool {
        self.profit_in_increments > 0.0
    }

    pub fn bars_held(&self) -> usize {
        self.exit_bar_index.saturating_sub(self.entry_bar_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn position(direction: Direction) -> OpenPosition {
        OpenPosition {
            direction,
            entry_time: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            entry_price: 1.2000,
            stop_price: 1.1980,
            target_price: 1.2030,
            entry_bar_index: 60,
            position_size: None,
        }
    }

    #[test]
    fn long_profit_in_increments() {
        let exit_time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let trade =
            position(Direction::Long).close(exit_time, 1.2030, 66, ExitReason::TakeProfit, 0.0001);
        assert!((trade.profit_in_increments - 30.0).abs() < 1e-6);
        assert!(trade.is_winner());
        assert_eq!(trade.bars_held(), 6);
    }

    #[test]
    fn short_profit_is_negated() {
        let exit_time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let trade =
            position(Direction::Short).close(exit_time, 1.2030, 62, ExitReason::StopLoss, 0.0001);
        assert!((trade.profit_in_increments + 30.0).abs() < 1e-6);
        assert!(!trade.is_winner());
    }

    #[test]
    fn breakeven_is_not_a_winner() {
        let exit_time = Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();
        let trade =
            position(Direction::Long).close(exit_time, 1.2000, 61, ExitReason::TimeStop, 0.0001);
        assert!(!trade.is_winner());
    }

    #[test]
    fn signal_direction_mapping() {
        assert_eq!(Signal::Long.direction(), Some(Direction::Long));
        assert_eq!(Signal::Short.direction(), Some(Direction::Short));
        assert_eq!(Signal::None.direction(), None);
        assert_eq!(Signal::from(Direction::Short), Signal::Short);
        assert_eq!(Signal::default(), Signal::None);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }
}
