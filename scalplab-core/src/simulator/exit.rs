//! Exit rule for an open position against one bar.
//!
//! Worst-case path policy: when a bar reaches both the stop and the target,
//! the stop is assumed to have traded first. Exits fill exactly at the level,
//! even when the bar gapped through it.

use crate::domain::{Bar, Direction, ExitReason, OpenPosition};

/// Exit price and reason for `position` on bar `index`, if it closes there.
pub fn check_exit(
    position: &OpenPosition,
    bar: &Bar,
    index: usize,
    max_trade_duration: usize,
) -> Option<(f64, ExitReason)> {
    let (stop_hit, target_hit) = match position.direction {
        Direction::Long => (
            bar.low <= position.stop_price,
            bar.high >= position.target_price,
        ),
        Direction::Short => (
            bar.high >= position.stop_price,
            bar.low <= position.target_price,
        ),
    };

    if stop_hit {
        Some((position.stop_price, ExitReason::StopLoss))
    } else if target_hit {
        Some((position.target_price, ExitReason::TakeProfit))
    } else if index.saturating_sub(position.entry_bar_index) >= max_trade_duration {
        Some((bar.close, ExitReason::TimeStop))
    } else {
        None
    }
}
