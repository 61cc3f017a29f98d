//! Performance aggregation: pure functions over the completed-trade log.
//!
//! Every figure is in price increments (pips for five-digit FX). No
//! dependencies on the runner, data pipeline, or simulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use scalplab_core::domain::{CompletedTrade, ExitReason};

/// Aggregate statistics for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percentage, 0..=100.
    pub win_rate: f64,
    pub total_profit: f64,
    pub gross_profit: f64,
    /// Magnitude of the summed losses (non-negative).
    pub gross_loss: f64,
    /// `+inf` when nothing was lost; written as `null` in JSON.
    #[serde(with = "infinite_as_null")]
    pub profit_factor: f64,
    pub average_win: f64,
    /// Mean of the losing trades (non-positive).
    pub average_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_consecutive_losses: usize,
    /// Deepest peak-to-trough fall of cumulative profit (non-negative).
    pub max_drawdown: f64,
    pub exit_reasons: BTreeMap<String, usize>,
}

impl PerformanceSummary {
    pub fn compute(trades: &[CompletedTrade]) -> Self {
        let wins: Vec<f64> = trades
            .iter()
            .filter(|t| t.is_winner())
            .map(|t| t.profit_in_increments)
            .collect();
        let losses: Vec<f64> = trades
            .iter()
            .filter(|t| !t.is_winner())
            .map(|t| t.profit_in_increments)
            .collect();

        Self {
            total_trades: trades.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: win_rate(trades),
            total_profit: total_profit(trades),
            gross_profit: wins.iter().sum(),
            gross_loss: losses.iter().sum::<f64>().abs(),
            profit_factor: profit_factor(trades),
            average_win: mean_f64(&wins),
            average_loss: mean_f64(&losses),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
            max_consecutive_losses: max_consecutive_losses(trades),
            max_drawdown: max_drawdown(trades),
            exit_reasons: exit_reason_counts(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Net profit over all trades.
pub fn total_profit(trades: &[CompletedTrade]) -> f64 {
    trades.iter().map(|t| t.profit_in_increments).sum()
}

/// Win rate in percent. Zero-profit trades are losers.
pub fn win_rate(trades: &[CompletedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64 * 100.0
}

/// Profit factor: gross profit / |gross loss|.
///
/// `+inf` when the summed losses are zero, including a log of only
/// break-even trades. 0.0 for an empty log.
pub fn profit_factor(trades: &[CompletedTrade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.is_winner())
        .map(|t| t.profit_in_increments)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| !t.is_winner())
        .map(|t| t.profit_in_increments)
        .sum::<f64>()
        .abs();

    if gross_loss == 0.0 {
        return f64::INFINITY;
    }
    gross_profit / gross_loss
}

/// The optimizer's reduction of a run: `(profit_factor, trade_count)`.
pub fn optimizer_score(trades: &[CompletedTrade]) -> (f64, usize) {
    if trades.is_empty() {
        return (0.0, 0);
    }
    (profit_factor(trades), trades.len())
}

/// Maximum consecutive losing trades.
pub fn max_consecutive_losses(trades: &[CompletedTrade]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;

    for trade in trades {
        if trade.is_winner() {
            current = 0;
        } else {
            current += 1;
            max_streak = max_streak.max(current);
        }
    }
    max_streak
}

/// Deepest fall of cumulative profit from its running peak, starting at zero.
pub fn max_drawdown(trades: &[CompletedTrade]) -> f64 {
    let mut equity = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;

    for trade in trades {
        equity += trade.profit_in_increments;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}

pub fn exit_reason_counts(trades: &[CompletedTrade]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for reason in [ExitReason::StopLoss, ExitReason::TakeProfit, ExitReason::TimeStop] {
        counts.insert(reason.to_string(), 0);
    }
    for trade in trades {
        *counts.entry(trade.exit_reason.to_string()).or_insert(0) += 1;
    }
    counts
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// JSON has no infinity: write non-finite values as `null`, read `null` back as `+inf`.
pub(crate) mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
