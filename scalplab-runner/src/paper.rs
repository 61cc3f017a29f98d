//! Paper trading: the live decision cycle replayed over recorded bars.
//!
//! [`PaperGateway`] implements [`MarketGateway`] on a bar history with a
//! cursor: bars before the cursor are visible, the last visible bar is the
//! one still forming. Quotes come from the forming bar's open plus a fixed
//! spread. Resting stops and targets are checked when a bar completes, with
//! the same worst-case policy as the simulator.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scalplab_core::domain::{Bar, Direction, ExitReason, OpenPosition, SymbolSpec};
use scalplab_core::live::{
    CycleError, CycleOutcome, GatewayError, LiveTrader, MarketGateway, OrderRequest, OrderTicket,
};
use scalplab_core::risk::Quote;
use scalplab_core::simulator::check_exit;

/// Why a paper position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Level(ExitReason),
    /// Closed at market by the strategy's exit rule.
    ExitSignal,
}

/// A closed paper position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperFill {
    pub ticket: OrderTicket,
    pub direction: Direction,
    pub volume: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit_in_increments: f64,
    pub reason: CloseReason,
}

#[derive(Debug, Clone)]
struct PaperPosition {
    ticket: OrderTicket,
    volume: f64,
    inner: OpenPosition,
}

pub struct PaperGateway {
    spec: SymbolSpec,
    bars: Vec<Bar>,
    visible: usize,
    spread: f64,
    balance: f64,
    position: Option<PaperPosition>,
    next_ticket: u64,
    fills: Vec<PaperFill>,
}

impl PaperGateway {
    /// `visible` bars are shown at the start; clamped to `1..=bars.len()`,
    /// or to zero for an empty history.
    pub fn new(
        spec: SymbolSpec,
        bars: Vec<Bar>,
        visible: usize,
        spread_increments: f64,
        balance: f64,
    ) -> Self {
        let visible = visible.clamp(bars.len().min(1), bars.len());
        let spread = spread_increments * spec.price_increment();
        Self {
            spec,
            bars,
            visible,
            spread,
            balance,
            position: None,
            next_ticket: 1,
            fills: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn fills(&self) -> &[PaperFill] {
        &self.fills
    }

    pub fn is_exhausted(&self) -> bool {
        self.visible >= self.bars.len()
    }

    /// Complete the forming bar and reveal the next one.
    ///
    /// Returns the fill if the completed bar reached the resting stop or target.
    /// Returns `None` without moving when no bars remain.
    pub fn advance(&mut self) -> Option<PaperFill> {
        if self.is_exhausted() {
            return None;
        }
        let index = self.visible - 1;
        self.visible += 1;

        let bar = &self.bars[index];
        let position = self.position.as_ref()?;
        // No time stop in live trading.
        let (price, reason) = check_exit(&position.inner, bar, index, usize::MAX)?;
        self.close_at(price, CloseReason::Level(reason))
    }

    fn forming_bar(&self) -> Option<&Bar> {
        self.bars.get(self.visible.checked_sub(1)?)
    }

    fn close_at(&mut self, exit_price: f64, reason: CloseReason) -> Option<PaperFill> {
        let position = self.position.take()?;
        let pos = position.inner;
        let profit =
            pos.direction.sign() * (exit_price - pos.entry_price) / self.spec.price_increment();
        self.balance += profit * self.spec.tick_value() * position.volume;

        let fill = PaperFill {
            ticket: position.ticket,
            direction: pos.direction,
            volume: position.volume,
            entry_price: pos.entry_price,
            exit_price,
            profit_in_increments: profit,
            reason,
        };
        info!(
            ticket = fill.ticket.0,
            profit = fill.profit_in_increments,
            balance = self.balance,
            "paper position closed"
        );
        self.fills.push(fill.clone());
        Some(fill)
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), GatewayError> {
        if symbol == self.spec.symbol() {
            Ok(())
        } else {
            Err(GatewayError::NoData {
                symbol: symbol.to_string(),
                reason: "not traded by this paper account".into(),
            })
        }
    }
}

impl MarketGateway for PaperGateway {
    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, GatewayError> {
        self.check_symbol(symbol)?;
        Ok(self.spec.clone())
    }

    fn recent_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, GatewayError> {
        self.check_symbol(symbol)?;
        let end = self.visible.min(self.bars.len());
        let start = end.saturating_sub(count);
        Ok(self.bars[start..end].to_vec())
    }

    fn quote(&self, symbol: &str) -> Result<Quote, GatewayError> {
        self.check_symbol(symbol)?;
        let bar = self.forming_bar().ok_or_else(|| GatewayError::NoData {
            symbol: symbol.to_string(),
            reason: "no bars loaded".into(),
        })?;
        Ok(Quote::new(bar.open, bar.open + self.spread))
    }

    fn account_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.balance)
    }

    fn open_position(&self, symbol: &str) -> Result<Option<Direction>, GatewayError> {
        self.check_symbol(symbol)?;
        Ok(self.position.as_ref().map(|p| p.inner.direction))
    }

    fn place_order(&mut self, order: &OrderRequest) -> Result<OrderTicket, GatewayError> {
        self.check_symbol(&order.symbol)?;
        if self.position.is_some() {
            return Err(GatewayError::OrderRejected(
                "a position is already open".into(),
            ));
        }
        let quote = self.quote(&order.symbol)?;
        let (entry_time, entry_bar_index) = self
            .forming_bar()
            .map(|b| (b.open_time, self.visible - 1))
            .ok_or_else(|| GatewayError::Unavailable("no bars loaded".into()))?;

        let ticket = OrderTicket(self.next_ticket);
        self.next_ticket += 1;
        self.position = Some(PaperPosition {
            ticket,
            volume: order.volume,
            inner: OpenPosition {
                direction: order.direction,
                entry_time,
                entry_price: quote.entry_price(order.direction),
                stop_price: order.stop_price,
                target_price: order.target_price,
                entry_bar_index,
                position_size: Some(order.volume),
            },
        });
        debug!(ticket = ticket.0, "paper order filled");
        Ok(ticket)
    }

    fn close_position(&mut self, symbol: &str) -> Result<(), GatewayError> {
        let quote = self.quote(symbol)?;
        let direction = self
            .position
            .as_ref()
            .map(|p| p.inner.direction)
            .ok_or_else(|| GatewayError::OrderRejected("no open position".into()))?;
        // A long is sold at the bid, a short bought back at the ask.
        let price = quote.entry_price(direction.opposite());
        self.close_at(price, CloseReason::ExitSignal);
        Ok(())
    }
}

/// Totals of one paper session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperReport {
    pub cycles: usize,
    pub orders: usize,
    pub rejections: usize,
    pub exit_signals: usize,
    pub fills: Vec<PaperFill>,
    pub starting_balance: f64,
    pub final_balance: f64,
    pub position_open_at_end: bool,
}

/// Run one decision cycle per bar until the history is exhausted.
pub fn run_paper(
    trader: &LiveTrader,
    gateway: &mut PaperGateway,
) -> Result<PaperReport, CycleError> {
    let mut report = PaperReport {
        starting_balance: gateway.balance(),
        ..PaperReport::default()
    };

    loop {
        match trader.run_cycle(gateway)? {
            CycleOutcome::OrderPlaced { .. } => report.orders += 1,
            CycleOutcome::Rejected(_) => report.rejections += 1,
            CycleOutcome::ClosedOnExitSignal(_) => report.exit_signals += 1,
            CycleOutcome::Holding(_)
            | CycleOutcome::NoSignal
            | CycleOutcome::InsufficientData { .. } => {}
        }
        report.cycles += 1;

        if gateway.is_exhausted() {
            break;
        }
        gateway.advance();
    }

    report.fills = gateway.fills().to_vec();
    report.final_balance = gateway.balance();
    report.position_open_at_end = gateway.position.is_some();
    info!(
        cycles = report.cycles,
        orders = report.orders,
        fills = report.fills.len(),
        final_balance = report.final_balance,
        "paper session complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use scalplab_core::risk::{RiskConfig, RiskValidator};
    use scalplab_core::strategy::{RibbonBreakout, RibbonParams};

    const INCREMENT: f64 = 0.00001;

    fn spec() -> SymbolSpec {
        SymbolSpec::new("EURUSD", INCREMENT, 10, 0.01, 0.01, 100.0, 1.0).unwrap()
    }

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap() + Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            100.0,
        )
    }

    fn flat_bars(n: usize) -> Vec<Bar> {
        (0..n).map(|i| bar(i, 1.1, 1.1002, 1.0998, 1.1)).collect()
    }

    fn long_order(stop: f64, target: f64) -> OrderRequest {
        OrderRequest {
            symbol: "EURUSD".into(),
            direction: Direction::Long,
            volume: 1.0,
            expected_price: 1.1,
            stop_price: stop,
            target_price: target,
        }
    }

    #[test]
    fn only_visible_bars_are_served() {
        let gw = PaperGateway::new(spec(), flat_bars(10), 4, 0.0, 1_000.0);
        assert_eq!(gw.recent_bars("EURUSD", 100).unwrap().len(), 4);
        assert_eq!(gw.recent_bars("EURUSD", 2).unwrap().len(), 2);
        assert!(gw.recent_bars("GBPUSD", 2).is_err());
    }

    #[test]
    fn quote_is_forming_bar_open_plus_spread() {
        let mut bars = flat_bars(5);
        bars[2] = bar(2, 1.2, 1.2001, 1.1999, 1.2);
        let gw = PaperGateway::new(spec(), bars, 3, 10.0, 1_000.0);
        let q = gw.quote("EURUSD").unwrap();
        assert_eq!(q.bid, 1.2);
        assert!((q.ask - 1.2001).abs() < 1e-12);
    }

    #[test]
    fn resting_target_fills_on_completed_bar() {
        let mut bars = flat_bars(4);
        bars[2] = bar(2, 1.1, 1.1030, 1.0999, 1.1020);
        let mut gw = PaperGateway::new(spec(), bars, 2, 0.0, 1_000.0);

        gw.place_order(&long_order(1.0990, 1.1020)).unwrap();
        assert!(gw.place_order(&long_order(1.0990, 1.1020)).is_err());
        // bar 1 completes: nothing hit
        assert!(gw.advance().is_none());
        let fill = gw.advance().unwrap();
        assert_eq!(fill.reason, CloseReason::Level(ExitReason::TakeProfit));
        assert!((fill.profit_in_increments - 200.0).abs() < 1e-6);
        assert!((gw.balance() - 1_200.0).abs() < 1e-6);
        assert_eq!(gw.open_position("EURUSD").unwrap(), None);
    }

    #[test]
    fn stop_wins_when_both_levels_hit() {
        let mut bars = flat_bars(3);
        bars[1] = bar(1, 1.1, 1.1050, 1.0950, 1.1);
        let mut gw = PaperGateway::new(spec(), bars, 2, 0.0, 1_000.0);
        gw.place_order(&long_order(1.0990, 1.1020)).unwrap();
        let fill = gw.advance().unwrap();
        assert_eq!(fill.reason, CloseReason::Level(ExitReason::StopLoss));
        assert!((fill.profit_in_increments + 100.0).abs() < 1e-6);
    }

    #[test]
    fn close_position_sells_at_bid() {
        let mut gw = PaperGateway::new(spec(), flat_bars(3), 2, 5.0, 1_000.0);
        gw.place_order(&long_order(1.0990, 1.1020)).unwrap();
        gw.close_position("EURUSD").unwrap();
        let fill = &gw.fills()[0];
        assert_eq!(fill.reason, CloseReason::ExitSignal);
        // bought at the ask, sold at the bid: the spread is lost
        assert!((fill.profit_in_increments + 5.0).abs() < 1e-6);
        assert!(gw.close_position("EURUSD").is_err());
    }

    #[test]
    fn advance_stops_at_end() {
        let mut gw = PaperGateway::new(spec(), flat_bars(3), 1, 0.0, 1_000.0);
        gw.advance();
        gw.advance();
        assert!(gw.is_exhausted());
        assert!(gw.advance().is_none());
        assert_eq!(gw.recent_bars("EURUSD", 10).unwrap().len(), 3);
    }

    #[test]
    fn paper_session_trades_a_breakout() {
        let mut bars: Vec<Bar> = (0..150).map(|i| bar(i, 1.1, 1.1002, 1.0998, 1.1)).collect();
        bars.push(bar(150, 1.1, 1.1012, 1.0998, 1.1010));
        for i in 151..260 {
            bars.push(bar(i, 1.1010, 1.1012, 1.1008, 1.1010));
        }

        let strategy = RibbonBreakout::new(RibbonParams::default(), INCREMENT).unwrap();
        let validator = RiskValidator::new(spec(), RiskConfig::default()).unwrap();
        let trader = LiveTrader::new(Box::new(strategy), validator);
        let mut gw = PaperGateway::new(spec(), bars, 1, 0.0, 10_000.0);

        let report = run_paper(&trader, &mut gw).unwrap();
        assert_eq!(report.cycles, 260);
        assert_eq!(report.orders, 1);
        assert_eq!(report.rejections, 0);
        assert_eq!(report.starting_balance, 10_000.0);
        assert!(report.fills.len() + usize::from(report.position_open_at_end) == 1);
    }

    #[test]
    fn empty_history_ends_session_without_trading() {
        let mut gw = PaperGateway::new(spec(), Vec::new(), 0, 2.0, 10_000.0);
        assert!(gw.is_exhausted());
        assert!(gw.recent_bars("EURUSD", 60).unwrap().is_empty());
        assert!(matches!(
            gw.quote("EURUSD"),
            Err(GatewayError::NoData { .. })
        ));
        assert!(gw.advance().is_none());

        let strategy = RibbonBreakout::new(RibbonParams::default(), INCREMENT).unwrap();
        let validator = RiskValidator::new(spec(), RiskConfig::default()).unwrap();
        let trader = LiveTrader::new(Box::new(strategy), validator);
        let report = run_paper(&trader, &mut gw).unwrap();
        assert_eq!(report.cycles, 1);
        assert_eq!(report.orders, 0);
        assert!(report.fills.is_empty());
        assert!(!report.position_open_at_end);
        assert_eq!(report.final_balance, 10_000.0);
    }
}
