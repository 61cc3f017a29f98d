//! Live decision cycle against a broker gateway.
//!
//! One synchronous cycle per symbol: hold if a position is open, otherwise
//! fetch recent bars, annotate them, read the last closed bar and, on a
//! signal, validate and submit an order. Every path ends in a
//! [`CycleOutcome`]; gateway failures are errors of the cycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Bar, Direction, SymbolSpec};
use crate::error::DataError;
use crate::risk::{CandidateEntry, Quote, Rejection, RiskValidator};
use crate::strategy::Strategy;

/// Bars fetched on top of the strategy warmup.
const FETCH_MARGIN: usize = 5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("no data for {symbol}: {reason}")]
    NoData { symbol: String, reason: String },

    #[error("order rejected by broker: {0}")]
    OrderRejected(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Market order with protective levels, as sent to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub volume: f64,
    /// Quote-side price the order is expected to fill at.
    pub expected_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
}

/// Broker-side identifier of an accepted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTicket(pub u64);

/// Everything the live engine needs from a broker connection.
pub trait MarketGateway {
    fn symbol_spec(&self, symbol: &str) -> Result<SymbolSpec, GatewayError>;

    /// The most recent `count` bars, oldest first. The last bar may still be forming.
    fn recent_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, GatewayError>;

    fn quote(&self, symbol: &str) -> Result<Quote, GatewayError>;

    fn account_balance(&self) -> Result<f64, GatewayError>;

    /// Direction of the position this engine holds in `symbol`, if any.
    fn open_position(&self, symbol: &str) -> Result<Option<Direction>, GatewayError>;

    fn has_open_position(&self, symbol: &str) -> Result<bool, GatewayError> {
        Ok(self.open_position(symbol)?.is_some())
    }

    fn place_order(&mut self, order: &OrderRequest) -> Result<OrderTicket, GatewayError>;

    fn close_position(&mut self, symbol: &str) -> Result<(), GatewayError>;
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A position is open; its resting stop and target manage the exit.
    Holding(Direction),
    /// The strategy's exit rule fired and the position was closed.
    ClosedOnExitSignal(Direction),
    InsufficientData { have: usize, need: usize },
    NoSignal,
    Rejected(Rejection),
    OrderPlaced {
        ticket: OrderTicket,
        request: OrderRequest,
    },
}

pub struct LiveTrader {
    strategy: Box<dyn Strategy>,
    validator: RiskValidator,
}

impl LiveTrader {
    pub fn new(strategy: Box<dyn Strategy>, validator: RiskValidator) -> Self {
        Self {
            strategy,
            validator,
        }
    }

    pub fn symbol(&self) -> &str {
        self.validator.spec().symbol()
    }

    /// Bars requested from the gateway each cycle.
    pub fn fetch_count(&self) -> usize {
        self.strategy.warmup_bars() + FETCH_MARGIN
    }

    pub fn run_cycle<G: MarketGateway>(&self, gateway: &mut G) -> Result<CycleOutcome, CycleError> {
        let symbol = self.symbol().to_string();

        let held = gateway.open_position(&symbol)?;
        let bars = gateway.recent_bars(&symbol, self.fetch_count())?;
        let need = self.strategy.warmup_bars() + 2;
        if bars.len() < need {
            if let Some(direction) = held {
                return Ok(CycleOutcome::Holding(direction));
            }
            warn!(%symbol, have = bars.len(), need, "not enough bars for a decision");
            return Ok(CycleOutcome::InsufficientData {
                have: bars.len(),
                need,
            });
        }

        let series = self.strategy.compute_signals(&bars)?;
        // The last bar may still be forming; decide on the one before it.
        let last_closed = bars.len() - 2;

        if let Some(direction) = held {
            if self.strategy.exit_signal(&series, last_closed, direction) {
                gateway.close_position(&symbol)?;
                info!(%symbol, %direction, "position closed on exit signal");
                return Ok(CycleOutcome::ClosedOnExitSignal(direction));
            }
            info!(%symbol, %direction, "holding position, exit managed by stop/target");
            return Ok(CycleOutcome::Holding(direction));
        }

        let Some(entry) = series.get(last_closed).and_then(|b| b.entry()) else {
            return Ok(CycleOutcome::NoSignal);
        };
        info!(%symbol, direction = %entry.direction, strategy = self.strategy.name(), "signal");

        let candidate = CandidateEntry {
            symbol: symbol.clone(),
            direction: entry.direction,
            quote: gateway.quote(&symbol)?,
            suggested_stop_price: entry.stop_price,
        };
        let balance = gateway.account_balance()?;
        let order = match self.validator.validate(&candidate, balance) {
            Ok(order) => order,
            Err(rejection) => {
                warn!(%symbol, %rejection, "entry rejected");
                return Ok(CycleOutcome::Rejected(rejection));
            }
        };

        let request = OrderRequest {
            symbol,
            direction: order.direction,
            volume: order.position_size,
            expected_price: order.entry_price,
            stop_price: order.final_stop_price,
            target_price: order.final_target_price,
        };
        let ticket = gateway.place_order(&request)?;
        info!(
            symbol = %request.symbol,
            direction = %request.direction,
            volume = request.volume,
            stop = request.stop_price,
            target = request.target_price,
            ticket = ticket.0,
            "order placed"
        );
        Ok(CycleOutcome::OrderPlaced { ticket, request })
    }
}
