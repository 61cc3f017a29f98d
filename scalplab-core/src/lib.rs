//! ScalpLab Core: domain types, indicators, strategies, risk validation,
//! trade-lifecycle simulation and the live decision cycle.
//!
//! Data flow:
//! - bars → [`strategy::Strategy::compute_signals`] → annotated series
//! - annotated series → [`simulator::Simulator::run`] → completed trades
//! - each candidate entry may pass through [`risk::RiskValidator`]
//!
//! Everything here is synchronous and I/O-free; the broker is reached only
//! through [`live::MarketGateway`].

pub mod domain;
pub mod error;
pub mod indicators;
pub mod live;
pub mod risk;
pub mod simulator;
pub mod strategy;

pub use error::{ConfigError, DataError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: core types can cross threads, so independent
    /// simulations can run on a worker pool.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::SymbolSpec>();
        require_sync::<domain::SymbolSpec>();
        require_send::<domain::OpenPosition>();
        require_sync::<domain::OpenPosition>();
        require_send::<domain::CompletedTrade>();
        require_sync::<domain::CompletedTrade>();

        // Strategy types
        require_send::<strategy::AnnotatedSeries>();
        require_sync::<strategy::AnnotatedSeries>();
        require_send::<strategy::RibbonBreakout>();
        require_sync::<strategy::RibbonBreakout>();
        require_send::<strategy::RegimeMomentum>();
        require_sync::<strategy::RegimeMomentum>();
        require_send::<Box<dyn strategy::Strategy>>();
        require_sync::<Box<dyn strategy::Strategy>>();

        // Risk and simulation
        require_send::<risk::RiskValidator>();
        require_sync::<risk::RiskValidator>();
        require_send::<risk::ValidatedOrder>();
        require_sync::<risk::ValidatedOrder>();
        require_send::<simulator::Simulator>();
        require_sync::<simulator::Simulator>();
        require_send::<simulator::SimulationResult>();
        require_sync::<simulator::SimulationResult>();

        // Live
        require_send::<live::LiveTrader>();
        require_sync::<live::LiveTrader>();
        require_send::<live::CycleOutcome>();
        require_sync::<live::CycleOutcome>();
    }

    #[test]
    fn send_sync_check_compiles() {
        assert_send_sync();
    }
}
