//! Domain types for ScalpLab

pub mod bar;
pub mod symbol;
pub mod trade;

pub use bar::{check_open_times, ensure_chronological, first_index_at_or_after, Bar};
pub use symbol::SymbolSpec;
pub use trade::{CompletedTrade, Direction, ExitReason, OpenPosition, Signal};
