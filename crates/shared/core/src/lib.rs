//! Hermes Core Domain
//!
//! Pure domain types for the Hermes connectivity stack.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod market;
pub mod values;

// Re-export commonly used types at crate root
pub use market::{
    BookLevel, BookUpdate, Channel, OrderAck, OrderRequest, OrderType, Side, TickerSnapshot,
    TimeInForce, Trade, VenueId,
};
pub use values::{Price, Quantity, Symbol, Timestamp};
