//! Hermes exchange facade.
//!
//! Thin, venue-agnostic client over the connectivity core: REST
//! operations (`fetch_*`, `create_order`, `cancel_order`), streaming
//! operations (`watch_*`/`unwatch_*`) and synchronous cache reads.
//! Venue specifics enter through the `RestEndpoints` and `WireProtocol`
//! seams; venue tunables come from the JSON registry.

pub mod client;
pub mod config;
pub mod endpoints;

pub use client::{ExchangeBuilder, ExchangeClient};
pub use config::{ConfigError, VenueConfig, VenueRegistry};
pub use endpoints::RestEndpoints;
