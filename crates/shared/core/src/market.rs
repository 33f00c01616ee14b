//! Market-data and order-entry value objects shared across the stack.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::values::{Price, Quantity, Symbol, Timestamp};

/// Unique identifier for a trading venue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        VenueId(id.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId::new(s)
    }
}

impl From<String> for VenueId {
    fn from(s: String) -> Self {
        VenueId::new(s)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// WebSocket data stream category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    OrderBook,
    Ticker,
    Trades,
    Balance,
    Orders,
}

impl Channel {
    /// Private channels require an authenticated session
    pub fn is_private(&self) -> bool {
        matches!(self, Channel::Balance | Channel::Orders)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::OrderBook => "order_book",
            Channel::Ticker => "ticker",
            Channel::Trades => "trades",
            Channel::Balance => "balance",
            Channel::Orders => "orders",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One price level of an order book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, size: Quantity) -> Self {
        BookLevel { price, size }
    }
}

/// An order book snapshot or delta, normalized from the venue wire format.
///
/// `sequence` is the venue's monotonic update counter (or timestamp for
/// venues without one). A level with size zero removes that price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub sequence: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookUpdate {
    pub fn new(sequence: u64, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        BookUpdate {
            sequence,
            bids,
            asks,
        }
    }
}

/// Last-known top-of-book view for a symbol.
/// Each update fully replaces the previous value - no partial merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub last: Option<Price>,
    pub volume: Option<Quantity>,
    pub timestamp: Timestamp,
}

/// A single executed trade reported by a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub price: Price,
    pub size: Quantity,
    pub side: Option<Side>,
    pub timestamp: Timestamp,
}

/// Order type for order entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Time in force for limit orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// A logical order-entry request, translated per venue by the glue layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub time_in_force: Option<TimeInForce>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: impl Into<Symbol>, side: Side, quantity: Quantity, price: Price) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: None,
        }
    }

    pub fn market(symbol: impl Into<Symbol>, side: Side, quantity: Quantity) -> Self {
        OrderRequest {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: None,
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Venue acknowledgement for order placement or cancellation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: Symbol,
    pub status: String,
    pub timestamp: Option<Timestamp>,
}
