//! Venue wire-protocol seam.
//!
//! A `WireProtocol` implementation knows how one venue shapes its
//! WebSocket frames: how to ask for a channel, how to authenticate, and
//! how to decode what comes back. The session controller is written
//! entirely against this trait.

use hermes_core::{BookUpdate, Symbol, TickerSnapshot, Trade};

use crate::credentials::Credentials;
use crate::error::ConnectError;
use crate::subscription::SubscriptionKey;

/// A market-data event decoded from a socket frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Full book replacement for a symbol
    BookSnapshot { symbol: Symbol, update: BookUpdate },
    /// Incremental book delta for a symbol
    BookDelta { symbol: Symbol, update: BookUpdate },
    Ticker {
        symbol: Symbol,
        ticker: TickerSnapshot,
    },
    Trade { symbol: Symbol, trade: Trade },
}

impl StreamEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            StreamEvent::BookSnapshot { symbol, .. }
            | StreamEvent::BookDelta { symbol, .. }
            | StreamEvent::Ticker { symbol, .. }
            | StreamEvent::Trade { symbol, .. } => symbol,
        }
    }
}

/// The session-relevant meaning of one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedFrame {
    Event(StreamEvent),
    /// Venue answered our auth frame
    AuthAck {
        success: bool,
        reason: Option<String>,
    },
    /// Venue confirmed a subscription
    SubscribeAck { key: SubscriptionKey },
    /// Application-level pong, counts as liveness only
    Pong,
    /// Private account payload (balances, order updates), forwarded
    /// to the caller without caching
    Account {
        key: SubscriptionKey,
        payload: serde_json::Value,
    },
    /// Recognized but irrelevant (welcome banners, info frames)
    Ignore,
}

/// Frame vocabulary of a single venue.
///
/// Implementations must be pure: no I/O, no internal connection state.
/// All per-connection state lives in the session controller so a
/// reconnect can reuse the same protocol instance.
pub trait WireProtocol: Send + Sync {
    /// Outbound frame requesting the given channel
    fn subscribe_frame(&self, key: &SubscriptionKey) -> String;

    /// Outbound frame releasing the given channel
    fn unsubscribe_frame(&self, key: &SubscriptionKey) -> String;

    /// Outbound authentication frame. The nonce is fresh per attempt.
    fn auth_frame(&self, credentials: &Credentials, nonce: i64) -> Result<String, ConnectError>;

    /// Application-level ping, for venues that expect one. `None` means
    /// the venue relies on transport-level ping frames only.
    fn ping_frame(&self) -> Option<String> {
        None
    }

    /// Decode one inbound text frame
    fn parse(&self, raw: &str) -> Result<ParsedFrame, ConnectError>;
}
