//! Per-venue REST surface seam.
//!
//! One implementation per venue knows its paths, parameter names and
//! response shapes. The client stays venue-agnostic: it builds nothing
//! itself and decodes nothing itself.

use hermes_connect::{ConnectError, RequestDescriptor};
use hermes_core::{BookUpdate, OrderAck, OrderRequest, Symbol, TickerSnapshot, Trade};

/// Descriptor builders and response decoders for one venue's REST API.
///
/// Builders return `RequestDescriptor`s; the signing and dispatch side
/// never changes per venue. Market and balance payloads stay as raw
/// JSON since their shape varies too much across venues to normalize.
pub trait RestEndpoints: Send + Sync {
    fn markets(&self) -> RequestDescriptor;
    fn ticker(&self, symbol: &Symbol) -> RequestDescriptor;
    fn order_book(&self, symbol: &Symbol, depth: Option<u32>) -> RequestDescriptor;
    fn trades(&self, symbol: &Symbol, limit: Option<u32>) -> RequestDescriptor;
    fn balance(&self) -> RequestDescriptor;
    fn create_order(&self, order: &OrderRequest) -> Result<RequestDescriptor, ConnectError>;
    fn cancel_order(&self, symbol: &Symbol, order_id: &str) -> RequestDescriptor;
    fn open_orders(&self, symbol: Option<&Symbol>) -> RequestDescriptor;

    fn decode_ticker(&self, symbol: &Symbol, body: &[u8]) -> Result<TickerSnapshot, ConnectError>;
    fn decode_order_book(&self, body: &[u8]) -> Result<BookUpdate, ConnectError>;
    fn decode_trades(&self, body: &[u8]) -> Result<Vec<Trade>, ConnectError>;
    fn decode_order(&self, body: &[u8]) -> Result<OrderAck, ConnectError>;
}
