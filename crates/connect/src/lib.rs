//! Hermes Connectivity Core
//!
//! Venue-agnostic machinery for talking to cryptocurrency exchanges:
//! - Signed, rate-limited, retried REST dispatch (`executor`)
//! - Resilient per-venue WebSocket sessions with authentication,
//!   heartbeats, reconnect-with-backoff and subscription replay (`session`)
//! - Consistent, queryable market-state caches (`cache`)
//!
//! ## Architecture
//!
//! ```text
//! caller ──execute()──▶ RateLimiter ─▶ Signer ─▶ HttpTransport ─▶ venue
//!
//! caller ──subscribe()─▶ SessionController ─▶ SocketConnector ─▶ venue
//!                              │ inbound frames (arrival order)
//!                              ▼
//!                        WireProtocol::parse
//!                              │
//!                              ▼
//!                         StreamCache ◀──read*()── caller
//! ```
//!
//! Per-venue specifics (URL paths, field names, frame formats) stay out
//! of this crate: they enter through the `HttpTransport`,
//! `SocketConnector` and `WireProtocol` seams.

pub mod backoff;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod protocol;
pub mod rate_limit;
pub mod request;
pub mod session;
pub mod sign;
pub mod subscription;
pub mod transport;

// Re-export commonly used types
pub use backoff::BackoffConfig;
pub use cache::{ApplyOutcome, OrderBookView, StreamCache, TickerView, TradesView};
pub use credentials::Credentials;
pub use error::{ConnectError, TransportError};
pub use executor::{RequestExecutor, RetryPolicy};
pub use protocol::{ParsedFrame, StreamEvent, WireProtocol};
pub use rate_limit::{RateLimitConfig, RateLimiter, TokenBucket};
pub use request::{AuthKind, HttpMethod, RequestDescriptor, SignedRequest};
pub use session::{
    SessionConfig, SessionController, SessionHandle, SessionNotice, SessionState,
};
pub use sign::{HmacAlgorithm, RequestSigner, SignatureEncoding, SignatureScheme};
pub use subscription::{SubscriptionKey, SubscriptionManager};
pub use transport::{
    HttpResponse, HttpTransport, ReqwestTransport, SocketConnector, SocketFrame, SocketHandle,
    TungsteniteConnector,
};
