//! Error types for the connectivity core

use thiserror::Error;

/// Transport-level errors (HTTP dispatch, socket I/O)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Socket closed")]
    SocketClosed,

    #[error("Channel closed")]
    ChannelClosed,
}

/// Connectivity errors surfaced to callers
#[derive(Error, Debug)]
pub enum ConnectError {
    /// Transient network failure, already retried up to policy limits
    #[error("Network error: {0}")]
    Network(String),

    /// The venue rejected the request for rate reasons despite local limiting
    #[error("Venue rate limit exceeded")]
    RateLimited,

    /// Authentication rejected - terminal for the affected private channels
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Malformed or unexpected message/response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Venue returned a non-success HTTP status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Private call attempted without configured credentials - never retried
    #[error("Missing API credentials for private call")]
    MissingCredentials,

    /// The session was explicitly closed
    #[error("Session closed")]
    SessionClosed,
}

impl From<TransportError> for ConnectError {
    fn from(e: TransportError) -> Self {
        ConnectError::Network(e.to_string())
    }
}
