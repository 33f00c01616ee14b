//! Transport seams: REST dispatch and WebSocket connections.
//!
//! The core never opens sockets itself - it talks through these traits.
//! Production implementations (`reqwest`, `tokio-tungstenite`) live in
//! this module; tests substitute scripted mocks.

pub mod http;
pub mod ws;

pub use http::ReqwestTransport;
pub use ws::TungsteniteConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::request::SignedRequest;

/// Raw HTTP response handed back to the executor
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// REST transport: one signed request in, raw bytes out
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &SignedRequest) -> Result<HttpResponse, TransportError>;
}

/// A frame coming off a venue socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Text(String),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Closed,
}

/// A live socket connection: outbound text sender plus inbound frame
/// receiver. The connector owns the pump tasks; dropping both ends
/// tears the connection down.
pub struct SocketHandle {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<SocketFrame>,
}

/// WebSocket transport: opens one connection per call
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<SocketHandle, TransportError>;
}
