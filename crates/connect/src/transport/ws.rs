//! `tokio-tungstenite`-backed WebSocket transport.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::TransportError;

use super::{SocketConnector, SocketFrame, SocketHandle};

/// Production WebSocket connector. Each `connect` call opens one
/// connection and spawns a read pump and a write pump; the returned
/// handle is the only way to reach them.
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<SocketHandle, TransportError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        let (in_tx, in_rx) = mpsc::channel::<SocketFrame>(1024);

        // Outgoing pump
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::warn!("socket write failed: {}", e);
                    break;
                }
            }
        });

        // Incoming pump. tungstenite answers ping control frames itself;
        // we still forward them as liveness evidence.
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let frame = match msg {
                    Ok(Message::Text(text)) => SocketFrame::Text(text.to_string()),
                    Ok(Message::Ping(data)) => SocketFrame::Ping(data.to_vec()),
                    Ok(Message::Pong(data)) => SocketFrame::Pong(data.to_vec()),
                    Ok(Message::Close(_)) => {
                        let _ = in_tx.send(SocketFrame::Closed).await;
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!("socket read error: {}", e);
                        let _ = in_tx.send(SocketFrame::Closed).await;
                        break;
                    }
                };

                if in_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(SocketHandle {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
