//! Frame transports for the push hub.
//!
//! The hub talks to a [`FrameTransport`] obtained from a [`Connector`]; the
//! production implementation carries STOMP frames in WebSocket text
//! messages via tokio-tungstenite.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use estate_core::{Error, Result};

use crate::stomp::{self, Frame};

/// Bidirectional frame stream over one physical connection.
#[async_trait]
pub trait FrameTransport: Send {
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Next frame from the server. `None` once the connection is closed.
    ///
    /// Must be cancel safe: the hub polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<Frame>>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Opens new transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>>;
}

/// Connector for STOMP over a plain WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FrameTransport>> {
        debug!(subsystem = "push", component = "transport", url = %self.url, "Opening WebSocket");
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("WebSocket connect to {} failed: {}", self.url, e)))?;
        Ok(Box::new(WsTransport {
            stream,
            pending: VecDeque::new(),
        }))
    }
}

/// STOMP frames carried in WebSocket text messages.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Frames decoded from a message that carried more than one.
    pending: VecDeque<Frame>,
}

#[async_trait]
impl FrameTransport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<()> {
        trace!(subsystem = "push", component = "transport", command = %frame.command, "Sending frame");
        self.stream
            .send(Message::Text(frame.encode()))
            .await
            .map_err(|e| Error::Transport(format!("WebSocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            let text = match self.stream.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        return Some(Err(Error::Decode(format!(
                            "Binary STOMP frame is not UTF-8: {}",
                            e
                        ))))
                    }
                },
                Ok(Message::Close(_)) => return None,
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(Error::Transport(format!(
                        "WebSocket receive failed: {}",
                        e
                    ))))
                }
            };
            match stomp::decode_all(&text) {
                Ok(frames) => self.pending.extend(frames),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| Error::Transport(format!("WebSocket close failed: {}", e)))
    }
}
