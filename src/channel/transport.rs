//! Transport layer for the event channel.
//!
//! The channel talks to the network only through two traits:
//! - `Connector`: opens a new connection to an address
//! - `Connection`: one open connection carrying text frames both ways
//!
//! `WebSocketConnector` is the production implementation. Tests plug in
//! scripted connectors instead.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Errors
// ============================================================================

/// Errors specific to transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established or broke.
    #[error("connection error: {0}")]
    Connection(String),
    /// The opening handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,
    /// The peer sent something we cannot carry as text.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn connection<E: fmt::Display>(err: E) -> Self {
        TransportError::Connection(err.to_string())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for transports.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Opens connections. One call, one new transport.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// An open, bidirectional text-frame connection.
#[async_trait]
pub trait Connection: Send {
    /// Transmit one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next inbound text frame.
    ///
    /// `None` means the connection is closed; an `Err` reports a failure
    /// that does not by itself end the stream. Must be cancel-safe.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// WebSocket
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector for `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError> {
        debug!("opening websocket to {url}");
        let handshake = tokio_tungstenite::connect_async(url);
        let (stream, response) = tokio::time::timeout(self.config.connect_timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout(self.config.connect_timeout))?
            .map_err(TransportError::connection)?;
        info!(
            "websocket connected to {url} (status {})",
            response.status().as_u16()
        );
        Ok(Box::new(WebSocketConnection {
            stream,
            failed: false,
        }))
    }
}

/// One open WebSocket.
pub struct WebSocketConnection {
    stream: WsStream,
    // A read error other than a clean close is reported once; the stream is
    // treated as closed afterwards.
    failed: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        trace!("sending websocket frame: {text}");
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    TransportError::Closed
                }
                other => TransportError::connection(other),
            })
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        if self.failed {
            return None;
        }
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => {
                    return Some(String::from_utf8(data).map_err(|e| {
                        TransportError::Protocol(format!("binary frame is not UTF-8: {e}"))
                    }))
                }
                Ok(Message::Close(frame)) => {
                    debug!("websocket closed by peer: {frame:?}");
                    return None;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(TransportError::connection(e)));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::connection(e)),
        }
    }
}
