//! Loopback WebSocket server for exercising the real transport.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use super::WAIT;

/// Accepts WebSocket clients on an ephemeral local port and hands each
/// upgraded connection to the test.
pub struct TestWsServer {
    addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<ServerConnection>,
    task: Option<JoinHandle<()>>,
}

impl TestWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        let (tx, accepted) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                match accept_async(stream).await {
                    Ok(ws) => {
                        let _ = tx.send(ServerConnection { ws });
                    }
                    Err(e) => eprintln!("test server handshake failed: {e}"),
                }
            }
        });

        Self {
            addr,
            accepted,
            task: Some(task),
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait for the next client to finish the handshake.
    pub async fn accept(&mut self) -> ServerConnection {
        timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for client")
            .expect("server task ended")
    }

    /// Stop listening. Later connects to this address are refused.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for TestWsServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConnection {
    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .expect("server send");
    }

    pub async fn send_json(&mut self, value: serde_json::Value) {
        self.send_text(value.to_string()).await;
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) {
        self.ws
            .send(Message::Binary(bytes))
            .await
            .expect("server send");
    }

    /// Next text frame from the client, or `None` once the client closed.
    pub async fn recv_text(&mut self) -> Option<String> {
        loop {
            let frame = timeout(WAIT, self.ws.next())
                .await
                .expect("timed out waiting for client frame")?;
            match frame {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Drop the TCP stream without a closing handshake.
    pub fn abort(self) {
        drop(self.ws);
    }

    /// Send a close frame and drop the connection.
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
