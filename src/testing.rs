//! Test doubles shared by unit tests across modules.
//!
//! `MockConnector` stands in for the WebSocket transport. Each accepted
//! connection hands its server side (`MockPeer`) to the test, which can push
//! frames, inject read errors, inspect what the client sent, or hang up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::channel::transport::{Connection, Connector, TransportError};
use crate::channel::{listener, ChannelEvent, EventChannel};

pub(crate) const WAIT: Duration = Duration::from_secs(2);

enum MockFrame {
    Text(String),
    Error(String),
}

/// Server side of one mock connection. Dropping it (or calling `hang_up`)
/// closes the connection from the peer's side.
pub(crate) struct MockPeer {
    tx: mpsc::UnboundedSender<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_by_client: Arc<AtomicBool>,
}

impl MockPeer {
    pub(crate) fn push(&self, text: impl Into<String>) {
        let _ = self.tx.send(MockFrame::Text(text.into()));
    }

    pub(crate) fn push_json(&self, value: serde_json::Value) {
        self.push(value.to_string());
    }

    pub(crate) fn push_error(&self, message: impl Into<String>) {
        let _ = self.tx.send(MockFrame::Error(message.into()));
    }

    pub(crate) fn hang_up(self) {}

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Shared handle to the outbound log; outlives the peer.
    pub(crate) fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }

    pub(crate) fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockConnection {
    rx: mpsc::UnboundedReceiver<MockFrame>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        match self.rx.recv().await? {
            MockFrame::Text(text) => Some(Ok(text)),
            MockFrame::Error(message) => Some(Err(TransportError::Connection(message))),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
        Ok(())
    }
}

/// Connector that fails on demand and hands every accepted connection's
/// peer to the test.
pub(crate) struct MockConnector {
    connects: AtomicUsize,
    failures: Mutex<VecDeque<String>>,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            connects: AtomicUsize::new(0),
            failures: Mutex::new(VecDeque::new()),
            peers,
        });
        (connector, rx)
    }

    pub(crate) fn fail_next(&self, count: usize) {
        let mut failures = self.failures.lock().unwrap();
        for _ in 0..count {
            failures.push_back("connection refused".to_string());
        }
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failures.lock().unwrap().pop_front() {
            return Err(TransportError::Connection(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let _ = self.peers.send(MockPeer {
            tx,
            sent: sent.clone(),
            closed_by_client: closed.clone(),
        });
        Ok(Box::new(MockConnection { rx, sent, closed }))
    }
}

/// Forward every `event` notification into a channel the test can await.
pub(crate) fn record(channel: &EventChannel, event: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.on(
        event,
        listener(move |e| {
            let _ = tx.send(e.clone());
        }),
    );
    rx
}

pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("recorder dropped")
}

pub(crate) async fn next_peer(peers: &mut mpsc::UnboundedReceiver<MockPeer>) -> MockPeer {
    timeout(WAIT, peers.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}
