//! Reconnecting event channel.
//!
//! `EventChannel` is a handle to a background task that owns the transport.
//! The task runs a small state machine:
//!
//! ```text
//! Idle --connect--> Connecting --ok--> Open --peer closed--> Reconnecting --timer--> Connecting
//!                        |                |                                            |
//!                        +--fail----------+--> (attempts >= max) --> Exhausted         |
//!                                         +--disconnect--> Closing --> Idle            |
//! ```
//!
//! Every notification, including failures, is delivered through the listener
//! registry from that single task, so listeners observe inbound messages in
//! arrival order.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::event_types::{discriminator, EVENT_MESSAGE};
use super::events::ChannelEvent;
use super::registry::{Listener, ListenerRegistry};
use super::state::{close_action, ChannelState, CloseAction, ReconnectPolicy};
use super::transport::{
    Connection, Connector, TransportConfig, TransportError, WebSocketConnector,
};

/// Errors returned to callers of the channel handle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("event channel is not connected")]
    NotConnected,
    #[error("failed to encode payload: {0}")]
    Encode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("event channel has been shut down")]
    Stopped,
}

enum Command {
    Connect {
        url: String,
    },
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Disconnect {
        done: oneshot::Sender<()>,
    },
    Shutdown,
}

/// State visible to both the handle and the worker.
#[derive(Default)]
struct Shared {
    state: RwLock<ChannelState>,
    attempts: AtomicU32,
}

impl Shared {
    fn state(&self) -> ChannelState {
        *self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: ChannelState) {
        *self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn set_attempts(&self, attempts: u32) {
        self.attempts.store(attempts, Ordering::SeqCst);
    }
}

/// A push-message client that reconnects on its own and dispatches inbound
/// messages to listeners by event name.
pub struct EventChannel {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<ListenerRegistry>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Create a channel that opens transports through `connector`.
    ///
    /// Spawns the worker task, so this must be called inside a tokio runtime.
    pub fn new(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(ListenerRegistry::new());
        let shared = Arc::new(Shared::default());

        let worker = ChannelWorker {
            connector,
            policy,
            registry: registry.clone(),
            shared: shared.clone(),
            commands: rx,
            url: None,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            commands: tx,
            registry,
            shared,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Create a channel backed by WebSockets.
    pub fn websocket(config: TransportConfig, policy: ReconnectPolicy) -> Self {
        Self::new(Arc::new(WebSocketConnector::new(config)), policy)
    }

    /// Start connecting to `url`. Returns immediately; the outcome arrives
    /// as a `connected` (or `error`/`disconnected`) notification.
    ///
    /// Does nothing if the channel is already open or connecting.
    pub fn connect(&self, url: impl Into<String>) -> Result<(), ChannelError> {
        self.commands
            .send(Command::Connect { url: url.into() })
            .map_err(|_| ChannelError::Stopped)
    }

    /// Serialize `payload` as JSON and transmit it.
    ///
    /// Fails with `NotConnected` unless the transport is open. Nothing is
    /// queued for later delivery.
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), ChannelError> {
        if self.shared.state() != ChannelState::Open {
            warn!("cannot send: event channel is {}", self.shared.state());
            return Err(ChannelError::NotConnected);
        }
        let text =
            serde_json::to_string(payload).map_err(|e| ChannelError::Encode(e.to_string()))?;

        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::Send { text, reply })
            .map_err(|_| ChannelError::Stopped)?;
        result.await.map_err(|_| ChannelError::Stopped)?
    }

    /// Close the transport and stay closed. Cancels a pending reconnect.
    ///
    /// Resolves once the worker has processed the request.
    pub async fn disconnect(&self) -> Result<(), ChannelError> {
        let (done, finished) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { done })
            .map_err(|_| ChannelError::Stopped)?;
        finished.await.map_err(|_| ChannelError::Stopped)
    }

    /// Register `listener` for `event`. Returns false if that handle was
    /// already registered for it.
    pub fn on(&self, event: &str, listener: Listener) -> bool {
        self.registry.add(event, listener)
    }

    /// Unregister `listener` from `event`. Returns false if it was not there.
    pub fn off(&self, event: &str, listener: &Listener) -> bool {
        self.registry.remove(event, listener)
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.listener_count(event)
    }

    /// Close any transport and stop the worker task.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("event channel worker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

// ============================================================================
// Worker
// ============================================================================

enum Phase {
    /// Idle or exhausted: waiting for an explicit connect.
    Waiting,
    Connecting,
    Open(Box<dyn Connection>),
    Backoff(Duration),
}

struct ChannelWorker {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    registry: Arc<ListenerRegistry>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,
    url: Option<String>,
}

impl ChannelWorker {
    async fn run(mut self) {
        let mut phase = Phase::Waiting;
        loop {
            let next = match phase {
                Phase::Waiting => self.wait_for_connect().await,
                Phase::Connecting => self.establish().await,
                Phase::Open(conn) => self.pump(conn).await,
                Phase::Backoff(delay) => self.back_off(delay).await,
            };
            match next {
                Some(p) => phase = p,
                None => break,
            }
        }
        self.shared.set_state(ChannelState::Idle);
        debug!("event channel worker stopped");
    }

    async fn wait_for_connect(&mut self) -> Option<Phase> {
        loop {
            match self.commands.recv().await {
                None | Some(Command::Shutdown) => return None,
                Some(Command::Connect { url }) => {
                    self.url = Some(url);
                    self.shared.set_attempts(0);
                    self.shared.set_state(ChannelState::Connecting);
                    return Some(Phase::Connecting);
                }
                Some(Command::Send { reply, .. }) => reject_send(reply),
                Some(Command::Disconnect { done }) => {
                    self.shared.set_state(ChannelState::Idle);
                    let _ = done.send(());
                }
            }
        }
    }

    async fn establish(&mut self) -> Option<Phase> {
        let Some(url) = self.url.clone() else {
            self.shared.set_state(ChannelState::Idle);
            return Some(Phase::Waiting);
        };
        let connector = self.connector.clone();
        let attempt = connector.connect(&url);
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return Some(match result {
                        Ok(conn) => self.opened(conn, &url),
                        Err(e) => {
                            warn!("failed to connect to {url}: {e}");
                            self.emit(ChannelEvent::error(e.to_string()));
                            self.emit(ChannelEvent::Disconnected);
                            self.after_close()
                        }
                    });
                }
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Shutdown) => return None,
                    Some(Command::Connect { .. }) => debug!("connect already in progress"),
                    Some(Command::Send { reply, .. }) => reject_send(reply),
                    Some(Command::Disconnect { done }) => {
                        info!("connect to {url} abandoned");
                        self.shared.set_state(ChannelState::Idle);
                        let _ = done.send(());
                        return Some(Phase::Waiting);
                    }
                },
            }
        }
    }

    fn opened(&mut self, conn: Box<dyn Connection>, url: &str) -> Phase {
        self.shared.set_attempts(0);
        self.shared.set_state(ChannelState::Open);
        info!("event channel connected to {url}");
        self.emit(ChannelEvent::Connected);
        Phase::Open(conn)
    }

    async fn pump(&mut self, mut conn: Box<dyn Connection>) -> Option<Phase> {
        loop {
            tokio::select! {
                frame = conn.next_frame() => match frame {
                    Some(Ok(text)) => self.dispatch_frame(&text),
                    Some(Err(e)) => {
                        warn!("event channel transport error: {e}");
                        self.emit(ChannelEvent::error(e.to_string()));
                    }
                    None => {
                        info!("event channel disconnected");
                        self.emit(ChannelEvent::Disconnected);
                        return Some(self.after_close());
                    }
                },
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Shutdown) => {
                        let _ = conn.close().await;
                        return None;
                    }
                    Some(Command::Connect { .. }) => debug!("already connected, ignoring connect"),
                    Some(Command::Send { text, reply }) => {
                        trace!("sending {text}");
                        let result = conn.send_text(text).await.map_err(ChannelError::from);
                        if let Err(e) = &result {
                            warn!("event channel send failed: {e}");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Disconnect { done }) => {
                        self.shared.set_state(ChannelState::Closing);
                        if let Err(e) = conn.close().await {
                            debug!("error while closing transport: {e}");
                        }
                        drop(conn);
                        info!("event channel disconnected by request");
                        self.emit(ChannelEvent::Disconnected);
                        let next = self.after_close();
                        let _ = done.send(());
                        return Some(next);
                    }
                },
            }
        }
    }

    async fn back_off(&mut self, delay: Duration) -> Option<Phase> {
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => {
                    self.shared.set_state(ChannelState::Connecting);
                    return Some(Phase::Connecting);
                }
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Shutdown) => return None,
                    Some(Command::Connect { url }) => {
                        debug!("explicit connect, skipping remaining backoff");
                        self.url = Some(url);
                        self.shared.set_state(ChannelState::Connecting);
                        return Some(Phase::Connecting);
                    }
                    Some(Command::Send { reply, .. }) => reject_send(reply),
                    Some(Command::Disconnect { done }) => {
                        info!("pending reconnect cancelled");
                        self.shared.set_state(ChannelState::Idle);
                        let _ = done.send(());
                        return Some(Phase::Waiting);
                    }
                },
            }
        }
    }

    /// Apply the close decision table to the current state.
    fn after_close(&mut self) -> Phase {
        let action = close_action(self.shared.state(), self.shared.attempts(), &self.policy);
        match action {
            CloseAction::Settle => {
                self.shared.set_state(ChannelState::Idle);
                Phase::Waiting
            }
            CloseAction::Retry { attempt, delay } => {
                self.shared.set_attempts(attempt);
                self.shared.set_state(ChannelState::Reconnecting);
                info!(
                    "reconnecting in {delay:?} (attempt {attempt}/{})",
                    self.policy.max_attempts
                );
                self.emit(ChannelEvent::Reconnecting {
                    attempt,
                    delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                });
                Phase::Backoff(delay)
            }
            CloseAction::Exhaust => {
                let attempts = self.shared.attempts();
                self.shared.set_state(ChannelState::Exhausted);
                error!("max reconnection attempts reached ({attempts})");
                self.emit(ChannelEvent::ReconnectExhausted { attempts });
                Phase::Waiting
            }
        }
    }

    fn dispatch_frame(&self, text: &str) {
        trace!("received frame: {text}");
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to parse event channel message: {e}");
                self.emit(ChannelEvent::error(format!("failed to decode message: {e}")));
                return;
            }
        };

        let route = discriminator(&payload).map(str::to_owned);
        let event = ChannelEvent::Message { payload };
        self.registry.dispatch(EVENT_MESSAGE, &event);
        if let Some(name) = route {
            self.registry.dispatch(&name, &event);
        }
    }

    fn emit(&self, event: ChannelEvent) {
        self.registry.dispatch(event.name(), &event);
    }
}

fn reject_send(reply: oneshot::Sender<Result<(), ChannelError>>) {
    warn!("cannot send: event channel is not connected");
    let _ = reply.send(Err(ChannelError::NotConnected));
}
