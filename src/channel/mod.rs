//! Server-push event channel.
//!
//! The channel provides:
//! - A single logical connection to one push endpoint
//! - Automatic reconnection with exponential backoff and an attempt ceiling
//! - Publish-subscribe dispatch of decoded messages by event name
//!
//! # Architecture
//!
//! Frames flow from transport → worker task → listener registry:
//! - `Connector` / `Connection`: transport seam (WebSocket in production)
//! - `EventChannel`: handle; commands go to a worker task over `mpsc`
//! - `ListenerRegistry`: event name → listeners, panic-isolated dispatch
//!
//! Lifecycle and error notifications use the same registry as data, so a
//! subscriber observes everything through `on`.

mod event_channel;
pub mod event_types;
mod events;
mod registry;
mod state;
pub mod transport;


pub use event_channel::{ChannelError, EventChannel};
pub use events::ChannelEvent;
pub use registry::{listener, Listener, ListenerRegistry};
pub use state::{
    close_action, ChannelState, CloseAction, ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_BASE_DELAY,
};
pub use transport::{
    Connection, Connector, TransportConfig, TransportError, WebSocketConnector,
};
