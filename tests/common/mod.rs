//! Shared helpers for event channel integration tests.

pub mod mock_connector;
pub mod ws_server;

use std::time::Duration;

use kronos_lib::channel::{listener, ChannelEvent, EventChannel};
use tokio::sync::mpsc;
use tokio::time::timeout;

pub use mock_connector::ScriptedConnector;
pub use ws_server::TestWsServer;

pub const WAIT: Duration = Duration::from_secs(5);

/// Forward every notification named `event` into a receiver.
pub fn record(channel: &EventChannel, event: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    channel.on(
        event,
        listener(move |e| {
            let _ = tx.send(e.clone());
        }),
    );
    rx
}

/// Record several event names into one ordered stream of `(name, event)`.
pub fn record_all(
    channel: &EventChannel,
    events: &[&str],
) -> mpsc::UnboundedReceiver<(String, ChannelEvent)> {
    let (tx, rx) = mpsc::unbounded_channel();
    for name in events {
        let tx = tx.clone();
        let label = name.to_string();
        channel.on(
            name,
            listener(move |e| {
                let _ = tx.send((label.clone(), e.clone()));
            }),
        );
    }
    rx
}

pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("recorder dropped")
}
