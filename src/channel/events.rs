//! Notifications delivered to channel listeners.
//!
//! Data and failures travel the same path: a listener sees decoded server
//! payloads and lifecycle/error notifications as variants of one enum.

use serde::{Deserialize, Serialize};

use super::event_types::{
    EVENT_CONNECTED, EVENT_DISCONNECTED, EVENT_ERROR, EVENT_MESSAGE, EVENT_RECONNECTING,
    EVENT_RECONNECT_EXHAUSTED,
};

/// Events emitted by the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// The transport opened. The reconnect counter is back to zero.
    Connected,

    /// The transport closed, intentionally or not.
    Disconnected,

    /// A transport failure, an undecodable frame, or a failed connect attempt.
    Error { message: String },

    /// A reconnect has been scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },

    /// The attempt ceiling was reached; no further automatic reconnects.
    ReconnectExhausted { attempts: u32 },

    /// A decoded inbound payload.
    Message { payload: serde_json::Value },
}

impl ChannelEvent {
    /// Registry name this event is dispatched under.
    ///
    /// For `Message` this is the catch-all name; the discriminator route is
    /// decided separately by the channel.
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::Connected => EVENT_CONNECTED,
            ChannelEvent::Disconnected => EVENT_DISCONNECTED,
            ChannelEvent::Error { .. } => EVENT_ERROR,
            ChannelEvent::Reconnecting { .. } => EVENT_RECONNECTING,
            ChannelEvent::ReconnectExhausted { .. } => EVENT_RECONNECT_EXHAUSTED,
            ChannelEvent::Message { .. } => EVENT_MESSAGE,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ChannelEvent::Error {
            message: message.into(),
        }
    }

    /// The payload of a `Message`, if this is one.
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            ChannelEvent::Message { payload } => Some(payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_match_reserved_constants() {
        assert_eq!(ChannelEvent::Connected.name(), "connected");
        assert_eq!(ChannelEvent::Disconnected.name(), "disconnected");
        assert_eq!(ChannelEvent::error("boom").name(), "error");
        assert_eq!(
            ChannelEvent::Reconnecting {
                attempt: 1,
                delay_ms: 1000
            }
            .name(),
            "reconnecting"
        );
        assert_eq!(
            ChannelEvent::ReconnectExhausted { attempts: 5 }.name(),
            "reconnect_exhausted"
        );
        assert_eq!(
            ChannelEvent::Message { payload: json!({}) }.name(),
            "message"
        );
    }

    #[test]
    fn serializes_with_event_tag() {
        let value = serde_json::to_value(ChannelEvent::Reconnecting {
            attempt: 2,
            delay_ms: 2000,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "event": "reconnecting", "attempt": 2, "delay_ms": 2000 })
        );
    }

    #[test]
    fn payload_only_for_messages() {
        let message = ChannelEvent::Message {
            payload: json!({ "type": "prediction_update" }),
        };
        assert!(message.payload().is_some());
        assert!(ChannelEvent::Connected.payload().is_none());
    }
}
