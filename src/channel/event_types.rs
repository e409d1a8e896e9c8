//! Event name constants and routing rules.
//!
//! Single source of truth for the reserved lifecycle names a listener can
//! register under, and for how an inbound payload picks the extra event name
//! it is routed to.

use serde_json::Value;

// ---------------------------------------------------------------------------
// Lifecycle notifications
// ---------------------------------------------------------------------------

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_DISCONNECTED: &str = "disconnected";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_RECONNECTING: &str = "reconnecting";
pub const EVENT_RECONNECT_EXHAUSTED: &str = "reconnect_exhausted";

/// Catch-all name: receives every successfully decoded inbound payload.
pub const EVENT_MESSAGE: &str = "message";

// ---------------------------------------------------------------------------
// Server event types
// ---------------------------------------------------------------------------

pub const EVENT_PREDICTION_UPDATE: &str = "prediction_update";

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Field of an inbound payload naming its event type.
pub const DISCRIMINATOR_FIELD: &str = "type";

/// Returns the event name a decoded payload is routed to in addition to the
/// catch-all, if any.
///
/// Only string discriminators count. A payload that names the catch-all
/// itself is not routed twice.
pub fn discriminator(payload: &Value) -> Option<&str> {
    let name = payload.get(DISCRIMINATOR_FIELD)?.as_str()?;
    if name.is_empty() || name == EVENT_MESSAGE {
        return None;
    }
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_discriminator_is_routed() {
        let payload = json!({ "type": "prediction_update", "close": 1.5 });
        assert_eq!(discriminator(&payload), Some(EVENT_PREDICTION_UPDATE));
    }

    #[test]
    fn missing_or_non_string_discriminator_is_ignored() {
        assert_eq!(discriminator(&json!({ "close": 1.5 })), None);
        assert_eq!(discriminator(&json!({ "type": 7 })), None);
        assert_eq!(discriminator(&json!({ "type": "" })), None);
        assert_eq!(discriminator(&json!([1, 2, 3])), None);
    }

    #[test]
    fn catch_all_name_is_not_routed_twice() {
        assert_eq!(discriminator(&json!({ "type": "message" })), None);
    }
}
