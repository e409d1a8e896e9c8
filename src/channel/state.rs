//! Channel lifecycle state and the reconnect decision table.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of consecutive reconnect attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default delay before the first reconnect attempt.
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Lifecycle of an event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    /// No transport, no reconnect pending. Initial state, and the state
    /// after an intentional disconnect.
    #[default]
    Idle,
    /// A transport is being established.
    Connecting,
    /// The transport is open; `send` transmits.
    Open,
    /// `disconnect` was called and the transport is being closed.
    Closing,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
    /// The attempt ceiling was reached. Only an explicit `connect` leaves it.
    Exhausted,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Idle => write!(f, "idle"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::Closing => write!(f, "closing"),
            ChannelState::Reconnecting => write!(f, "reconnecting"),
            ChannelState::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Exponential backoff settings. No jitter, no delay cap; growth is bounded
/// only by `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay before the given 1-based attempt: `base * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// What to do when the transport reports a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// The close was expected; go idle and stay there.
    Settle,
    /// Schedule reconnect number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Out of attempts.
    Exhaust,
}

/// Decide how to react to a transport close observed in `state` after
/// `attempts` consecutive failed attempts.
pub fn close_action(state: ChannelState, attempts: u32, policy: &ReconnectPolicy) -> CloseAction {
    match state {
        ChannelState::Idle | ChannelState::Closing | ChannelState::Exhausted => CloseAction::Settle,
        ChannelState::Connecting | ChannelState::Open | ChannelState::Reconnecting => {
            if attempts >= policy.max_attempts {
                CloseAction::Exhaust
            } else {
                let attempt = attempts + 1;
                CloseAction::Retry {
                    attempt,
                    delay: policy.delay_for(attempt),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::Idle.to_string(), "idle");
        assert_eq!(ChannelState::Connecting.to_string(), "connecting");
        assert_eq!(ChannelState::Open.to_string(), "open");
        assert_eq!(ChannelState::Closing.to_string(), "closing");
        assert_eq!(ChannelState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ChannelState::Exhausted.to_string(), "exhausted");
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(16000));
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let policy = ReconnectPolicy::new(Duration::from_secs(1), u32::MAX);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert!(policy.delay_for(200) >= policy.delay_for(32));
    }

    #[test]
    fn test_intentional_close_settles() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            close_action(ChannelState::Closing, 0, &policy),
            CloseAction::Settle
        );
        assert_eq!(
            close_action(ChannelState::Idle, 3, &policy),
            CloseAction::Settle
        );
        assert_eq!(
            close_action(ChannelState::Exhausted, 5, &policy),
            CloseAction::Settle
        );
    }

    #[test]
    fn test_unexpected_close_retries_until_ceiling() {
        let policy = ReconnectPolicy::new(Duration::from_millis(10), 3);

        assert_eq!(
            close_action(ChannelState::Open, 0, &policy),
            CloseAction::Retry {
                attempt: 1,
                delay: Duration::from_millis(10)
            }
        );
        assert_eq!(
            close_action(ChannelState::Connecting, 2, &policy),
            CloseAction::Retry {
                attempt: 3,
                delay: Duration::from_millis(40)
            }
        );
        assert_eq!(
            close_action(ChannelState::Connecting, 3, &policy),
            CloseAction::Exhaust
        );
    }

    #[test]
    fn test_zero_attempts_policy_exhausts_immediately() {
        let policy = ReconnectPolicy::new(Duration::from_millis(10), 0);
        assert_eq!(
            close_action(ChannelState::Open, 0, &policy),
            CloseAction::Exhaust
        );
    }
}
