use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;

use super::events::ChannelEvent;

/// A subscriber callback. Identity is the identity of the `Arc`.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
///
/// Keep the returned handle around if you need to [`off`] it later.
///
/// [`off`]: super::EventChannel::off
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&ChannelEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Event name → ordered set of listeners.
///
/// Entries are created on first subscription and never pruned, so an event
/// whose listeners were all removed keeps an empty entry.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `event`. Returns false if that exact handle
    /// was already registered there.
    pub fn add(&self, event: &str, listener: Listener) -> bool {
        let mut entry = self.listeners.entry(event.to_string()).or_default();
        if entry.iter().any(|existing| same_listener(existing, &listener)) {
            return false;
        }
        entry.push(listener);
        true
    }

    /// Remove `listener` from `event`. Returns false if it was not there.
    pub fn remove(&self, event: &str, listener: &Listener) -> bool {
        let Some(mut entry) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|existing| !same_listener(existing, listener));
        entry.len() != before
    }

    /// Invoke every listener registered under `event`, in insertion order.
    ///
    /// The listener list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe. A panicking listener is logged and skipped; the rest
    /// still run. Returns how many listeners completed normally.
    pub fn dispatch(&self, event: &str, payload: &ChannelEvent) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.get(event) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for listener in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    let reason = cause
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| cause.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("listener for '{event}' panicked: {reason}");
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Names that have (or had) at least one registration.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .listeners
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}
