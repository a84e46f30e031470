//! Per-event change listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use super::models::StatusChange;

pub type ChangeCallback = Arc<dyn Fn(&StatusChange) + Send + Sync>;

#[derive(Default)]
pub(super) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(u64, ChangeCallback)>>>,
}

impl ListenerRegistry {
    pub(super) fn register(
        self: &Arc<Self>,
        event_id: &str,
        callback: ChangeCallback,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap()
            .entry(event_id.to_string())
            .or_default()
            .push((id, callback));
        Subscription {
            registry: Arc::downgrade(self),
            event_id: event_id.to_string(),
            id,
        }
    }

    fn remove(&self, event_id: &str, id: u64) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(callbacks) = listeners.get_mut(event_id) {
            callbacks.retain(|(callback_id, _)| *callback_id != id);
            if callbacks.is_empty() {
                listeners.remove(event_id);
            }
        }
    }

    /// Invokes every callback registered for the change's event id.
    ///
    /// Callbacks run after the registry lock is released, so they may
    /// register or drop subscriptions themselves.
    pub(super) fn notify(&self, change: &StatusChange) {
        let callbacks: Vec<ChangeCallback> = match self.listeners.lock().unwrap().get(&change.event_id)
        {
            Some(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(change);
        }
    }

    pub(super) fn count(&self, event_id: &str) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .get(event_id)
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }
}

/// Keeps an `on_change` callback registered. Dropping it unsubscribes.
#[must_use = "the callback is unregistered as soon as the subscription is dropped"]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    event_id: String,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.event_id, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_id", &self.event_id)
            .field("id", &self.id)
            .finish()
    }
}
