//! Event subscriptions: Plotly event name to subscription ids to callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use figlink_core::SubscriptionId;
use parking_lot::Mutex;
use serde_json::Value;

/// Callback receiving an event's payload.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Default)]
struct Subscriptions {
    callbacks: HashMap<SubscriptionId, EventCallback>,
    by_event: HashMap<String, Vec<SubscriptionId>>,
}

/// Registry of event callbacks. Subscriptions are additive.
#[derive(Default)]
pub struct EventRegistry {
    inner: Mutex<Subscriptions>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback for `event` under a fresh id.
    pub fn subscribe(&self, event: &str, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut inner = self.inner.lock();
        let _ = inner.callbacks.insert(id.clone(), callback);
        inner
            .by_event
            .entry(event.to_owned())
            .or_default()
            .push(id.clone());
        id
    }

    /// Forget every subscription of `event`, returning their ids.
    pub fn remove_event(&self, event: &str) -> Vec<SubscriptionId> {
        let mut inner = self.inner.lock();
        let ids = inner.by_event.remove(event).unwrap_or_default();
        for id in &ids {
            let _ = inner.callbacks.remove(id);
        }
        ids
    }

    /// The callback for `id`, if still subscribed.
    pub fn callback(&self, id: &SubscriptionId) -> Option<EventCallback> {
        self.inner.lock().callbacks.get(id).cloned()
    }

    /// Ids currently subscribed to `event`.
    pub fn subscriptions(&self, event: &str) -> Vec<SubscriptionId> {
        self.inner
            .lock()
            .by_event
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().callbacks.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke the callback for `id` outside the registry lock.
    pub fn deliver(&self, id: &SubscriptionId, payload: Value) -> bool {
        let Some(callback) = self.callback(id) else {
            return false;
        };
        callback(payload);
        true
    }
}
