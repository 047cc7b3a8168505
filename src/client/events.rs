use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    event: String,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Named-event publish/subscribe bus.
///
/// `publish` invokes a snapshot of the subscribers taken when it starts, so
/// handlers may subscribe or unsubscribe while an event is being delivered.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            event: event.to_string(),
            id,
        }
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&subscription.event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        let removed = list.len() != before;

        if list.is_empty() {
            handlers.remove(&subscription.event);
        }
        removed
    }

    /// Deliver `payload` to every current subscriber of `event`, in
    /// registration order. Returns how many handlers ran.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<EventHandler> = self
            .handlers
            .lock()
            .get(event)
            .map(|list| list.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default();

        for handler in &snapshot {
            handler(payload);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers.lock().get(event).map_or(0, Vec::len)
    }
}
