//! Named-event handler registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// An event callback. Receives the full message payload as JSON.
pub type Handler = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Handlers per event name, in registration order.
    handlers: HashMap<String, Vec<(u64, Handler)>>,
}

/// Deduplicated event-handler registry keyed by wire event name.
///
/// Any number of handlers may be registered per event; each is invoked
/// independently for every occurrence. Designed to be shared via `Arc`
/// between the connection task (which dispatches) and UI code (which
/// subscribes).
#[derive(Default)]
pub struct SubscriptionManager {
    registry: Mutex<Registry>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event name.
    ///
    /// The returned [`Subscription`] removes exactly this handler
    /// instance; other handlers for the same event are untouched.
    pub fn subscribe<F>(self: &Arc<Self>, event: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut registry = self.registry.lock().expect("subscription registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .handlers
            .entry(event.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            manager: Arc::clone(self),
            event,
            id,
            active: AtomicBool::new(true),
        }
    }

    /// Invoke every handler currently registered for `event`, exactly
    /// once each, in registration order.
    pub fn dispatch(&self, event: &str, payload: &serde_json::Value) {
        // Clone the handler list out so callbacks can subscribe or
        // unsubscribe without deadlocking.
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().expect("subscription registry poisoned");
            match registry.handlers.get(event) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };

        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of handlers registered for an event.
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry
            .lock()
            .expect("subscription registry poisoned")
            .handlers
            .get(event)
            .map_or(0, Vec::len)
    }

    fn remove(&self, event: &str, id: u64) {
        let mut registry = self.registry.lock().expect("subscription registry poisoned");
        if let Some(list) = registry.handlers.get_mut(event) {
            list.retain(|(entry_id, _)| *entry_id != id);
            if list.is_empty() {
                registry.handlers.remove(event);
            }
        }
    }
}

/// Handle tying a registered handler to UI component lifetime.
///
/// Unsubscribes on drop; calling [`unsubscribe`](Self::unsubscribe)
/// earlier (or repeatedly) is an idempotent no-op after the first call.
pub struct Subscription {
    manager: Arc<SubscriptionManager>,
    event: String,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Remove this handler from the registry.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            self.manager.remove(&self.event, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
