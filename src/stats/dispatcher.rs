//! Synchronous in-process event fan-out.
//!
//! Not a message bus: there is no queue, retry, or backpressure. `publish`
//! invokes every subscribed handler on the caller's stack, in subscription
//! order, before returning — so a write request observes its own statistics
//! update on the very next read. A panicking handler is not isolated from
//! the publisher.

use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::domain::events::ContentEvent;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "stats::dispatcher";

/// A subscriber interested in domain events.
pub trait EventHandler: Send + Sync {
    /// Stable name for logging.
    fn label(&self) -> &'static str;

    fn on_event(&self, event: &ContentEvent);
}

/// In-process publish/subscribe over [`ContentEvent`].
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler; delivery follows subscription order.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        debug!(handler = handler.label(), "Stats event handler subscribed");
        rw_write(&self.handlers, SOURCE, "subscribe").push(handler);
    }

    /// Deliver `event` to every handler, synchronously, in order.
    pub fn publish(&self, event: &ContentEvent) {
        let handlers = rw_read(&self.handlers, SOURCE, "publish").clone();
        debug!(
            event_kind = event.kind_label(),
            handler_count = handlers.len(),
            "Dispatching stats event"
        );
        for handler in handlers {
            handler.on_event(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        rw_read(&self.handlers, SOURCE, "handler_count").len()
    }
}
