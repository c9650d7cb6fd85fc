//! Server-pushed event routing.
//!
//! Maps event names to ordered subscriber lists. Delivery clones the payload
//! into each subscriber's channel in subscription order; a subscriber whose
//! receiver is gone is pruned without disturbing the others. Unknown event
//! names route to nobody — that is not an error.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Identity handle for one subscription, used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<Value>,
}

/// Event-name → subscriber registry.
pub struct EventRouter {
    next_id: std::sync::atomic::AtomicU64,
    subscriptions: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl EventRouter {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            next_id: std::sync::atomic::AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a subscriber for an event name.
    ///
    /// Returns the removal handle and the payload stream. Subscribers for
    /// the same name are invoked in registration order.
    pub fn subscribe(&self, event: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<Value>) {
        let id = SubscriptionId(
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Remove one subscriber by identity.
    ///
    /// Returns `false` when the handle does not match a live subscription.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let Some(list) = subscriptions.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() < before;
        if list.is_empty() {
            let _ = subscriptions.remove(event);
        }
        removed
    }

    /// Deliver an event payload to every subscriber of its name.
    ///
    /// Returns the number of subscribers reached. Dead subscribers are
    /// pruned as a side effect.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let Some(list) = subscriptions.get_mut(event) else {
            debug!(event, "event with no subscribers");
            return 0;
        };

        let mut delivered = 0;
        list.retain(|subscriber| {
            if subscriber.tx.send(payload.clone()).is_ok() {
                delivered += 1;
                true
            } else {
                debug!(event, "pruning dead subscriber");
                false
            }
        });
        if list.is_empty() {
            let _ = subscriptions.remove(event);
        }
        delivered
    }

    /// Drop every subscription. Used at teardown.
    pub fn clear(&self) {
        self.subscriptions.lock().clear();
    }

    /// Total live subscriptions across all event names.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().values().map(Vec::len).sum()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
