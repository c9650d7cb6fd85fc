//! Request correlation.
//!
//! Every outbound request gets a fresh id from a monotonically increasing
//! counter and a pending entry holding the caller's completion handle. The
//! entry leaves the table on exactly one of two paths: a matching response
//! arrives, or the caller's timeout fires and cancels it. Responses with
//! unknown ids — duplicates, or stragglers after a timeout — are dropped.
//!
//! The counter spans the process lifetime; it is not reset on reconnect, so
//! ids never collide across connection instances either.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use molt_core::{ErrorDetail, ResponseFrame};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::LinkError;

/// Outcome delivered to a request's caller.
pub type RequestOutcome = Result<Value, LinkError>;

/// Pending-request table plus the id counter.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<RequestOutcome>>>,
}

impl Correlator {
    /// Empty table, counter starting at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a correlation id and register a pending entry for it.
    ///
    /// The caller awaits the returned receiver (under its own timeout) and
    /// must call [`cancel`](Self::cancel) if the timeout wins.
    pub fn register(&self) -> (String, oneshot::Receiver<RequestOutcome>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.lock().insert(id.clone(), tx);
        (id, rx)
    }

    /// Resolve the pending entry matching a response frame.
    ///
    /// Returns `false` when no entry matches — a duplicate or late frame —
    /// in which case nothing changes and nobody is notified.
    pub fn resolve(&self, response: ResponseFrame) -> bool {
        let Some(tx) = self.pending.lock().remove(&response.id) else {
            debug!(id = %response.id, "response with no pending request dropped");
            return false;
        };

        let outcome = if response.ok {
            Ok(response.payload.unwrap_or(Value::Null))
        } else {
            Err(LinkError::Gateway(
                response.error.unwrap_or_else(|| ErrorDetail {
                    message: "request failed".to_string(),
                    ..ErrorDetail::default()
                }),
            ))
        };

        if tx.send(outcome).is_err() {
            // Caller stopped waiting between our remove and this send.
            warn!(id = %response.id, "request caller gone before delivery");
        }
        true
    }

    /// Remove a pending entry after its timeout fired.
    ///
    /// Returns `false` when the entry was already resolved.
    pub fn cancel(&self, id: &str) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    /// Drop every pending entry.
    ///
    /// Waiting callers observe a closed channel; the engine maps that to
    /// [`LinkError::ConnectionClosed`]. Used only at teardown.
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
