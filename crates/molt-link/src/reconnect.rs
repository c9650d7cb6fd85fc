//! Fixed-delay reconnection scheduling.
//!
//! When the transport closes and credentials remain configured, one attempt
//! is scheduled after a fixed delay — deliberately no backoff. A manual
//! `disconnect()` sets the suppression flag so the scheduled attempt does
//! not fire; a manual `connect()` clears it again. At most one attempt is
//! scheduled at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

struct Shared {
    delay: Duration,
    suppressed: AtomicBool,
    scheduled: AtomicBool,
}

/// Schedules reconnect attempts after transport closure.
#[derive(Clone)]
pub struct ReconnectController {
    shared: Arc<Shared>,
}

impl ReconnectController {
    /// Controller with the given fixed delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                delay,
                suppressed: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
            }),
        }
    }

    /// Suppress the next scheduled attempt (manual disconnect intent).
    pub fn suppress(&self) {
        self.shared.suppressed.store(true, Ordering::SeqCst);
    }

    /// Re-arm automatic reconnection (manual connect intent).
    pub fn clear_suppression(&self) {
        self.shared.suppressed.store(false, Ordering::SeqCst);
    }

    /// Whether suppression is currently in force.
    pub fn is_suppressed(&self) -> bool {
        self.shared.suppressed.load(Ordering::SeqCst)
    }

    /// Whether an attempt is currently scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.shared.scheduled.load(Ordering::SeqCst)
    }

    /// Schedule one attempt after the fixed delay.
    ///
    /// Returns `false` without scheduling when suppression is in force or an
    /// attempt is already scheduled. Suppression is re-checked when the
    /// timer fires, so a `disconnect()` between scheduling and firing still
    /// wins.
    pub fn schedule<F, Fut>(&self, attempt: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        if self.shared.suppressed.load(Ordering::SeqCst) {
            debug!("reconnect not scheduled, suppressed");
            return false;
        }
        if self.shared.scheduled.swap(true, Ordering::SeqCst) {
            debug!("reconnect already scheduled");
            return false;
        }

        let shared = Arc::clone(&self.shared);
        drop(tokio::spawn(async move {
            tokio::time::sleep(shared.delay).await;
            shared.scheduled.store(false, Ordering::SeqCst);
            if shared.suppressed.load(Ordering::SeqCst) {
                debug!("scheduled reconnect suppressed before firing");
                return;
            }
            attempt().await;
        }));
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = Arc::clone(&count);
        (count, move || reader.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_fires_after_fixed_delay() {
        let controller = ReconnectController::new(Duration::from_secs(3));
        let (count, fired) = counter();

        assert!(controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(controller.is_scheduled());

        tokio::time::sleep(Duration::from_millis(2_900)).await;
        assert_eq!(fired(), 0, "must not fire early");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired(), 1);
        assert!(!controller.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_one_attempt_scheduled() {
        let controller = ReconnectController::new(Duration::from_secs(1));
        let (count, fired) = counter();

        let count2 = Arc::clone(&count);
        assert!(controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        // Second close while the first timer runs: not scheduled again.
        assert!(!controller.schedule(move || async move {
            let _ = count2.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_suppresses_scheduled_attempt() {
        let controller = ReconnectController::new(Duration::from_secs(1));
        let (count, fired) = counter();

        assert!(controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        // Manual disconnect before the timer fires.
        controller.suppress();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired(), 0, "suppressed attempt must not fire");
        assert!(!controller.is_scheduled());
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_controller_refuses_to_schedule() {
        let controller = ReconnectController::new(Duration::from_secs(1));
        controller.suppress();
        let (count, fired) = counter();

        assert!(!controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_suppression_re_arms() {
        let controller = ReconnectController::new(Duration::from_secs(1));
        controller.suppress();
        controller.clear_suppression();
        assert!(!controller.is_suppressed());

        let (count, fired) = counter();
        assert!(controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_again_after_attempt_completes() {
        let controller = ReconnectController::new(Duration::from_secs(1));
        let (count, fired) = counter();

        let count2 = Arc::clone(&count);
        assert!(controller.schedule(move || async move {
            let _ = count2.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired(), 1);

        // The next closure may schedule a fresh attempt.
        assert!(controller.schedule(move || async move {
            let _ = count.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired(), 2);
    }
}
