//! Cooperative cancellation shared by the ingestion and reporting loops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Granularity of interruptible sleeps; bounds shutdown latency.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Cancellation token checked at the line-wait and sleep-interval
/// boundaries of both loops. Cloning shares the underlying flag.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the token. Safe to call from a signal handler thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps up to `total`, waking early once the token is tripped.
    pub fn sleep(&self, total: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO && !self.is_cancelled() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}
