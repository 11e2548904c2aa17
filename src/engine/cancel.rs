use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Cooperative cancellation flag, checked by the orchestrator between
/// attempts. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Trip the token once `budget` has elapsed. The timer thread is
    /// detached; a run that finishes first simply never observes it.
    pub fn cancel_after(&self, budget: Duration) {
        let token = self.clone();
        thread::spawn(move || {
            thread::sleep(budget);
            tracing::warn!(budget_ms = budget.as_millis() as u64, "run budget exhausted");
            token.cancel();
        });
    }
}
