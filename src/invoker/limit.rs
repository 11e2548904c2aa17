//! Bounded in-flight calls for a shared backend.
//!
//! Callers beyond the limit wait in arrival order. Tickets make the queue
//! FIFO; a bare counter would let late arrivals overtake. A permit is an
//! owned value so it can travel with the call onto whichever thread ends up
//! running it, and is released only when that call returns.
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Clone)]
pub struct InvocationLimit {
    shared: Arc<Shared>,
}

struct Shared {
    limit: usize,
    queue: Mutex<Queue>,
    turn: Condvar,
}

#[derive(Default)]
struct Queue {
    next_ticket: u64,
    serving: u64,
    in_flight: usize,
}

/// Held for the duration of one backend call.
pub struct InvocationPermit {
    shared: Arc<Shared>,
}

impl InvocationLimit {
    /// `limit` is clamped to at least one.
    pub fn new(limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                limit: limit.max(1),
                queue: Mutex::new(Queue::default()),
                turn: Condvar::new(),
            }),
        }
    }

    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Block until this caller's turn comes and a slot is free.
    pub fn acquire(&self) -> InvocationPermit {
        let shared = &self.shared;
        let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = queue.next_ticket;
        queue.next_ticket += 1;
        while ticket != queue.serving || queue.in_flight >= shared.limit {
            queue = shared
                .turn
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
        queue.serving += 1;
        queue.in_flight += 1;
        // The next ticket may be admissible right away.
        shared.turn.notify_all();
        InvocationPermit {
            shared: Arc::clone(shared),
        }
    }

    /// Callers holding a ticket that has not been admitted yet.
    #[cfg(test)]
    fn waiting(&self) -> u64 {
        let queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.next_ticket - queue.serving
    }
}

impl Drop for InvocationPermit {
    fn drop(&mut self) {
        let mut queue = self
            .shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        queue.in_flight -= 1;
        self.shared.turn.notify_all();
    }
}
