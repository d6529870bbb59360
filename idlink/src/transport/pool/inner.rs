//! Pool internals synchronized with a mutex.

use std::collections::VecDeque;

use idlink_stats::Counts;
use tokio::time::Instant;

use super::{Config, Idle, Waiter};

/// Pool internals protected by a mutex. The lock serialises every
/// state transition, so none of the fields need their own
/// synchronization.
pub(super) struct Inner {
    /// Idle connections, ordered for removal per the pool's
    /// selection order.
    pub(super) idle: Idle,
    /// Queued acquire operations, oldest first.
    pub(super) waiting: VecDeque<Waiter>,
    /// Set once by close; never cleared.
    pub(super) closed: bool,
    /// Updated on every acquire and release; drives pool-map eviction.
    pub(super) last_active: Instant,
    /// Cumulative counters.
    pub(super) counts: Counts,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("idle", &self.idle.len())
            .field("waiting", &self.waiting.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Inner {
    pub(super) fn new(config: &Config) -> Self {
        Self {
            idle: Idle::new(config.selection_order()),
            waiting: VecDeque::new(),
            closed: false,
            last_active: Instant::now(),
            counts: Counts::default(),
        }
    }

    /// Number of queued waiters.
    #[inline]
    pub(super) fn pending(&self) -> usize {
        self.waiting.len()
    }

    /// Record caller activity for the pool-map sweeper.
    #[inline]
    pub(super) fn touch(&mut self, now: Instant) {
        self.last_active = now;
    }

    /// Remove a queued waiter, e.g. because its caller gave up.
    pub(super) fn remove_waiter(&mut self, id: u64) -> Option<Waiter> {
        if let Some(waiter) = self.waiting.pop_front() {
            if waiter.id == id {
                return Some(waiter);
            }

            // Put me back.
            self.waiting.push_front(waiter);

            // Slow search, but we should be somewhere towards the front
            // if the runtime is doing scheduling correctly.
            for (i, waiter) in self.waiting.iter().enumerate() {
                if waiter.id == id {
                    return self.waiting.remove(i);
                }
            }
        }

        None
    }

    /// Pop waiters whose deadline has passed off the head of the
    /// queue. Later waiters have later deadlines, so the walk stops at
    /// the first live one.
    pub(super) fn pop_expired(&mut self, now: Instant) -> Vec<Waiter> {
        let mut expired = Vec::new();

        loop {
            match self.waiting.front() {
                Some(head) if head.deadline <= now => {
                    if let Some(waiter) = self.waiting.pop_front() {
                        expired.push(waiter);
                    }
                }
                _ => break,
            }
        }

        expired
    }

    /// Fail every queued waiter and empty the queue.
    pub(super) fn drain_waiters(&mut self) -> Vec<Waiter> {
        self.waiting.drain(..).collect()
    }
}
