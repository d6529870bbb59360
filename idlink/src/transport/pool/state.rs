use std::ops::Deref;
use std::time::Duration;

use tokio::time::Instant;

use super::Pool;

/// Point-in-time pool diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct State {
    inner: idlink_stats::State,
}

impl Deref for State {
    type Target = idlink_stats::State;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl State {
    pub(super) fn get(pool: &Pool) -> Self {
        let now = Instant::now();
        let guard = pool.lock();

        State {
            inner: idlink_stats::State {
                acquired: pool.acquired_count(),
                idle: guard.idle.len(),
                pending: guard.pending(),
                capacity: pool.config().capacity(),
                max_pending: pool.config().max_pending(),
                closed: guard.closed,
                maxwait: guard
                    .waiting
                    .front()
                    .map(|waiter| now.duration_since(waiter.enqueued_at))
                    .unwrap_or(Duration::ZERO),
                counts: guard.counts,
            },
        }
    }
}
