//! Queued acquire operations.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::oneshot::{Receiver, Sender};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::{Connection, Error, Pool};

static WAITER_ID: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_waiter_id() -> u64 {
    WAITER_ID.fetch_add(1, Ordering::SeqCst)
}

/// One queued waiter, owned by the pool.
pub(super) struct Waiter {
    pub(super) id: u64,
    pub(super) enqueued_at: Instant,
    /// Only consulted when the pool runs with an acquire timeout.
    pub(super) deadline: Instant,
    /// Set once the waiter has reserved a slot in the acquired count.
    /// Monotonic: raising it increments the counter exactly once.
    acquired: bool,
    timer: Option<AbortHandle>,
    tx: Sender<Result<Connection, Error>>,
}

impl Waiter {
    pub(super) fn new(
        id: u64,
        enqueued_at: Instant,
        deadline: Instant,
        tx: Sender<Result<Connection, Error>>,
    ) -> Self {
        Self {
            id,
            enqueued_at,
            deadline,
            acquired: false,
            timer: None,
            tx,
        }
    }

    /// Reserve a slot in the acquired count. Must be called while
    /// holding the pool lock; idempotent.
    pub(super) fn raise_acquired(&mut self, count: &AtomicUsize) {
        if !self.acquired {
            count.fetch_add(1, Ordering::SeqCst);
            self.acquired = true;
        }
    }

    pub(super) fn acquired(&self) -> bool {
        self.acquired
    }

    pub(super) fn set_timer(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    pub(super) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Deliver the result. A connection whose caller is gone is handed
    /// back so the pool can recycle it.
    pub(super) fn send(mut self, result: Result<Connection, Error>) -> Option<Connection> {
        self.cancel_timer();

        match self.tx.send(result) {
            Ok(()) => None,
            Err(Ok(conn)) => Some(conn),
            Err(Err(_)) => None,
        }
    }
}

/// Caller side of an in-flight acquire.
///
/// N.B. You must call and await [`Waiting::wait`]. Dropping the value
/// before completion removes the waiter from the queue; a connection
/// that was already delivered into the channel is released back to
/// the pool, so abandoning the future never leaks a slot.
pub(super) struct Waiting {
    pool: Pool,
    rx: Option<Receiver<Result<Connection, Error>>>,
    id: u64,
    queued: bool,
    waiting: bool,
}

impl Drop for Waiting {
    fn drop(&mut self) {
        if !self.waiting {
            return;
        }

        if self.queued {
            self.pool.cancel_waiter(self.id);
        }

        if let Some(mut rx) = self.rx.take() {
            // Close first: a send racing with this drop bounces back
            // to the pool instead of landing in a dead channel.
            rx.close();

            if let Ok(Ok(conn)) = rx.try_recv() {
                let _ = self.pool.release(conn);
            }
        }
    }
}

impl Waiting {
    pub(super) fn new(
        pool: Pool,
        id: u64,
        queued: bool,
        rx: Receiver<Result<Connection, Error>>,
    ) -> Self {
        Self {
            pool,
            rx: Some(rx),
            id,
            queued,
            waiting: true,
        }
    }

    /// Wait for a connection from the pool.
    pub(super) async fn wait(&mut self) -> Result<Connection, Error> {
        let rx = self.rx.as_mut().expect("waiter rx taken");

        // Can be cancelled. Drop will remove the waiter from the queue
        // and recycle a connection that raced into the channel.
        let result = rx.await;

        // Disarm the guard. We can't be cancelled beyond this point.
        self.waiting = false;

        match result {
            Ok(result) => result,
            // The sender vanished without a result, which means the
            // pool was torn down mid-flight.
            Err(_) => Err(Error::PoolClosed),
        }
    }
}
