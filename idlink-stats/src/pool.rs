use std::{ops::Add, time::Duration};

use serde::{Deserialize, Serialize};

/// Cumulative pool counters.
///
/// These are updated on every acquire, release and timeout.
#[derive(Debug, Clone, Default, Copy, Serialize, Deserialize)]
pub struct Counts {
    /// Number of transport connections established.
    pub created: usize,
    /// How many times a connection has been given to a caller.
    pub assignments: usize,
    /// Number of connections returned to the idle reservoir.
    pub released: usize,
    /// Number of connections closed instead of pooled, e.g. after
    /// a failed health check or a return to a closed pool.
    pub discarded: usize,
    /// Number of queued acquires that hit the acquire timeout.
    pub timeouts: usize,
    /// Number of failed connection attempts.
    pub connect_errors: usize,
    /// Total time callers spent waiting in line for a connection.
    pub wait_time: Duration,
}

impl Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            created: self.created.saturating_add(rhs.created),
            assignments: self.assignments.saturating_add(rhs.assignments),
            released: self.released.saturating_add(rhs.released),
            discarded: self.discarded.saturating_add(rhs.discarded),
            timeouts: self.timeouts.saturating_add(rhs.timeouts),
            connect_errors: self.connect_errors.saturating_add(rhs.connect_errors),
            wait_time: self.wait_time.saturating_add(rhs.wait_time),
        }
    }
}

/// Point-in-time snapshot of one pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct State {
    /// Connections currently handed out to callers.
    pub acquired: usize,
    /// Connections sitting in the idle reservoir.
    pub idle: usize,
    /// Callers waiting in line for a connection.
    pub pending: usize,
    /// Maximum concurrent acquired connections.
    pub capacity: usize,
    /// Maximum queued waiters.
    pub max_pending: usize,
    /// The pool has been closed.
    pub closed: bool,
    /// How long the oldest queued waiter has been in line.
    pub maxwait: Duration,
    /// Cumulative counters.
    pub counts: Counts,
}
