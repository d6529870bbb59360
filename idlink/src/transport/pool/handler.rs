//! Pool lifecycle callbacks.

use tracing::debug;

use super::Connection;

/// Observes connection state transitions in a pool.
///
/// `on_created` fires once per connection, before its first
/// `on_acquired`; `on_acquired` and `on_released` alternate strictly
/// for as long as the connection cycles through the pool.
///
/// Callbacks may run while the pool's internal lock is held; they must
/// not call back into the pool.
pub trait PoolHandler: Send + Sync + 'static {
    fn on_created(&self, _conn: &Connection) {}
    fn on_acquired(&self, _conn: &Connection) {}
    fn on_released(&self, _conn: &Connection) {}
}

/// Default handler: trace the transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl PoolHandler for LogHandler {
    fn on_created(&self, conn: &Connection) {
        debug!("connection {} created [{}]", conn.id(), conn.endpoint());
    }

    fn on_acquired(&self, conn: &Connection) {
        debug!("connection {} acquired [{}]", conn.id(), conn.endpoint());
    }

    fn on_released(&self, conn: &Connection) {
        debug!("connection {} released [{}]", conn.id(), conn.endpoint());
    }
}
