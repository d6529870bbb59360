//! Connection health checks.

use super::Connection;

/// Decides whether a connection is still usable.
///
/// The predicate is pure, cheap and synchronous; the pool treats the
/// verdict as authoritative and never hands out a connection that
/// failed it.
pub trait HealthCheck: Send + Sync + 'static {
    fn is_healthy(&self, conn: &Connection) -> bool;
}

/// Accepts any connection whose transport is still open.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActiveHealthCheck;

impl HealthCheck for ActiveHealthCheck {
    fn is_healthy(&self, conn: &Connection) -> bool {
        conn.is_open()
    }
}
