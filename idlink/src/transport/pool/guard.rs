//! Checked-out connection guard.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::{Connection, Pool};

/// A checked-out connection that returns itself to its pool on drop.
pub struct Guard {
    conn: Option<Connection>,
    pool: Pool,
}

impl Guard {
    pub(crate) fn new(pool: Pool, conn: Connection) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// Take the connection out, leaving the guard inert. The caller
    /// becomes responsible for releasing it.
    pub fn detach(mut self) -> Connection {
        self.conn.take().expect("guard connection taken")
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").field("conn", &self.conn).finish()
    }
}

impl Deref for Guard {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("guard connection taken")
    }
}

impl DerefMut for Guard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("guard connection taken")
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(err) = self.pool.release(conn) {
                debug!(
                    "connection discarded on release: {} [{}]",
                    err,
                    self.pool.endpoint()
                );
            }
        }
    }
}
