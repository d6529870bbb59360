//! Pooled transport connections.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use super::Endpoint;

static ID_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(1));

fn next_conn_id() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// An owned, bidirectional byte stream bound to one endpoint.
///
/// Connections are created by a connector on behalf of a pool and carry
/// the identity of that pool; releasing one to a different pool is
/// rejected without touching either pool's accounting.
pub struct Connection {
    id: u64,
    endpoint: Endpoint,
    pool: u64,
    stream: Option<TcpStream>,
    open: bool,
    broken: bool,
    created_at: Instant,
}

impl Connection {
    /// New connection over an established TCP stream.
    pub fn connected(endpoint: Endpoint, stream: TcpStream) -> Self {
        Self {
            id: next_conn_id(),
            endpoint,
            pool: 0,
            stream: Some(stream),
            open: true,
            broken: false,
            created_at: Instant::now(),
        }
    }

    /// Unique connection identifier, monotonic per process.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The endpoint this connection is bound to.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Identity of the pool this connection belongs to.
    pub(crate) fn pool(&self) -> u64 {
        self.pool
    }

    /// Record the pool this connection belongs to.
    pub(crate) fn bind(&mut self, pool: u64) {
        self.pool = pool;
    }

    /// How long the connection has been open.
    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created_at)
    }

    /// The transport is open and nobody has flagged it as broken.
    pub fn is_open(&self) -> bool {
        self.open && !self.broken
    }

    /// Flag the transport as unusable; the pool will close it instead
    /// of recycling it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Access to the underlying stream for protocol I/O.
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }

    /// Gracefully shut the transport down.
    pub(crate) async fn close(mut self) {
        self.open = false;

        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(
                    "connection {} shutdown: {} [{}]",
                    self.id, err, self.endpoint
                );
            }
        }
    }

    /// Connection with no transport behind it.
    #[cfg(test)]
    pub(crate) fn detached(endpoint: Endpoint) -> Self {
        Self {
            id: next_conn_id(),
            endpoint,
            pool: 0,
            stream: None,
            open: true,
            broken: false,
            created_at: Instant::now(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .finish()
    }
}
