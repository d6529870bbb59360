//! Establishing new transport connections.

use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tracing::debug;

use super::{Connection, Endpoint, Error};

/// Establishes one new transport connection to a remote endpoint.
///
/// Stateless: no retries, no timeouts of its own. All I/O runs on the
/// caller's task; the pool only sees the completed result.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<Connection, Error>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    pub nodelay: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<Connection, Error>> {
        let nodelay = self.nodelay;

        Box::pin(async move {
            let stream = TcpStream::connect(endpoint.addr()).await?;

            if nodelay {
                stream.set_nodelay(true)?;
            }

            debug!("connected to [{}]", endpoint);

            Ok(Connection::connected(endpoint, stream))
        })
    }
}
