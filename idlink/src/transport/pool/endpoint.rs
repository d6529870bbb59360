//! Resolver endpoint addressing.

use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use super::Error;

/// A resolved remote address.
///
/// Used as the key into the pool map; equality and hashing are over
/// the resolved address bytes, not the hostname it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    /// Resolve a host and port into an endpoint. The first resolved
    /// address wins.
    pub fn resolve(host: &str, port: u16) -> Result<Self, Error> {
        let mut addrs = (host, port).to_socket_addrs()?;

        match addrs.next() {
            Some(addr) => Ok(Self { addr }),
            None => Err(Error::ConnectFailed(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address found for \"{}:{}\"", host, port),
            ))),
        }
    }

    /// The resolved socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}
