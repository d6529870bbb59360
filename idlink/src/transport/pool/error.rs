//! Pool errors.

use thiserror::Error;

use super::Connection;

/// Errors surfaced to pool callers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("pool is closed")]
    PoolClosed,

    #[error("too many outstanding acquire operations")]
    TooManyOutstanding,

    #[error("acquire operation took longer than the configured maximum time")]
    AcquireTimeout,

    /// The connection is handed back untouched so the caller can
    /// release it to the pool that actually owns it.
    #[error("connection was released to a pool that does not own it")]
    WrongPool(Connection),

    #[error("connect: {0}")]
    ConnectFailed(#[from] std::io::Error),

    #[error("connection failed the health check")]
    UnhealthyConnection,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(&'static str),
}
