//! Manage connections to resolver endpoints.

pub mod config;
pub mod connection;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod guard;
pub mod handler;
pub mod healthcheck;
pub mod idle;
pub mod inner;
pub mod map;
pub mod pool_impl;
pub mod state;
pub mod waiting;

pub use config::{Config, SelectionOrder, TimeoutAction};
pub use connection::Connection;
pub use connector::{Connector, TcpConnector};
pub use endpoint::Endpoint;
pub use error::Error;
pub use guard::Guard;
pub use handler::{LogHandler, PoolHandler};
pub use healthcheck::{ActiveHealthCheck, HealthCheck};
pub use map::PoolMap;
pub use pool_impl::{Builder, Pool, PoolConfig};
pub use state::State;

use idle::Idle;
use waiting::Waiter;

#[cfg(test)]
pub mod test;
