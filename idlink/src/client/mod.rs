//! Thin client layer above the transport pool.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::config::Config;
use crate::transport::pool::{self, Endpoint, Guard, Pool, PoolMap, TcpConnector};

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Pool(#[from] pool::Error),

    #[error("{0}")]
    Config(#[from] crate::config::Error),
}

/// Hands out clients that share one connection pool per endpoint.
///
/// Owns the pool map and a background sweeper that evicts per-endpoint
/// pools nobody has used for a while. Must be created inside a tokio
/// runtime.
pub struct ClientFactory {
    config: Config,
    pools: Arc<PoolMap>,
    sweeper: JoinHandle<()>,
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("pools", &self.pools)
            .finish()
    }
}

impl ClientFactory {
    /// New factory from a loaded configuration.
    pub fn new(config: Config) -> Result<Self, Error> {
        let pool_config = config.pool_config()?;
        let connector = Arc::new(TcpConnector {
            nodelay: config.general.tcp_nodelay,
        });

        let pools = Arc::new(PoolMap::new(move |endpoint| {
            Pool::builder(endpoint)
                .config(pool_config)
                .connector(connector.clone())
                .build()
        }));

        let sweeper = Self::sweeper(
            pools.clone(),
            config.sweep_interval(),
            config.pool_idle_timeout(),
        );

        Ok(Self {
            config,
            pools,
            sweeper,
        })
    }

    /// Client bound to one endpoint.
    pub fn client(&self, endpoint: Endpoint) -> Client {
        Client {
            pool: self.pools.get(endpoint),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pools(&self) -> &PoolMap {
        &self.pools
    }

    /// Close every pool.
    pub fn shutdown(&self) {
        info!("shutting down {} pool(s)", self.pools.len());
        self.pools.shutdown();
    }

    fn sweeper(pools: Arc<PoolMap>, every: Duration, idle_threshold: Duration) -> JoinHandle<()> {
        // interval() panics on a zero period.
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut tick = interval(every);
            tick.tick().await; // the first tick fires immediately

            loop {
                tick.tick().await;
                let evicted = pools.sweep(idle_threshold);

                if evicted > 0 {
                    debug!("swept {} idle pool(s)", evicted);
                }
            }
        })
    }
}

impl Drop for ClientFactory {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// A client bound to one resolver endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    pool: Pool,
}

impl Client {
    /// Check out a transport connection. It returns to the pool when
    /// the guard is dropped.
    pub async fn connection(&self) -> Result<Guard, Error> {
        Ok(self.pool.get().await?)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.pool.endpoint()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}
