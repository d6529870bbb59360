//! SDK configuration.

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::transport::pool::{self, SelectionOrder, TimeoutAction};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("config parse: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Pool(#[from] pool::Error),
}

/// idlink.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub general: General,
}

/// `[general]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct General {
    /// Maximum concurrent connections per endpoint.
    pub pool_size: usize,
    /// Maximum queued acquires per endpoint.
    pub max_pending: usize,
    /// How long an acquire may wait, in milliseconds. -1 disables the
    /// timeout machinery.
    pub acquire_timeout: i64,
    /// What to do with waiters that hit the timeout.
    pub timeout_action: Option<TimeoutAction>,
    /// Vet connections before returning them to the pool.
    pub release_health_check: bool,
    /// Which idle connection to hand out next.
    pub selection_order: SelectionOrder,
    /// Set TCP_NODELAY on new connections.
    pub tcp_nodelay: bool,
    /// How often to sweep unused per-endpoint pools, in milliseconds.
    pub sweep_interval: u64,
    /// Evict pools that have been unused for longer than this,
    /// in milliseconds.
    pub pool_idle_timeout: u64,
}

impl Default for General {
    fn default() -> Self {
        Self {
            pool_size: 4,
            max_pending: 10_000,
            acquire_timeout: 5_000,
            timeout_action: Some(TimeoutAction::Fail),
            release_health_check: true,
            selection_order: SelectionOrder::Lifo,
            tcp_nodelay: true,
            sweep_interval: 60_000,
            pool_idle_timeout: 300_000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file falls back
    /// to defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();

        let config: Config = match read_to_string(path) {
            Ok(raw) => {
                let config = toml::from_str(&raw)?;
                info!("loaded \"{}\"", path.display());
                config
            }
            Err(_) => {
                warn!(
                    "\"{}\" doesn't exist, loading defaults instead",
                    path.display()
                );
                Config::default()
            }
        };

        // Surface bad pool settings now rather than on first use.
        config.pool_config()?;

        Ok(config)
    }

    /// Pool settings for one endpoint, validated.
    pub fn pool_config(&self) -> Result<pool::Config, pool::Error> {
        let general = &self.general;

        let mut builder = pool::Config::builder()
            .capacity(general.pool_size)
            .max_pending(general.max_pending)
            .release_health_check(general.release_health_check)
            .selection_order(general.selection_order);

        if general.acquire_timeout >= 0 {
            builder = builder.acquire_timeout(Duration::from_millis(general.acquire_timeout as u64));
        }

        if let Some(action) = general.timeout_action {
            builder = builder.timeout_action(action);
        }

        builder.build()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.general.sweep_interval)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.general.pool_idle_timeout)
    }
}
