//! Pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Error;

/// What to do with a waiter whose acquire timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutAction {
    /// Fail the waiter.
    Fail,
    /// Open a fresh connection for it, letting the pool exceed its
    /// capacity until the extra connections are released.
    New,
}

/// Which idle connection to hand out next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionOrder {
    /// Most recently returned first.
    #[default]
    Lifo,
    /// Oldest first.
    Fifo,
}

/// Validated pool configuration.
///
/// Constructed through [`Config::builder`]; a `Config` in hand always
/// satisfies the constructor invariants, so pool creation itself never
/// fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    capacity: usize,
    max_pending: usize,
    acquire_timeout: Option<Duration>,
    timeout_action: Option<TimeoutAction>,
    release_health_check: bool,
    selection_order: SelectionOrder,
}

impl Config {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Maximum concurrent acquired connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum queued waiters.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// How long a waiter may sit in line before the timeout action
    /// applies. `None` disables the timeout machinery entirely.
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout
    }

    pub fn timeout_action(&self) -> Option<TimeoutAction> {
        self.timeout_action
    }

    /// Vet connections before returning them to the reservoir.
    pub fn release_health_check(&self) -> bool {
        self.release_health_check
    }

    pub fn selection_order(&self) -> SelectionOrder {
        self.selection_order
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 10,
            max_pending: usize::MAX,
            acquire_timeout: None,
            timeout_action: None,
            release_health_check: true,
            selection_order: SelectionOrder::Lifo,
        }
    }
}

/// Builds and validates a pool configuration.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = max_pending;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = Some(timeout);
        self
    }

    pub fn timeout_action(mut self, action: TimeoutAction) -> Self {
        self.config.timeout_action = Some(action);
        self
    }

    pub fn release_health_check(mut self, check: bool) -> Self {
        self.config.release_health_check = check;
        self
    }

    pub fn selection_order(mut self, order: SelectionOrder) -> Self {
        self.config.selection_order = order;
        self
    }

    pub fn build(self) -> Result<Config, Error> {
        let config = self.config;

        if config.capacity == 0 {
            return Err(Error::InvalidConfig("capacity must be positive"));
        }

        if config.max_pending == 0 {
            return Err(Error::InvalidConfig("max_pending must be positive"));
        }

        match (config.acquire_timeout, config.timeout_action) {
            (Some(_), None) => Err(Error::InvalidConfig(
                "acquire_timeout requires a timeout_action",
            )),
            (None, Some(_)) => Err(Error::InvalidConfig(
                "timeout_action requires an acquire_timeout",
            )),
            _ => Ok(config),
        }
    }
}
