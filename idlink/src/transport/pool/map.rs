//! Per-endpoint pool map.

use std::fmt;
use std::time::Duration;

use fnv::FnvHashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{Endpoint, Pool};

/// Lazily materialises one pool per remote endpoint.
///
/// Lookups that miss install a pool built by the supplied factory;
/// concurrent lookups for the same endpoint observe the same instance.
/// A closed pool is never handed out: a closed entry is replaced on
/// the next lookup.
pub struct PoolMap {
    pools: Mutex<FnvHashMap<Endpoint, Pool>>,
    factory: Box<dyn Fn(Endpoint) -> Pool + Send + Sync>,
}

impl fmt::Debug for PoolMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolMap")
            .field("pools", &self.pools.lock().len())
            .finish()
    }
}

impl PoolMap {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(Endpoint) -> Pool + Send + Sync + 'static,
    {
        Self {
            pools: Mutex::new(FnvHashMap::default()),
            factory: Box::new(factory),
        }
    }

    /// Get the pool for an endpoint, installing one on first use.
    pub fn get(&self, endpoint: Endpoint) -> Pool {
        if let Some(pool) = self.lookup(&endpoint) {
            return pool;
        }

        // Construct outside the lock; the factory may be slow. Races
        // are settled by insert-if-absent below.
        let fresh = (self.factory)(endpoint);

        let existing = {
            let mut pools = self.pools.lock();

            match pools.get(&endpoint) {
                Some(pool) if !pool.is_closed() => Some(pool.clone()),
                _ => {
                    pools.insert(endpoint, fresh.clone());
                    None
                }
            }
        };

        match existing {
            Some(winner) => {
                // Lost the install race; discard our instance cleanly.
                fresh.close_async();
                winner
            }
            None => fresh,
        }
    }

    fn lookup(&self, endpoint: &Endpoint) -> Option<Pool> {
        let pools = self.pools.lock();
        pools.get(endpoint).filter(|pool| !pool.is_closed()).cloned()
    }

    /// Evict and close the pool for an endpoint.
    pub fn remove(&self, endpoint: &Endpoint) {
        let removed = self.pools.lock().remove(endpoint);

        if let Some(pool) = removed {
            debug!("evicting pool [{}]", endpoint);
            pool.close_async();
        }
    }

    /// Evict pools that have sat unused for longer than
    /// `idle_threshold` with nothing checked out and nobody waiting.
    /// Returns how many were evicted.
    pub fn sweep(&self, idle_threshold: Duration) -> usize {
        let now = Instant::now();

        let victims: Vec<Pool> = {
            let mut pools = self.pools.lock();

            let doomed: Vec<Endpoint> = pools
                .iter()
                .filter(|(_, pool)| pool.evictable(now, idle_threshold))
                .map(|(endpoint, _)| *endpoint)
                .collect();

            doomed
                .iter()
                .filter_map(|endpoint| pools.remove(endpoint))
                .collect()
        };

        let evicted = victims.len();

        for pool in victims {
            debug!("sweeping idle pool [{}]", pool.endpoint());
            pool.close_async();
        }

        evicted
    }

    /// Close every pool and clear the map.
    pub fn shutdown(&self) {
        let pools: Vec<Pool> = self.pools.lock().drain().map(|(_, pool)| pool).collect();

        for pool in pools {
            pool.close_async();
        }
    }

    /// Snapshot of every pool currently in the map.
    pub fn all(&self) -> Vec<Pool> {
        self.pools.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}
