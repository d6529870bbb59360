//! Fixed-capacity connection pool.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::{lock_api::MutexGuard, Mutex, RawMutex};
use tokio::sync::oneshot::channel;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

use super::inner::Inner;
use super::waiting::{next_waiter_id, Waiter, Waiting};
use super::{
    ActiveHealthCheck, Config, Connection, Connector, Endpoint, Error, Guard, HealthCheck,
    LogHandler, PoolHandler, State, TcpConnector, TimeoutAction,
};

static ID_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

fn next_pool_id() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Connection pool for one endpoint.
///
/// Caps concurrent checked-out connections at the configured capacity
/// and queues callers beyond it, serving them oldest-first as slots
/// free up.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<InnerSync>,
}

pub(crate) struct InnerSync {
    pub(super) endpoint: Endpoint,
    pub(super) inner: Mutex<Inner>,
    pub(super) id: u64,
    pub(super) config: Config,
    /// Connections currently handed out. Mutated only under the lock,
    /// readable from any thread for diagnostics.
    pub(super) acquired: AtomicUsize,
    connector: Arc<dyn Connector>,
    health: Arc<dyn HealthCheck>,
    handler: Arc<dyn PoolHandler>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("endpoint", &self.inner.endpoint)
            .finish()
    }
}

/// Everything needed to build a pool with the default collaborators.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub endpoint: Endpoint,
    pub config: Config,
}

/// Assembles a pool, optionally swapping out the connector, the
/// health check or the lifecycle handler.
pub struct Builder {
    endpoint: Endpoint,
    config: Config,
    connector: Arc<dyn Connector>,
    health: Arc<dyn HealthCheck>,
    handler: Arc<dyn PoolHandler>,
}

impl Builder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn health_check(mut self, health: Arc<dyn HealthCheck>) -> Self {
        self.health = health;
        self
    }

    pub fn handler(mut self, handler: Arc<dyn PoolHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn build(self) -> Pool {
        Pool {
            inner: Arc::new(InnerSync {
                endpoint: self.endpoint,
                inner: Mutex::new(Inner::new(&self.config)),
                id: next_pool_id(),
                config: self.config,
                acquired: AtomicUsize::new(0),
                connector: self.connector,
                health: self.health,
                handler: self.handler,
            }),
        }
    }
}

impl Pool {
    /// New pool with the plain TCP connector and default collaborators.
    pub fn new(config: &PoolConfig) -> Self {
        Self::builder(config.endpoint).config(config.config).build()
    }

    pub fn builder(endpoint: Endpoint) -> Builder {
        Builder {
            endpoint,
            config: Config::default(),
            connector: Arc::new(TcpConnector::default()),
            health: Arc::new(ActiveHealthCheck),
            handler: Arc::new(LogHandler),
        }
    }

    /// Acquire a connection, waiting in line if the pool is at
    /// capacity. Callers are served from the idle reservoir first; a
    /// new connection is only opened on a miss.
    ///
    /// The completion sink is durable: a caller that walks away from
    /// this future does not cancel the pool's work, and a connection
    /// produced for it is recycled.
    pub async fn acquire(&self) -> Result<Connection, Error> {
        let config = &self.inner.config;

        let mut waiting = {
            let mut guard = self.lock();

            if guard.closed {
                return Err(Error::PoolClosed);
            }

            let now = Instant::now();
            guard.touch(now);

            if self.acquired_count() < config.capacity() {
                // A free slot: reserve it and drive the acquisition
                // right away, reservoir first.
                let (tx, rx) = channel();
                let id = next_waiter_id();

                let mut task = Waiter::new(id, now, now, tx);
                task.raise_acquired(&self.inner.acquired);
                self.serve(&mut guard, task);

                Waiting::new(self.clone(), id, false, rx)
            } else if guard.pending() < config.max_pending() {
                let (tx, rx) = channel();
                let id = next_waiter_id();
                let timeout = config.acquire_timeout();
                let deadline = now + timeout.unwrap_or_default();

                let mut waiter = Waiter::new(id, now, deadline, tx);
                if timeout.is_some() {
                    waiter.set_timer(self.spawn_timer(deadline));
                }

                guard.waiting.push_back(waiter);
                Waiting::new(self.clone(), id, true, rx)
            } else {
                return Err(Error::TooManyOutstanding);
            }
        };

        waiting.wait().await
    }

    /// Acquire wrapped in a guard that releases on drop.
    pub async fn get(&self) -> Result<Guard, Error> {
        Ok(Guard::new(self.clone(), self.acquire().await?))
    }

    /// Check a connection back into the pool, waking the oldest waiter
    /// if the freed slot can serve it.
    ///
    /// A connection that belongs to a different pool is rejected
    /// without touching any counters.
    pub fn release(&self, conn: Connection) -> Result<(), Error> {
        if conn.pool() != self.inner.id {
            return Err(Error::WrongPool(conn));
        }

        let mut guard = self.lock();

        if guard.closed {
            tokio::spawn(conn.close());
            return Err(Error::PoolClosed);
        }

        guard.touch(Instant::now());

        if self.inner.config.release_health_check() && !self.inner.health.is_healthy(&conn) {
            debug!(
                "discarding unhealthy connection {} [{}]",
                conn.id(),
                self.inner.endpoint
            );
            guard.counts.discarded += 1;
            tokio::spawn(conn.close());
        } else {
            self.inner.handler.on_released(&conn);
            guard.counts.released += 1;
            guard.idle.offer(conn);
        }

        self.decrement_and_dispatch(&mut guard);

        Ok(())
    }

    /// Close the pool: fail queued waiters, zero the counters and hand
    /// the idle reservoir to a separate task for physical teardown.
    /// The returned handle resolves once teardown is done.
    pub fn close_async(&self) -> JoinHandle<()> {
        let idle = {
            let mut guard = self.lock();

            if guard.closed {
                Vec::new()
            } else {
                debug!("closing pool [{}]", self.inner.endpoint);
                guard.closed = true;

                for waiter in guard.drain_waiters() {
                    waiter.send(Err(Error::PoolClosed));
                }

                // Checked-out connections are not chased down; their
                // release will observe the closed flag.
                self.inner.acquired.store(0, Ordering::SeqCst);
                guard.idle.drain()
            }
        };

        tokio::spawn(async move {
            for conn in idle {
                conn.close().await;
            }
        })
    }

    /// Close and wait for teardown. Safe to call repeatedly.
    pub async fn close(&self) {
        if let Err(err) = self.close_async().await {
            error!("pool teardown task failed: {} [{}]", err, self.endpoint());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of connections currently handed out. Reads the shared
    /// counter without taking the lock, so the value may trail an
    /// in-flight operation.
    pub fn acquired_count(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    /// Number of callers waiting in line.
    pub fn pending_count(&self) -> usize {
        self.lock().pending()
    }

    /// Last time a caller acquired or released a connection.
    pub fn last_active_time(&self) -> Instant {
        self.lock().last_active
    }

    /// Pool diagnostics snapshot.
    pub fn state(&self) -> State {
        State::get(self)
    }

    #[inline]
    pub fn endpoint(&self) -> Endpoint {
        self.inner.endpoint
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Pool unique identifier.
    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// The pool has no checked-out connections, no waiters, and no
    /// caller activity since `idle_threshold` ago.
    pub(crate) fn evictable(&self, now: Instant, idle_threshold: Duration) -> bool {
        let guard = self.lock();

        !guard.closed
            && self.acquired_count() == 0
            && guard.pending() == 0
            && now.saturating_duration_since(guard.last_active) >= idle_threshold
    }

    /// Forget a queued waiter whose caller gave up.
    pub(super) fn cancel_waiter(&self, id: u64) {
        let mut guard = self.lock();

        if let Some(mut waiter) = guard.remove_waiter(id) {
            waiter.cancel_timer();
        }
    }

    /// Pool exclusive lock.
    #[inline]
    pub(super) fn lock(&self) -> MutexGuard<'_, RawMutex, Inner> {
        self.inner.inner.lock()
    }

    /// Take connections from the reservoir until a healthy one turns
    /// up; unhealthy ones are closed on the way.
    fn take_healthy(&self, inner: &mut Inner) -> Option<Connection> {
        while let Some(conn) = inner.idle.take() {
            if self.inner.health.is_healthy(&conn) {
                self.inner.handler.on_acquired(&conn);
                return Some(conn);
            }

            debug!(
                "discarding unhealthy idle connection {} [{}]",
                conn.id(),
                self.inner.endpoint
            );
            inner.counts.discarded += 1;
            tokio::spawn(conn.close());
        }

        None
    }

    /// Free the slot before serving the queue, so a caller that
    /// re-acquires from its completion can win it in the same turn.
    fn decrement_and_dispatch(&self, inner: &mut Inner) {
        let count = self.inner.acquired.fetch_sub(1, Ordering::SeqCst);
        assert!(count > 0, "acquired count underflow");

        self.run_waiter_queue(inner);
    }

    /// Serve queued waiters while slots are free.
    fn run_waiter_queue(&self, inner: &mut Inner) {
        while self.acquired_count() < self.inner.config.capacity() {
            let Some(mut waiter) = inner.waiting.pop_front() else {
                break;
            };

            waiter.cancel_timer();
            waiter.raise_acquired(&self.inner.acquired);
            self.serve(inner, waiter);
        }
    }

    /// Hand a reserved slot to one waiter: reservoir first, then a
    /// fresh connect off the lock.
    fn serve(&self, inner: &mut Inner, waiter: Waiter) {
        let now = Instant::now();
        inner.counts.wait_time += now.duration_since(waiter.enqueued_at);

        if let Some(conn) = self.take_healthy(inner) {
            match waiter.send(Ok(conn)) {
                None => inner.counts.assignments += 1,
                Some(conn) => {
                    // The caller gave up after we took its slot; put
                    // both back.
                    self.inner.handler.on_released(&conn);
                    inner.idle.offer(conn);
                    let count = self.inner.acquired.fetch_sub(1, Ordering::SeqCst);
                    assert!(count > 0, "acquired count underflow");
                }
            }
            return;
        }

        self.spawn_connect_for(waiter);
    }

    /// Open a fresh connection for a promoted waiter. The completion
    /// runs [`Pool::deliver`], which reconciles the counters on every
    /// failure path.
    fn spawn_connect_for(&self, waiter: Waiter) {
        let pool = self.clone();

        tokio::spawn(async move {
            let result = pool.connect().await;
            pool.deliver(waiter, result);
        });
    }

    /// Establish and vet one new connection.
    async fn connect(&self) -> Result<Connection, Error> {
        let mut conn = self.inner.connector.connect(self.inner.endpoint).await?;

        conn.bind(self.inner.id);
        self.inner.handler.on_created(&conn);
        self.lock().counts.created += 1;

        if self.inner.health.is_healthy(&conn) {
            Ok(conn)
        } else {
            error!(
                "fresh connection {} failed the health check [{}]",
                conn.id(),
                self.inner.endpoint
            );
            conn.close().await;
            Err(Error::UnhealthyConnection)
        }
    }

    /// Completion of a connect started for a waiter.
    fn deliver(&self, waiter: Waiter, result: Result<Connection, Error>) {
        let mut guard = self.lock();

        if guard.closed {
            // Counters were zeroed by close; just dispose of the
            // connection if we got one.
            if let Ok(conn) = result {
                tokio::spawn(conn.close());
            }
            waiter.send(Err(Error::PoolClosed));
            return;
        }

        match result {
            Ok(conn) => {
                self.inner.handler.on_acquired(&conn);

                match waiter.send(Ok(conn)) {
                    None => guard.counts.assignments += 1,
                    Some(conn) => {
                        self.inner.handler.on_released(&conn);
                        guard.idle.offer(conn);
                        self.decrement_and_dispatch(&mut guard);
                    }
                }
            }
            Err(err) => {
                guard.counts.connect_errors += 1;

                if waiter.acquired() {
                    self.decrement_and_dispatch(&mut guard);
                } else {
                    self.run_waiter_queue(&mut guard);
                }

                waiter.send(Err(err));
            }
        }
    }

    /// One timer per queued waiter; on fire, expired waiters are
    /// walked off the head of the queue.
    fn spawn_timer(&self, deadline: Instant) -> AbortHandle {
        let pool = self.clone();

        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            pool.expire_waiters();
        });

        handle.abort_handle()
    }

    /// Apply the configured timeout action to every waiter whose
    /// deadline has passed.
    fn expire_waiters(&self) {
        let Some(action) = self.inner.config.timeout_action() else {
            return;
        };

        let mut guard = self.lock();
        let now = Instant::now();

        for mut waiter in guard.pop_expired(now) {
            guard.counts.timeouts += 1;

            match action {
                TimeoutAction::Fail => {
                    waiter.send(Err(Error::AcquireTimeout));
                }
                TimeoutAction::New => {
                    // Deliberate over-commit: the slot is reserved past
                    // the capacity cap so the caller keeps moving.
                    waiter.cancel_timer();
                    waiter.raise_acquired(&self.inner.acquired);
                    self.serve(&mut guard, waiter);
                }
            }
        }

        self.run_waiter_queue(&mut guard);
    }
}
