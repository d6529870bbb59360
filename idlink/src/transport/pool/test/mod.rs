//! Pool tests.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use rand::Rng;
use tokio::spawn;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::task::TaskTracker;

use super::*;

/// Connector that fabricates in-memory connections on demand.
#[derive(Default)]
pub struct TestConnector {
    connects: AtomicUsize,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl TestConnector {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Connector for TestConnector {
    fn connect(&self, endpoint: Endpoint) -> BoxFuture<'static, Result<Connection, Error>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing.load(Ordering::SeqCst);
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::SeqCst));

        Box::pin(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }

            if failing {
                Err(Error::ConnectFailed(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted connect failure",
                )))
            } else {
                Ok(Connection::detached(endpoint))
            }
        })
    }
}

fn endpoint() -> Endpoint {
    Endpoint::from(SocketAddr::from(([127, 0, 0, 1], 2641)))
}

fn config(capacity: usize, max_pending: usize) -> Config {
    Config::builder()
        .capacity(capacity)
        .max_pending(max_pending)
        .build()
        .unwrap()
}

fn pool_with(config: Config) -> (Pool, Arc<TestConnector>) {
    let connector = Arc::new(TestConnector::default());
    let pool = Pool::builder(endpoint())
        .config(config)
        .connector(connector.clone())
        .build();

    (pool, connector)
}

#[tokio::test]
async fn test_cold_start() {
    crate::logger();
    let (pool, connector) = pool_with(config(2, 4));

    let first = pool.acquire().await.unwrap();
    let second = pool.acquire().await.unwrap();
    let first_id = first.id();

    assert_eq!(pool.acquired_count(), 2);
    assert_eq!(connector.connects(), 2);
    assert_ne!(first.id(), second.id());

    let waiter_pool = pool.clone();
    let third = spawn(async move { waiter_pool.acquire().await });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.pending_count(), 1);

    pool.release(first).unwrap();

    let recycled = third.await.unwrap().unwrap();
    assert_eq!(recycled.id(), first_id);
    assert_eq!(pool.acquired_count(), 2);
    assert_eq!(connector.connects(), 2);

    pool.release(second).unwrap();
    pool.release(recycled).unwrap();
    assert_eq!(pool.acquired_count(), 0);
}

#[tokio::test]
async fn test_queue_overflow() {
    let (pool, _) = pool_with(config(1, 1));

    let held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let queued = spawn(async move { waiter_pool.acquire().await });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.pending_count(), 1);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::TooManyOutstanding));

    pool.release(held).unwrap();
    let conn = queued.await.unwrap().unwrap();
    pool.release(conn).unwrap();
}

#[tokio::test]
async fn test_timeout_fail() {
    let config = Config::builder()
        .capacity(1)
        .max_pending(10)
        .acquire_timeout(Duration::from_millis(50))
        .timeout_action(TimeoutAction::Fail)
        .build()
        .unwrap();
    let (pool, _) = pool_with(config);

    let held = pool.acquire().await.unwrap();

    let started = Instant::now();
    let err = timeout(Duration::from_secs(1), pool.acquire())
        .await
        .unwrap()
        .unwrap_err();

    assert!(matches!(err, Error::AcquireTimeout));
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.state().counts.timeouts, 1);

    pool.release(held).unwrap();
}

#[tokio::test]
async fn test_timeout_new_overcommits() {
    let config = Config::builder()
        .capacity(1)
        .max_pending(10)
        .acquire_timeout(Duration::from_millis(50))
        .timeout_action(TimeoutAction::New)
        .build()
        .unwrap();
    let (pool, connector) = pool_with(config);

    let held = pool.acquire().await.unwrap();

    let started = Instant::now();
    let extra = timeout(Duration::from_secs(1), pool.acquire())
        .await
        .unwrap()
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(pool.acquired_count(), 2); // over capacity on purpose
    assert_eq!(connector.connects(), 2);

    pool.release(held).unwrap();
    pool.release(extra).unwrap();

    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.state().idle, 2);
}

#[tokio::test]
async fn test_close_drains_waiters() {
    let (pool, _) = pool_with(config(1, 10));

    let held = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let waiter_pool = pool.clone();
        waiters.push(spawn(async move { waiter_pool.acquire().await }));
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.pending_count(), 3);

    pool.close().await;

    for waiter in waiters {
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
    }

    let err = pool.release(held).unwrap_err();
    assert!(matches!(err, Error::PoolClosed));

    assert!(pool.is_closed());
    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.state().idle, 0);
}

#[tokio::test]
async fn test_wrong_pool_release() {
    let (pool_a, _) = pool_with(config(1, 1));
    let (pool_b, _) = pool_with(config(1, 1));

    let conn = pool_a.acquire().await.unwrap();

    let err = pool_b.release(conn).unwrap_err();
    let conn = match err {
        Error::WrongPool(conn) => conn,
        other => panic!("expected WrongPool, got {:?}", other),
    };

    assert!(conn.is_open());
    assert_eq!(pool_a.acquired_count(), 1);
    assert_eq!(pool_b.acquired_count(), 0);
    assert_eq!(pool_b.state().idle, 0);
    assert_eq!(pool_b.pending_count(), 0);

    pool_a.release(conn).unwrap();
    assert_eq!(pool_a.acquired_count(), 0);
    assert_eq!(pool_a.state().idle, 1);
}

#[tokio::test]
async fn test_cancellation_safety() {
    crate::logger();
    let (pool, _) = pool_with(config(1, 10));

    let held = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..5 {
        let waiter_pool = pool.clone();
        waiters.push(spawn(async move { waiter_pool.acquire().await }));
    }
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.pending_count(), 5);

    for waiter in waiters {
        waiter.abort();
    }
    sleep(Duration::from_millis(50)).await;

    assert_eq!(
        pool.pending_count(),
        0,
        "all waiters should be removed from the queue on cancellation"
    );

    pool.release(held).unwrap();
    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.state().idle, 1);
}

#[tokio::test]
async fn test_abandoned_waiter_frees_its_slot() {
    let (pool, connector) = pool_with(config(1, 10));

    let mut held = pool.acquire().await.unwrap();
    held.mark_broken();

    let waiter_pool = pool.clone();
    let waiter = spawn(async move { waiter_pool.acquire().await });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.pending_count(), 1);

    // The broken connection gets discarded and the waiter promoted
    // into a slow connect; the waiter then walks away mid-connect.
    connector.set_delay(Duration::from_millis(100));
    pool.release(held).unwrap();
    waiter.abort();

    sleep(Duration::from_millis(300)).await;

    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.state().idle, 1, "the orphaned connection is recycled");
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_connect_failure_frees_the_slot() {
    let (pool, connector) = pool_with(config(1, 1));
    connector.set_failing(true);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::ConnectFailed(_)));
    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.state().counts.connect_errors, 1);

    connector.set_failing(false);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.acquired_count(), 1);
    pool.release(conn).unwrap();
}

#[tokio::test]
async fn test_waiter_connect_failure_reconciles() {
    let (pool, connector) = pool_with(config(1, 10));

    let mut held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = spawn(async move { waiter_pool.acquire().await });
    sleep(Duration::from_millis(50)).await;

    // Discarding the broken connection promotes the waiter, whose
    // fresh connect then fails.
    connector.set_failing(true);
    held.mark_broken();
    pool.release(held).unwrap();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ConnectFailed(_)));
    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.pending_count(), 0);
}

#[tokio::test]
async fn test_concurrency() {
    let (pool, connector) = pool_with(config(10, usize::MAX));
    let tracker = TaskTracker::new();

    for _ in 0..1000 {
        let pool = pool.clone();
        tracker.spawn(async move {
            let _conn = pool.get().await.unwrap();
            let duration = rand::rng().random_range(0..5);
            sleep(Duration::from_millis(duration)).await;
        });
    }

    tracker.close();
    tracker.wait().await;

    let state = pool.state();
    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(state.counts.assignments, 1000);
    assert_eq!(state.counts.released, 1000);
    assert!(state.idle >= 1 && state.idle <= 10);
    assert!(state.counts.created <= 10);
}

#[tokio::test]
async fn test_waiters_served_oldest_first() {
    let (pool, _) = pool_with(config(1, 10));
    let order = Arc::new(Mutex::new(Vec::new()));

    let held = pool.get().await.unwrap();

    let tracker = TaskTracker::new();
    for i in 0..3 {
        let pool = pool.clone();
        let order = order.clone();
        tracker.spawn(async move {
            let _conn = pool.get().await.unwrap();
            order.lock().push(i);
            sleep(Duration::from_millis(5)).await;
        });
        sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(pool.pending_count(), 3);
    drop(held);

    tracker.close();
    tracker.wait().await;

    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn test_acquire_release_round_trip() {
    let (pool, _) = pool_with(config(2, 4));

    // Warm the reservoir so the pair below starts from a steady state.
    let conn = pool.acquire().await.unwrap();
    pool.release(conn).unwrap();

    let before = pool.state();

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).unwrap();

    let after = pool.state();
    assert_eq!(before.acquired, after.acquired);
    assert_eq!(before.idle, after.idle);
    assert_eq!(before.pending, after.pending);
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<(&'static str, u64)>>,
}

impl PoolHandler for RecordingHandler {
    fn on_created(&self, conn: &Connection) {
        self.events.lock().push(("created", conn.id()));
    }

    fn on_acquired(&self, conn: &Connection) {
        self.events.lock().push(("acquired", conn.id()));
    }

    fn on_released(&self, conn: &Connection) {
        self.events.lock().push(("released", conn.id()));
    }
}

#[tokio::test]
async fn test_handler_transition_order() {
    let handler = Arc::new(RecordingHandler::default());
    let connector = Arc::new(TestConnector::default());
    let pool = Pool::builder(endpoint())
        .config(config(1, 1))
        .connector(connector)
        .handler(handler.clone())
        .build();

    let conn = pool.acquire().await.unwrap();
    let id = conn.id();
    pool.release(conn).unwrap();

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).unwrap();

    let events: Vec<_> = handler
        .events
        .lock()
        .iter()
        .filter(|(_, conn)| *conn == id)
        .map(|(event, _)| *event)
        .collect();

    assert_eq!(
        events,
        vec!["created", "acquired", "released", "acquired", "released"]
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (pool, _) = pool_with(config(1, 1));

    let conn = pool.acquire().await.unwrap();
    pool.release(conn).unwrap();

    pool.close().await;
    pool.close().await;

    assert!(pool.is_closed());
    assert_eq!(pool.state().idle, 0);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolClosed));
}

#[tokio::test]
async fn test_release_health_check_discards_broken() {
    let (pool, connector) = pool_with(config(1, 1));

    let mut conn = pool.acquire().await.unwrap();
    conn.mark_broken();
    pool.release(conn).unwrap();

    assert_eq!(pool.acquired_count(), 0);
    assert_eq!(pool.state().idle, 0);
    assert_eq!(pool.state().counts.discarded, 1);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(connector.connects(), 2);
    pool.release(conn).unwrap();
}

#[tokio::test]
async fn test_release_health_check_disabled_pools_broken() {
    let config = Config::builder()
        .capacity(1)
        .max_pending(1)
        .release_health_check(false)
        .build()
        .unwrap();
    let (pool, connector) = pool_with(config);

    let mut conn = pool.acquire().await.unwrap();
    conn.mark_broken();
    pool.release(conn).unwrap();

    // The broken connection went back to the reservoir, but acquire
    // still refuses to hand it out.
    assert_eq!(pool.state().idle, 1);

    let conn = pool.acquire().await.unwrap();
    assert!(conn.is_open());
    assert_eq!(connector.connects(), 2);
    assert_eq!(pool.state().counts.discarded, 1);
    pool.release(conn).unwrap();
}
