//! Connection pool management.
//!
//! [`ConnectionPool`] owns a bounded set of physical connections. Checked-out
//! connections are bounded by a fair semaphore, so waiters are served in
//! arrival order and never exceed `max_connections`. Idle connections live in a
//! mutex-guarded deque that is never held across an `.await`.
//!
//! A [`PooledConnection`] returns itself to the pool when dropped. A connection
//! that was marked broken, or whose last operation was cancelled before it
//! completed, is closed instead and never handed out again.

use crate::config::PoolOptions;
use crate::db::connection::{Connection, Connector};
use crate::error::{DialectError, DialectResult};
use crate::models::Backend;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Resolved pool settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    /// Idle connections kept open past `idle_timeout`, both by the reaper and
    /// by the expiry check on acquire
    pub min_idle: u32,
    /// None disables idle expiry
    pub idle_timeout: Option<Duration>,
    pub acquire_timeout: Duration,
    pub test_before_acquire: bool,
    pub reap_interval: Duration,
}

impl PoolConfig {
    pub fn from_options(options: &PoolOptions, backend: Backend) -> Self {
        Self {
            max_connections: options.max_connections_or_default(backend),
            min_idle: options.min_idle_or_default(),
            idle_timeout: options.idle_timeout_or_default(),
            acquire_timeout: options.acquire_timeout_or_default(),
            test_before_acquire: options.test_before_acquire_or_default(),
            reap_interval: options.reap_interval_or_default(),
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_min_idle(mut self, min_idle: u32) -> Self {
        self.min_idle = min_idle;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_test_before_acquire(mut self, test: bool) -> Self {
        self.test_before_acquire = test;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_options(&PoolOptions::default(), Backend::PostgreSQL)
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStatus {
    /// Live physical connections (idle + checked out)
    pub size: u32,
    pub idle: u32,
    pub checked_out: u32,
    pub max: u32,
    pub closed: bool,
}

/// A checked-out connection and how long it has been out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub connection_id: u64,
    pub held_for: Duration,
}

struct IdleConnection<T> {
    id: u64,
    conn: T,
    created_at: Instant,
    idle_since: Instant,
}

struct PoolState<T> {
    idle: VecDeque<IdleConnection<T>>,
    size: u32,
    leases: HashMap<u64, Instant>,
}

pub struct ConnectionPool<C: Connector> {
    connector: C,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<C::Connection>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> ConnectionPool<C> {
    /// Create a pool. No connection is opened until the first acquire.
    ///
    /// When called inside a tokio runtime and idle expiry is enabled, a
    /// background reaper is started; it holds only a weak reference and stops
    /// once the pool is dropped or closed.
    pub fn new(connector: C, config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            connector,
            semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                size: 0,
                leases: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            reaper: Mutex::new(None),
        });

        if pool.config.idle_timeout.is_some() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let handle = runtime.spawn(reap_loop(
                        Arc::downgrade(&pool),
                        pool.config.reap_interval,
                    ));
                    *lock(&pool.reaper) = Some(handle);
                }
                Err(_) => debug!("No tokio runtime; idle connections are only expired on acquire"),
            }
        }

        debug!(
            max_connections = pool.config.max_connections,
            min_idle = pool.config.min_idle,
            "Created connection pool"
        );
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check out a connection.
    ///
    /// Waits until a connection is idle or a new one may be opened. Fails with
    /// `PoolTimeout` once `timeout` (default: the configured acquire timeout)
    /// elapses, and with a connection error if the pool is closed.
    pub async fn acquire(self: &Arc<Self>, timeout: Option<Duration>) -> DialectResult<PooledConnection<C>> {
        let timeout = timeout.unwrap_or(self.config.acquire_timeout);
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.acquire_inner()).await {
            Ok(result) => result,
            Err(_) => {
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(
                    waited_ms,
                    max_connections = self.config.max_connections,
                    "Timed out waiting for a pooled connection"
                );
                Err(DialectError::pool_timeout(waited_ms))
            }
        }
    }

    async fn acquire_inner(self: &Arc<Self>) -> DialectResult<PooledConnection<C>> {
        let mut permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| pool_closed())?;

        loop {
            if self.is_closed() {
                return Err(pool_closed());
            }

            let Some(idle) = self.pop_idle() else {
                return self.open(permit).await;
            };

            let mut handle = self.lease(idle.id, idle.conn, idle.created_at, permit);
            if !self.config.test_before_acquire {
                return Ok(handle);
            }
            match handle.ping().await {
                Ok(()) => return Ok(handle),
                Err(e) => {
                    warn!(connection_id = handle.id, error = %e, "Idle connection failed ping; discarding");
                    permit = handle
                        .permit
                        .take()
                        .ok_or_else(|| DialectError::internal("pooled connection lost its permit"))?;
                }
            }
        }
    }

    /// Pop the most recently used idle connection, closing expired ones. The
    /// last `min_idle` idle connections are reused even when expired.
    fn pop_idle(&self) -> Option<IdleConnection<C::Connection>> {
        let min_idle = self.config.min_idle as usize;
        let mut expired = Vec::new();
        let found = {
            let mut state = lock(&self.state);
            loop {
                match state.idle.pop_back() {
                    Some(idle) if self.is_expired(&idle) && state.idle.len() >= min_idle => {
                        state.size -= 1;
                        expired.push(idle);
                    }
                    other => break other,
                }
            }
        };
        for idle in expired {
            debug!(connection_id = idle.id, "Closing expired idle connection");
            close_in_background(idle.conn);
        }
        found
    }

    fn is_expired(&self, idle: &IdleConnection<C::Connection>) -> bool {
        self.config
            .idle_timeout
            .is_some_and(|timeout| idle.idle_since.elapsed() >= timeout)
    }

    async fn open(self: &Arc<Self>, permit: OwnedSemaphorePermit) -> DialectResult<PooledConnection<C>> {
        let reservation = SizeReservation::new(self);
        let conn = self.connector.connect().await?;
        reservation.commit();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection_id = id, "Opened new pooled connection");
        Ok(self.lease(id, conn, Instant::now(), permit))
    }

    fn lease(
        self: &Arc<Self>,
        id: u64,
        conn: C::Connection,
        created_at: Instant,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection<C> {
        lock(&self.state).leases.insert(id, Instant::now());
        PooledConnection {
            conn: Some(conn),
            id,
            created_at,
            broken: false,
            in_flight: false,
            pool: Arc::clone(self),
            permit: Some(permit),
        }
    }

    /// Take a returned connection back. Returns it when it must be closed.
    fn reclaim(&self, id: u64, conn: C::Connection, created_at: Instant, broken: bool) -> Option<C::Connection> {
        let mut state = lock(&self.state);
        state.leases.remove(&id);
        if broken || self.is_closed() {
            state.size -= 1;
            return Some(conn);
        }
        state.idle.push_back(IdleConnection {
            id,
            conn,
            created_at,
            idle_since: Instant::now(),
        });
        None
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping the handle, except that a broken connection is
    /// closed before this returns.
    pub async fn release(&self, mut handle: PooledConnection<C>) {
        let broken = handle.is_broken();
        let Some(conn) = handle.conn.take() else {
            return;
        };
        if let Some(conn) = self.reclaim(handle.id, conn, handle.created_at, broken) {
            debug!(connection_id = handle.id, broken, "Closing released connection");
            if let Err(e) = conn.close().await {
                debug!(connection_id = handle.id, error = %e, "Error while closing connection");
            }
        }
        // The permit is released here, after the connection is back in the idle set
        drop(handle);
    }

    /// Close idle connections that have exceeded the idle timeout, keeping at
    /// least `min_idle`. Returns the number of connections closed.
    pub async fn reap_idle(&self) -> usize {
        let expired: Vec<_> = {
            let mut state = lock(&self.state);
            let min_idle = self.config.min_idle as usize;
            let mut expired = Vec::new();
            // Oldest idle connections sit at the front
            while state.idle.len() > min_idle {
                match state.idle.front() {
                    Some(idle) if self.is_expired(idle) => {
                        if let Some(idle) = state.idle.pop_front() {
                            state.size -= 1;
                            expired.push(idle);
                        }
                    }
                    _ => break,
                }
            }
            expired
        };

        let count = expired.len();
        for idle in expired {
            debug!(
                connection_id = idle.id,
                age_secs = idle.created_at.elapsed().as_secs(),
                "Reaping idle connection"
            );
            if let Err(e) = idle.conn.close().await {
                debug!(connection_id = idle.id, error = %e, "Error while closing connection");
            }
        }
        count
    }

    /// Close the pool.
    ///
    /// Pending and future acquires fail, idle connections are closed now and
    /// checked-out connections are closed when they come back.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();
        if let Some(handle) = lock(&self.reaper).take() {
            handle.abort();
        }

        let idle: Vec<_> = {
            let mut state = lock(&self.state);
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.size -= drained.len() as u32;
            drained
        };
        let closed = idle.len();
        for idle in idle {
            if let Err(e) = idle.conn.close().await {
                debug!(connection_id = idle.id, error = %e, "Error while closing connection");
            }
        }
        info!(closed_idle = closed, "Connection pool closed");
    }

    pub fn status(&self) -> PoolStatus {
        let state = lock(&self.state);
        PoolStatus {
            size: state.size,
            idle: state.idle.len() as u32,
            checked_out: state.leases.len() as u32,
            max: self.config.max_connections,
            closed: self.is_closed(),
        }
    }

    /// Checked-out connections, ordered by connection id.
    pub fn leases(&self) -> Vec<Lease> {
        let state = lock(&self.state);
        let mut leases: Vec<_> = state
            .leases
            .iter()
            .map(|(id, since)| Lease {
                connection_id: *id,
                held_for: since.elapsed(),
            })
            .collect();
        leases.sort_by_key(|l| l.connection_id);
        leases
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.reaper).take() {
            handle.abort();
        }
    }
}

async fn reap_loop<C: Connector>(pool: Weak<ConnectionPool<C>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        if pool.is_closed() {
            break;
        }
        let reaped = pool.reap_idle().await;
        if reaped > 0 {
            debug!(reaped, "Reaped idle connections");
        }
    }
}

/// Counts a connection being opened towards the pool size; undone if the
/// open fails or is cancelled.
struct SizeReservation<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    armed: bool,
}

impl<'a, C: Connector> SizeReservation<'a, C> {
    fn new(pool: &'a ConnectionPool<C>) -> Self {
        lock(&pool.state).size += 1;
        Self { pool, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<C: Connector> Drop for SizeReservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            lock(&self.pool.state).size -= 1;
        }
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    id: u64,
    created_at: Instant,
    broken: bool,
    in_flight: bool,
    pool: Arc<ConnectionPool<C>>,
    // Dropped after `Drop::drop` has put the connection back
    permit: Option<OwnedSemaphorePermit>,
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("broken", &self.is_broken())
            .finish_non_exhaustive()
    }
}

/// Marker for an operation running on a pooled connection. Dropping it without
/// calling [`InFlight::complete`] leaves the connection flagged as broken.
pub(crate) struct InFlight<'a>(&'a mut bool);

impl InFlight<'_> {
    pub(crate) fn complete(self) {
        *self.0 = false;
    }
}

impl<C: Connector> PooledConnection<C> {
    /// Pool-assigned connection id, stable for the life of the physical connection.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the connection will be discarded instead of reused.
    pub fn is_broken(&self) -> bool {
        self.broken || self.in_flight || self.conn.is_none()
    }

    pub fn mark_broken(&mut self) {
        if !self.broken {
            warn!(connection_id = self.id, "Connection marked broken");
        }
        self.broken = true;
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    /// Start an operation on the physical connection.
    pub(crate) fn begin_operation(&mut self) -> DialectResult<(&mut C::Connection, InFlight<'_>)> {
        if self.broken || self.in_flight {
            return Err(DialectError::connection(
                format!("Connection {} is broken", self.id),
                "Release it and acquire a new connection",
            ));
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DialectError::internal("pooled connection already returned"))?;
        self.in_flight = true;
        Ok((conn, InFlight(&mut self.in_flight)))
    }

    /// Ping the connection; a failed ping marks it broken.
    pub async fn ping(&mut self) -> DialectResult<()> {
        let (conn, op) = self.begin_operation()?;
        let result = conn.ping().await;
        op.complete();
        if result.is_err() {
            self.mark_broken();
        }
        result
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.in_flight {
            warn!(connection_id = self.id, "Connection dropped mid-operation; discarding");
        }
        let broken = self.broken || self.in_flight;
        if let Some(conn) = self.pool.reclaim(self.id, conn, self.created_at, broken) {
            close_in_background(conn);
        }
    }
}

fn close_in_background<T: Connection>(conn: T) {
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(async move {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Error while closing connection");
            }
        });
    }
}

fn pool_closed() -> DialectError {
    DialectError::connection("Connection pool is closed", "Create a new dialect")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
