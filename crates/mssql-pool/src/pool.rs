//! Session pool implementation.
//!
//! Admission is bounded by a semaphore with `max_pool_size` permits; a
//! permit is held for as long as a session is checked out. Released sessions
//! go to the front of the idle list, so the most recently used session is
//! handed out next and the oldest ones sink to the tail, where the sweeper
//! expires them.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use mssql_client::{Credentials, ParamCache, Session};
use parking_lot::Mutex;
use tds_transport::Connector;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::PoolError;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A pool of [`Session`]s sharing one set of credentials and one parameter
/// cache.
///
/// # Example
///
/// ```rust,ignore
/// use mssql_driver_pool::Pool;
///
/// let pool = Pool::new(connector, "host=db1;database=pubs;user=sa;pwd=secret;max_pool_size=20").await?;
///
/// let mut session = pool.acquire().await?;
/// session.exec("update authors set contract = 1").await?;
/// // returned to the pool on drop
/// ```
pub struct Pool {
    inner: Arc<PoolInner>,
    sweeper: JoinHandle<()>,
}

struct PoolInner {
    id: u64,
    connector: Arc<dyn Connector>,
    credentials: Arc<Credentials>,
    param_cache: Arc<ParamCache>,
    config: PoolConfig,
    max: usize,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
    closed: AtomicBool,
    created_at: Instant,
    metrics: Mutex<PoolMetricsInner>,
}

struct PoolState {
    /// Most recently released first.
    idle: VecDeque<IdleSession>,
    /// Sessions alive that belong to the pool, idle or checked out.
    total_created: usize,
}

struct IdleSession {
    session: Session,
    expires_at: Instant,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    sessions_created: u64,
    sessions_closed: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    sweeps_performed: u64,
    sessions_expired: u64,
}

impl Pool {
    /// Create a pool with the default configuration.
    ///
    /// Opens the first session right away; an error from it is returned.
    pub async fn new(connector: Arc<dyn Connector>, conn_str: &str) -> Result<Self, PoolError> {
        Self::with_config(connector, conn_str, PoolConfig::default()).await
    }

    /// Create a pool with the given configuration.
    pub async fn with_config(
        connector: Arc<dyn Connector>,
        conn_str: &str,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        config.validate()?;
        let credentials = Arc::new(Credentials::from_connection_string(conn_str)?);
        let param_cache = Arc::new(ParamCache::new());

        let first =
            Session::open_with_cache(Arc::clone(&connector), credentials, Arc::clone(&param_cache))
                .await?;
        // the first session may already have failed over to the mirror
        let credentials = Arc::clone(first.credentials());
        let max = credentials.max_pool_size;
        if max == 0 {
            return Err(PoolError::InvalidConfig(
                "max_pool_size must be greater than 0".into(),
            ));
        }

        let mut idle = VecDeque::with_capacity(max);
        idle.push_front(IdleSession {
            session: first,
            expires_at: Instant::now() + config.idle_timeout,
        });

        let inner = Arc::new(PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            credentials,
            param_cache,
            config,
            max,
            semaphore: Arc::new(Semaphore::new(max)),
            state: Mutex::new(PoolState {
                idle,
                total_created: 1,
            }),
            closed: AtomicBool::new(false),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner {
                sessions_created: 1,
                ..PoolMetricsInner::default()
            }),
        });

        tracing::info!(
            pool = inner.id,
            host = %inner.credentials.host,
            database = ?inner.credentials.database,
            max = max,
            "session pool created"
        );

        let sweeper = spawn_sweeper(&inner);
        Ok(Self { inner, sweeper })
    }

    /// Check out a session, waiting while `max_pool_size` sessions are in
    /// use.
    ///
    /// Reuses the most recently released idle session, or opens a new one.
    pub async fn acquire(&self) -> Result<PooledSession, PoolError> {
        let inner = &self.inner;
        if inner.is_closed() {
            inner.metrics.lock().checkouts_failed += 1;
            return Err(PoolError::PoolClosed);
        }

        let permit = match Arc::clone(&inner.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                inner.metrics.lock().checkouts_failed += 1;
                return Err(PoolError::PoolClosed);
            }
        };

        // Pop an idle session, or reserve a slot for a new one, under the
        // same lock so the total never outgrows the permits.
        let reused = {
            let mut state = inner.state.lock();
            let popped = state.idle.pop_front();
            if popped.is_none() {
                state.total_created += 1;
            }
            popped
        };

        let session = match reused {
            Some(idle) => idle.session,
            None => match inner.open_session().await {
                Ok(session) => session,
                Err(err) => {
                    inner.state.lock().total_created -= 1;
                    inner.metrics.lock().checkouts_failed += 1;
                    drop(permit);
                    tracing::warn!(pool = inner.id, error = %err, "failed to open pooled session");
                    return Err(err.into());
                }
            },
        };

        inner.metrics.lock().checkouts_successful += 1;
        tracing::trace!(pool = inner.id, handle = ?session.handle_id(), "session checked out");
        Ok(PooledSession {
            session: Some(session),
            pool: Arc::downgrade(inner),
            pool_id: inner.id,
            permit: Some(permit),
        })
    }

    /// Return a session to the pool.
    ///
    /// Same as dropping the guard. A guard from another pool is returned to
    /// the pool it came from.
    pub fn release(&self, session: PooledSession) {
        if session.pool_id != self.inner.id {
            tracing::warn!(
                pool = self.inner.id,
                owner = session.pool_id,
                "release of a session from another pool"
            );
        }
        drop(session);
    }

    /// Acquire a session, run `handler` with it and release it.
    ///
    /// ```rust,ignore
    /// let count = pool
    ///     .run(|session| Box::pin(async move { session.select_value("select count(*) from authors").await }))
    ///     .await?;
    /// ```
    pub async fn run<T, F>(&self, handler: F) -> Result<T, PoolError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, mssql_client::Result<T>>,
    {
        let mut guard = self.acquire().await?;
        let result = handler(&mut *guard).await;
        drop(guard);
        result.map_err(PoolError::from)
    }

    /// Like [`run`](Self::run), inside a transaction.
    ///
    /// Commits when the handler succeeds and rolls back when it fails.
    pub async fn run_in_transaction<T, F>(&self, handler: F) -> Result<T, PoolError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, mssql_client::Result<T>>,
    {
        let mut guard = self.acquire().await?;
        guard.begin().await?;
        match handler(&mut *guard).await {
            Ok(value) => {
                guard.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = guard.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed handler also failed");
                }
                Err(err.into())
            }
        }
    }

    /// Close expired idle sessions. Returns how many were closed.
    ///
    /// The most recently released session is never closed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len(),
            in_use: state.total_created.saturating_sub(state.idle.len()),
            total: state.total_created,
            max: self.inner.max,
        }
    }

    /// `(max, total_created, active)`.
    #[must_use]
    pub fn stat(&self) -> (usize, usize, usize) {
        let status = self.status();
        (status.max, status.total, status.in_use)
    }

    /// Pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            sessions_created: inner.sessions_created,
            sessions_closed: inner.sessions_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            sweeps_performed: inner.sweeps_performed,
            sessions_expired: inner.sessions_expired,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Close the pool: idle sessions are closed and later `acquire` calls
    /// fail. Checked out sessions are closed when they are released.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.semaphore.close();
        self.sweeper.abort();
        let drained: Vec<IdleSession> = {
            let mut state = self.inner.state.lock();
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.total_created -= drained.len();
            drained
        };
        let count = drained.len();
        for mut idle in drained {
            idle.session.close();
        }
        self.inner.metrics.lock().sessions_closed += count as u64;
        tracing::info!(pool = self.inner.id, closed = count, "session pool closed");
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Credentials new sessions are opened with.
    #[must_use]
    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.inner.credentials
    }

    /// The parameter cache shared by all sessions of the pool.
    #[must_use]
    pub fn param_cache(&self) -> &Arc<ParamCache> {
        &self.inner.param_cache
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("host", &self.inner.credentials.host)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn open_session(&self) -> mssql_client::Result<Session> {
        let session = Session::open_with_cache(
            Arc::clone(&self.connector),
            Arc::clone(&self.credentials),
            Arc::clone(&self.param_cache),
        )
        .await?;
        self.metrics.lock().sessions_created += 1;
        Ok(session)
    }

    fn put_back(&self, mut session: Session) {
        if session.is_dead() || self.is_closed() {
            session.close();
            self.state.lock().total_created -= 1;
            self.metrics.lock().sessions_closed += 1;
            tracing::debug!(pool = self.id, "closed session on release");
            return;
        }
        let expires_at = Instant::now() + self.config.idle_timeout;
        self.state.lock().idle.push_front(IdleSession {
            session,
            expires_at,
        });
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<IdleSession> = {
            let mut state = self.state.lock();
            let mut expired = Vec::new();
            // index 0 is the most recently released and always stays
            let mut i = state.idle.len();
            while i > 1 {
                i -= 1;
                if state.idle[i].expires_at <= now {
                    if let Some(entry) = state.idle.remove(i) {
                        expired.push(entry);
                    }
                }
            }
            state.total_created -= expired.len();
            expired
        };

        let count = expired.len();
        for mut idle in expired {
            idle.session.close();
        }
        {
            let mut metrics = self.metrics.lock();
            metrics.sweeps_performed += 1;
            metrics.sessions_expired += count as u64;
            metrics.sessions_closed += count as u64;
        }
        if count > 0 {
            tracing::debug!(pool = self.id, expired = count, "swept idle sessions");
        }
        count
    }
}

fn spawn_sweeper(inner: &Arc<PoolInner>) -> JoinHandle<()> {
    let pool: Weak<PoolInner> = Arc::downgrade(inner);
    let period = inner.config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let Some(inner) = pool.upgrade() else {
                break;
            };
            if inner.is_closed() {
                break;
            }
            inner.sweep();
        }
    })
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Idle sessions.
    pub available: usize,
    /// Sessions checked out.
    pub in_use: usize,
    /// All sessions the pool currently owns.
    pub total: usize,
    /// Maximum number of sessions checked out at once.
    pub max: usize,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if every permit is taken.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.in_use >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Sessions opened since pool start.
    pub sessions_created: u64,
    /// Sessions closed since pool start.
    pub sessions_closed: u64,
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (pool closed, session could not be opened).
    pub checkouts_failed: u64,
    /// Sweeps run.
    pub sweeps_performed: u64,
    /// Sessions closed by sweeps.
    pub sessions_expired: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}

/// A session checked out of a [`Pool`].
///
/// Dereferences to [`Session`]. Dropping the guard returns the session to
/// its pool; a dead session is closed instead.
pub struct PooledSession {
    session: Option<Session>,
    pool: Weak<PoolInner>,
    pool_id: u64,
    // released after the session is back in the idle list
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledSession {
    /// Identity of the pool the session belongs to.
    #[must_use]
    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }
}

impl Deref for PooledSession {
    type Target = Session;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &Self::Target {
        self.session
            .as_ref()
            .expect("session is present until the guard is dropped")
    }
}

impl DerefMut for PooledSession {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
            .as_mut()
            .expect("session is present until the guard is dropped")
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            match self.pool.upgrade() {
                Some(pool) => pool.put_back(session),
                None => session.close(),
            }
        }
        drop(self.permit.take());
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("pool_id", &self.pool_id)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use mssql_client::{SqlValue, WireType};
    use mssql_testing::{MockResultSet, MockServer, Reply};

    use super::*;

    const CONN_STR: &str = "host=srv;database=pubs;user=u;pwd=p;max_pool_size=2";

    async fn pool(server: &MockServer, conn_str: &str, config: PoolConfig) -> Pool {
        let connector: Arc<dyn Connector> = Arc::new(server.clone());
        Pool::with_config(connector, conn_str, config).await.unwrap()
    }

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
        };
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
        assert!(!status.is_at_capacity());
    }

    #[test]
    fn test_pool_metrics_success_rate() {
        let metrics = PoolMetrics {
            sessions_created: 10,
            sessions_closed: 2,
            checkouts_successful: 90,
            checkouts_failed: 10,
            sweeps_performed: 3,
            sessions_expired: 2,
            uptime: Duration::from_secs(3600),
        };
        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_new_pool_holds_one_idle_session() {
        let server = MockServer::new();
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;
        assert_eq!(
            pool.status(),
            PoolStatus {
                available: 1,
                in_use: 0,
                total: 1,
                max: 2
            }
        );
        assert_eq!(pool.stat(), (2, 1, 0));
        assert_eq!(server.open_sessions(), 1);
    }

    #[tokio::test]
    async fn test_release_is_lifo() {
        let server = MockServer::new();
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let (a_handle, b_handle) = (a.handle_id(), b.handle_id());
        assert_ne!(a_handle, b_handle);

        pool.release(a);
        pool.release(b);
        let next = pool.acquire().await.unwrap();
        assert_eq!(next.handle_id(), b_handle);
    }

    #[tokio::test]
    async fn test_dead_session_is_not_returned() {
        let server = MockServer::new();
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;

        let session = pool.acquire().await.unwrap();
        server.kill_all();
        drop(session);
        assert_eq!(pool.status().total, 0);
        assert_eq!(pool.status().available, 0);

        // a fresh one is opened on demand
        let mut session = pool.acquire().await.unwrap();
        assert!(session.is_live().await);
        assert_eq!(pool.status().total, 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_the_front_session() {
        let server = MockServer::new();
        let config = PoolConfig::new().idle_timeout(Duration::ZERO);
        let pool = pool(
            &server,
            "host=srv;user=u;pwd=p;max_pool_size=5",
            config,
        )
        .await;

        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(pool.acquire().await.unwrap());
        }
        let last = held.last().unwrap().handle_id();
        for session in held {
            pool.release(session);
        }
        assert_eq!(pool.status().available, 4);

        assert_eq!(pool.sweep(), 3);
        let status = pool.status();
        assert_eq!((status.available, status.total), (1, 1));
        assert_eq!(server.open_sessions(), 1);
        assert_eq!(pool.acquire().await.unwrap().handle_id(), last);

        let metrics = pool.metrics();
        assert_eq!(metrics.sessions_expired, 3);
        assert_eq!(metrics.sessions_created, 4);
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_sessions() {
        let server = MockServer::new();
        let pool = pool(&server, "host=srv;user=u;pwd=p;max_pool_size=5", PoolConfig::default()).await;
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.sweep(), 0);
        assert_eq!(pool.status().available, 2);
    }

    #[tokio::test]
    async fn test_background_sweeper_runs() {
        let server = MockServer::new();
        let config = PoolConfig::new()
            .idle_timeout(Duration::ZERO)
            .sweep_interval(Duration::from_millis(10));
        let pool = pool(&server, "host=srv;user=u;pwd=p;max_pool_size=3", config).await;
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        drop(b);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.status().available, 1);
        assert!(pool.metrics().sweeps_performed > 0);
    }

    #[tokio::test]
    async fn test_capacity_blocks_until_release() {
        let server = MockServer::new();
        let pool = Arc::new(pool(&server, CONN_STR, PoolConfig::default()).await);

        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();
        assert!(pool.status().is_at_capacity());

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.map(|s| s.handle_id()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let a_handle = a.handle_id();
        drop(a);
        let handle = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(handle, a_handle);
        assert_eq!(pool.status().total, 2);
    }

    #[tokio::test]
    async fn test_foreign_session_returns_to_its_own_pool() {
        let server = MockServer::new();
        let first = pool(&server, CONN_STR, PoolConfig::default()).await;
        let second = pool(&server, CONN_STR, PoolConfig::default()).await;

        let session = second.acquire().await.unwrap();
        assert_eq!(second.status().in_use, 1);
        first.release(session);
        assert_eq!(first.status().available, 1);
        assert_eq!(second.status().available, 1);
        assert_eq!(second.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_close_rejects_acquire() {
        let server = MockServer::new();
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;
        let held = pool.acquire().await.unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert!(matches!(pool.acquire().await, Err(PoolError::PoolClosed)));

        drop(held);
        assert_eq!(pool.status().total, 0);
        assert_eq!(server.open_sessions(), 0);
        assert_eq!(pool.metrics().checkouts_failed, 1);
    }

    #[tokio::test]
    async fn test_failed_open_releases_the_permit() {
        let server = MockServer::new();
        let pool = pool(&server, "host=srv;user=u;pwd=p;max_pool_size=1", PoolConfig::default()).await;

        let held = pool.acquire().await.unwrap();
        server.kill_all();
        drop(held);
        server.unreachable("srv");
        assert!(matches!(pool.acquire().await, Err(PoolError::Session(_))));
        assert_eq!(pool.status().total, 0);

        server.reachable("srv");
        let session = pool.acquire().await.unwrap();
        assert!(session.handle_id().is_some());
    }

    #[tokio::test]
    async fn test_sessions_share_the_parameter_cache() {
        let server = MockServer::new();
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert!(Arc::ptr_eq(a.param_cache(), b.param_cache()));
        assert!(Arc::ptr_eq(a.param_cache(), pool.param_cache()));
    }

    #[tokio::test]
    async fn test_run_releases_the_session() {
        let server = MockServer::new();
        server.on(
            "count(*)",
            Reply::result(MockResultSet::new().column("", WireType::Int, 4).row([SqlValue::Int(23)])),
        );
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;
        let count = pool
            .run(|session| {
                Box::pin(async move { session.select_value("select count(*) from authors").await })
            })
            .await
            .unwrap();
        assert_eq!(count, SqlValue::Int(23));
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_run_in_transaction_commits_or_rolls_back() {
        let server = MockServer::new();
        server.on("from missing", Reply::error(208, 16, "Invalid object name 'missing'."));
        let pool = pool(&server, CONN_STR, PoolConfig::default()).await;

        let sets = pool
            .run_in_transaction(|session| {
                Box::pin(async move {
                    session
                        .exec("update authors set contract = 1")
                        .await
                        .map(|results| results.len())
                })
            })
            .await
            .unwrap();
        assert_eq!(sets, 1);
        assert_eq!(server.batch_count("commit transaction"), 1);
        assert_eq!(server.batch_count("rollback transaction"), 0);

        let err = pool
            .run_in_transaction(|session| {
                Box::pin(async move { session.exec("select * from missing").await })
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Session(mssql_client::Error::Server { .. })
        ));
        assert_eq!(server.batch_count("rollback transaction"), 1);
        assert_eq!(server.batch_count("commit transaction"), 1);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_respects_capacity() {
        let server = MockServer::new();
        let pool = Arc::new(
            pool(&server, "host=srv;user=u;pwd=p;max_pool_size=3", PoolConfig::default()).await,
        );

        let tasks: Vec<_> = (0..24)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let session = pool.acquire().await.unwrap();
                    let status = pool.status();
                    assert!(status.total <= status.max);
                    assert!(status.in_use <= status.max);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    session.handle_id()
                })
            })
            .collect();

        let mut handles = HashSet::new();
        for task in tasks {
            handles.insert(task.await.unwrap());
        }
        let status = pool.status();
        assert!(status.total <= 3);
        assert_eq!(status.available + status.in_use, status.total);
        assert_eq!(status.in_use, 0);
        assert!(handles.len() <= 3);
    }
}
