//! Bounded async connection pool.
//!
//! A semaphore caps the number of checked-out connections and a deque keeps
//! idle ones for reuse. The idle queue uses `parking_lot::Mutex` (sync, held
//! very briefly) so connections can be returned in `Drop` without async.
//!
//! With a ping interval configured, a background task on the shared runtime
//! pings the least recently used idle connection on every tick and drops it
//! if the ping fails.

use crate::config::ConnectionConfig;
use crate::connection::tcp::RedisConnection;
use crate::error::{DatasourceError, Result};
use crate::resp::types::RespValue;
use crate::runtime;

use parking_lot::Mutex as SyncMutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

pub struct ConnectionPool {
    /// Idle connections, most recently used at the back.
    idle: SyncMutex<VecDeque<RedisConnection>>,
    /// Limits checked-out connections.
    semaphore: Semaphore,
    config: ConnectionConfig,
    max_size: usize,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a pool; starts the keep-alive task when a ping interval is set.
    pub fn new(config: ConnectionConfig) -> Arc<Self> {
        let max_size = config.pool_size.max(1);
        let ping_interval = config.ping_interval;
        let pool = Arc::new(Self {
            idle: SyncMutex::new(VecDeque::with_capacity(max_size)),
            semaphore: Semaphore::new(max_size),
            config,
            max_size,
            closed: AtomicBool::new(false),
        });
        if let Some(interval) = ping_interval {
            let task = keep_alive(Arc::downgrade(&pool), interval);
            // Stay on the caller's runtime when there is one
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => drop(handle.spawn(task)),
                Err(_) => drop(runtime::spawn(task)),
            }
        }
        pool
    }

    /// Check out a connection. The returned [`PoolGuard`] puts it back on drop.
    pub async fn get(&self) -> Result<PoolGuard<'_>> {
        let permit = self.semaphore.acquire().await.map_err(|_| pool_closed())?;

        let idle = self.idle.lock().pop_back();
        let conn = match idle {
            Some(conn) => conn,
            None => RedisConnection::connect(&self.config).await?,
        };

        Ok(PoolGuard {
            conn: Some(conn),
            broken: false,
            pool: self,
            _permit: permit,
        })
    }

    /// Drop all idle connections and refuse further checkouts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
        self.idle.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Available permits (roughly `max_size - checked_out`).
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Return a connection (sync, safe for Drop).
    fn return_connection(&self, conn: RedisConnection) {
        if self.is_closed() {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_size {
            idle.push_back(conn);
        }
    }

    /// Ping the least recently used idle connection.
    async fn ping_one(&self) {
        let next = self.idle.lock().pop_front();
        let Some(mut conn) = next else {
            return;
        };
        match conn.ping().await {
            Ok(()) => self.return_connection(conn),
            Err(e) => warn!(address = %self.config.address, error = %e, "keep-alive ping failed, dropping connection"),
        }
    }
}

async fn keep_alive(pool: Weak<ConnectionPool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        if pool.is_closed() {
            debug!(address = %pool.config.address, "pool closed, keep-alive stops");
            break;
        }
        pool.ping_one().await;
    }
}

fn pool_closed() -> DatasourceError {
    DatasourceError::Connection(io::Error::new(io::ErrorKind::NotConnected, "pool is closed"))
}

/// RAII guard that returns the connection to the pool on drop.
///
/// A connection that saw a transport failure is discarded instead.
pub struct PoolGuard<'a> {
    conn: Option<RedisConnection>,
    broken: bool,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PoolGuard<'_> {
    fn conn(&mut self) -> Result<&mut RedisConnection> {
        self.conn.as_mut().ok_or_else(pool_closed)
    }

    pub async fn execute<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue> {
        let result = self.conn()?.execute(args).await;
        self.track(result)
    }

    pub async fn pipeline<A: AsRef<[u8]>>(&mut self, commands: &[Vec<A>]) -> Result<Vec<RespValue>> {
        let result = self.conn()?.pipeline(commands).await;
        self.track(result)
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            // Unread replies may still be in flight
            self.broken = true;
        }
        result
    }
}

impl Drop for PoolGuard<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.broken {
                self.pool.return_connection(conn);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
