//! Redis Sentinel topology router.
//!
//! Asks the sentinels for the current master of `sentinelName`, keeps a
//! pool to it and re-resolves the master when a command fails on the
//! transport or hits a READONLY replica. Sentinel connections are dialled
//! with the sentinel credentials, data connections with the data ones.

use crate::config::{Address, ConnectionConfig};
use crate::connection::pool::ConnectionPool;
use crate::connection::tcp::RedisConnection;
use crate::error::{DatasourceError, RedisErrorKind, Result};
use crate::resp::types::RespValue;
use crate::router::Router;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retries after a failover was detected.
const RETRY_COUNT: usize = 3;

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

pub struct SentinelRouter {
    master_pool: RwLock<Arc<ConnectionPool>>,
    master_addr: RwLock<Address>,
    sentinels: Vec<(String, u16)>,
    master_name: String,
    /// Data connection template.
    config: ConnectionConfig,
    /// Sentinel connection template.
    sentinel_config: ConnectionConfig,
    closed: AtomicBool,
}

impl SentinelRouter {
    /// Resolve the current master from the first sentinel that knows it.
    pub async fn new(
        sentinels: Vec<(String, u16)>,
        master_name: String,
        config: ConnectionConfig,
        sentinel_config: ConnectionConfig,
    ) -> Result<Arc<Self>> {
        if sentinels.is_empty() {
            return Err(DatasourceError::Sentinel(
                "at least one sentinel is required".into(),
            ));
        }

        let master_addr = resolve_master(&sentinels, &master_name, &sentinel_config).await?;
        info!(master = %master_name, address = %master_addr, "sentinel resolved master");
        let master_pool = ConnectionPool::new(config.with_address(master_addr.clone()));

        Ok(Arc::new(Self {
            master_pool: RwLock::new(master_pool),
            master_addr: RwLock::new(master_addr),
            sentinels,
            master_name,
            config,
            sentinel_config,
            closed: AtomicBool::new(false),
        }))
    }

    fn current_pool(&self) -> Arc<ConnectionPool> {
        self.master_pool.read().clone()
    }

    /// Re-resolve the master and swap the pool if it moved.
    async fn failover(&self) -> Result<()> {
        let new_addr =
            resolve_master(&self.sentinels, &self.master_name, &self.sentinel_config).await?;
        if self.closed.load(Ordering::Acquire) {
            return Err(DatasourceError::Sentinel("router is closed".into()));
        }

        let current = self.master_addr.read().clone();
        if new_addr != current {
            warn!(master = %self.master_name, from = %current, to = %new_addr, "sentinel master changed");
            let new_pool = ConnectionPool::new(self.config.with_address(new_addr.clone()));
            let old = std::mem::replace(&mut *self.master_pool.write(), new_pool);
            old.close();
            *self.master_addr.write() = new_addr;
        }
        Ok(())
    }

    async fn execute_with_retry(&self, args: &[String]) -> Result<RespValue> {
        let mut last_err = None;

        for attempt in 0..=RETRY_COUNT {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF).await;
                if let Err(e) = self.failover().await {
                    last_err = Some(e);
                    continue;
                }
            }

            let pool = self.current_pool();
            if pool.is_closed() && self.closed.load(Ordering::Acquire) {
                return Err(DatasourceError::Sentinel("router is closed".into()));
            }
            let result = match pool.get().await {
                Ok(mut guard) => guard.execute(args).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(RespValue::Error(msg)) if RedisErrorKind::classify(&msg) == RedisErrorKind::ReadOnly => {
                    last_err = Some(DatasourceError::redis(msg));
                }
                Ok(reply) => return Ok(reply),
                Err(e) if e.is_transport() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DatasourceError::Sentinel("all failover retries exhausted".into())
        }))
    }
}

impl Router for SentinelRouter {
    async fn execute(&self, args: &[String]) -> Result<RespValue> {
        self.execute_with_retry(args).await
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        // Batches go to the current master without failover retries
        let pool = self.current_pool();
        let mut guard = pool.get().await?;
        guard.pipeline(commands).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.current_pool().close();
    }

    fn pool_idle_count(&self) -> usize {
        self.current_pool().idle_count()
    }

    fn pool_available(&self) -> usize {
        self.current_pool().available()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Ask each sentinel in turn for the master address.
async fn resolve_master(
    sentinels: &[(String, u16)],
    master_name: &str,
    sentinel_config: &ConnectionConfig,
) -> Result<Address> {
    let mut last_err = None;

    for (host, port) in sentinels {
        let config = sentinel_config.with_address(Address::tcp(host.as_str(), *port));
        let reply = match RedisConnection::connect(&config).await {
            Ok(mut conn) => {
                conn.execute(&["SENTINEL", "get-master-addr-by-name", master_name])
                    .await
            }
            Err(e) => Err(e),
        };
        match reply {
            Ok(RespValue::Array(ref items)) if items.len() >= 2 => {
                let host = items[0].as_str();
                let port = items[1].to_int().and_then(|p| u16::try_from(p).ok());
                match (host, port) {
                    (Some(host), Some(port)) => return Ok(Address::tcp(host, port)),
                    _ => {
                        last_err = Some(DatasourceError::Sentinel(
                            "invalid master address from sentinel".into(),
                        ))
                    }
                }
            }
            Ok(RespValue::Null) => {
                last_err = Some(DatasourceError::Sentinel(format!(
                    "master '{master_name}' not found by sentinel at {host}:{port}"
                )));
            }
            Ok(RespValue::Error(msg)) => last_err = Some(DatasourceError::redis(msg)),
            Ok(other) => {
                last_err = Some(DatasourceError::Sentinel(format!(
                    "unexpected sentinel response: {}",
                    other.type_name()
                )));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        DatasourceError::Sentinel("could not contact any sentinel".into())
    }))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `reply` to every command on every connection.
    async fn canned_server(reply: String) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let reply = reply.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    while let Ok(n) = socket.read(&mut buf).await {
                        if n == 0 || socket.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });
        port
    }

    fn quick() -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(500),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn resolves_master_and_executes() {
        let master = canned_server("+PONG\r\n".into()).await;
        let sentinel = canned_server(format!(
            "*2\r\n$9\r\n127.0.0.1\r\n${}\r\n{}\r\n",
            master.to_string().len(),
            master
        ))
        .await;

        let router = SentinelRouter::new(
            vec![("127.0.0.1".into(), sentinel)],
            "mymaster".into(),
            quick(),
            quick(),
        )
        .await
        .unwrap();
        assert_eq!(*router.master_addr.read(), Address::tcp("127.0.0.1", master));
        let reply = router.execute(&["PING".to_string()]).await.unwrap();
        assert_eq!(reply, RespValue::simple("PONG"));
    }

    #[tokio::test]
    async fn unknown_master_name() {
        let sentinel = canned_server("*-1\r\n".into()).await;
        let err = resolve_master(&[("127.0.0.1".into(), sentinel)], "nope", &quick())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("master 'nope' not found"));
    }

    #[tokio::test]
    async fn no_sentinels() {
        let result = SentinelRouter::new(vec![], "m".into(), quick(), quick()).await;
        assert!(matches!(result, Err(DatasourceError::Sentinel(_))));
    }

    #[tokio::test]
    async fn unreachable_sentinel() {
        let config = ConnectionConfig {
            connect_timeout: Duration::from_millis(100),
            ..ConnectionConfig::default()
        };
        let result = resolve_master(&[("127.0.0.1".into(), 1)], "mymaster", &config).await;
        assert!(result.is_err());
    }
}
