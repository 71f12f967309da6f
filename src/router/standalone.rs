//! Standalone topology router.
//!
//! Routes every command to one server (TCP or Unix socket) through a
//! connection pool.

use crate::config::ConnectionConfig;
use crate::connection::pool::ConnectionPool;
use crate::error::Result;
use crate::resp::types::RespValue;
use crate::router::Router;

use std::sync::Arc;

pub struct StandaloneRouter {
    pool: Arc<ConnectionPool>,
}

impl StandaloneRouter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            pool: ConnectionPool::new(config),
        }
    }
}

impl Router for StandaloneRouter {
    async fn execute(&self, args: &[String]) -> Result<RespValue> {
        let mut guard = self.pool.get().await?;
        guard.execute(args).await
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.pool.get().await?;
        guard.pipeline(commands).await
    }

    fn close(&self) {
        self.pool.close();
    }

    fn pool_idle_count(&self) -> usize {
        self.pool.idle_count()
    }

    fn pool_available(&self) -> usize {
        self.pool.available()
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Address;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Mock server writing the next canned reply after each read.
    async fn mock_server_with_responses(responses: Vec<&'static str>) -> ConnectionConfig {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            for response in responses {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                socket.write_all(response.as_bytes()).await.unwrap();
            }
        });

        ConnectionConfig {
            address: Address::tcp("127.0.0.1", port),
            pool_size: 2,
            connect_timeout: Duration::from_secs(1),
            ..ConnectionConfig::default()
        }
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn standalone_execute() {
        let config = mock_server_with_responses(vec!["+PONG\r\n"]).await;
        let router = StandaloneRouter::new(config);
        let reply = router.execute(&args(&["PING"])).await.unwrap();
        assert_eq!(reply, RespValue::simple("PONG"));
    }

    #[tokio::test]
    async fn error_reply_is_returned_as_value() {
        let config = mock_server_with_responses(vec!["-ERR unknown command 'FOO'\r\n"]).await;
        let router = StandaloneRouter::new(config);
        let reply = router.execute(&args(&["FOO"])).await.unwrap();
        assert_eq!(reply, RespValue::Error("ERR unknown command 'FOO'".into()));
        // Error replies leave the connection usable
        assert_eq!(router.pool_idle_count(), 1);
    }

    #[tokio::test]
    async fn standalone_pipeline() {
        let config = mock_server_with_responses(vec!["$6\r\nstring\r\n+stream\r\n+set\r\n"]).await;
        let router = StandaloneRouter::new(config);
        let commands = vec![args(&["TYPE", "a"]), args(&["TYPE", "b"]), args(&["TYPE", "c"])];
        let replies = router.pipeline(&commands).await.unwrap();
        assert_eq!(
            replies,
            vec![
                RespValue::from("string"),
                RespValue::simple("stream"),
                RespValue::simple("set")
            ]
        );
    }

    #[tokio::test]
    async fn empty_pipeline_sends_nothing() {
        let router = StandaloneRouter::new(ConnectionConfig {
            address: Address::tcp("127.0.0.1", 1),
            ..ConnectionConfig::default()
        });
        assert!(router.pipeline(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_rejects_later_calls() {
        let config = mock_server_with_responses(vec!["+PONG\r\n"]).await;
        let router = StandaloneRouter::new(config);
        router.execute(&args(&["PING"])).await.unwrap();
        router.close();
        assert!(router.execute(&args(&["PING"])).await.is_err());
        assert_eq!(router.pool_idle_count(), 0);
    }

    #[tokio::test]
    async fn pool_stats() {
        let config = mock_server_with_responses(vec!["+PONG\r\n"]).await;
        let router = StandaloneRouter::new(config);
        assert_eq!(router.pool_available(), 2);
        assert_eq!(router.pool_idle_count(), 0);
        router.execute(&args(&["PING"])).await.unwrap();
        assert_eq!(router.pool_idle_count(), 1);
    }
}
