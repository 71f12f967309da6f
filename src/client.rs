//! Synchronous client surface consumed by the command decoders.
//!
//! Decoders never touch the transport: they call [`Client`] and receive the
//! decoded reply. [`RedisClient`] implements it over the topology routers by
//! blocking on the shared runtime; tests implement it with scripted replies.

use crate::config::{Address, ClientConfig, Topology};
use crate::error::{DatasourceError, Result};
use crate::resp::types::RespValue;
use crate::router::{ClusterRouter, Router, SentinelRouter, StandaloneRouter};
use crate::runtime;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Uniform access to a Redis deployment.
///
/// A server error reply is returned as `Err(DatasourceError::Redis)`.
pub trait Client: Send + Sync {
    /// Run a command whose arguments are all strings.
    fn run_cmd(&self, cmd: &str, args: &[&str]) -> Result<RespValue>;

    /// Run `cmd key args…`, rendering typed arguments as bulk strings.
    fn run_flat_cmd(&self, cmd: &str, key: &str, args: &[FlatArg]) -> Result<RespValue>;

    /// Pipeline a batch. The first error reply fails the whole batch.
    fn run_batch_flat_cmd(&self, batch: &[FlatCommand]) -> Result<Vec<RespValue>>;

    /// Release the connection pools.
    fn close(&self) -> Result<()>;
}

/// A typed command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatArg {
    Str(String),
    Int(i64),
    Float(f64),
    /// Flattened element-wise.
    List(Vec<FlatArg>),
}

impl FlatArg {
    fn flatten_into(&self, out: &mut Vec<String>) {
        match self {
            Self::Str(s) => out.push(s.clone()),
            Self::Int(i) => out.push(itoa::Buffer::new().format(*i).to_string()),
            // Shortest round-trip form, never exponent notation
            Self::Float(f) => out.push(f.to_string()),
            Self::List(items) => items.iter().for_each(|item| item.flatten_into(out)),
        }
    }
}

impl From<&str> for FlatArg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for FlatArg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for FlatArg {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<i64> for FlatArg {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for FlatArg {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<String>> for FlatArg {
    fn from(items: Vec<String>) -> Self {
        Self::List(items.into_iter().map(FlatArg::Str).collect())
    }
}

/// One command of a pipelined batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatCommand {
    pub cmd: String,
    pub key: String,
    pub args: Vec<FlatArg>,
}

impl FlatCommand {
    pub fn new(cmd: impl Into<String>, key: impl Into<String>, args: Vec<FlatArg>) -> Self {
        Self {
            cmd: cmd.into(),
            key: key.into(),
            args,
        }
    }

    /// Full argument vector: command, key, then the flattened arguments.
    pub fn argv(&self) -> Vec<String> {
        flat_argv(&self.cmd, &self.key, &self.args)
    }
}

pub(crate) fn flat_argv(cmd: &str, key: &str, args: &[FlatArg]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    argv.push(cmd.to_string());
    argv.push(key.to_string());
    for arg in args {
        arg.flatten_into(&mut argv);
    }
    argv
}

/// Turn an error reply into an error.
fn check_reply(reply: RespValue) -> Result<RespValue> {
    match reply {
        RespValue::Error(msg) => Err(DatasourceError::redis(msg)),
        other => Ok(other),
    }
}

// ── RedisClient ───────────────────────────────────────────────────

enum Backend {
    Standalone(StandaloneRouter),
    Cluster(Arc<ClusterRouter>),
    Sentinel(Arc<SentinelRouter>),
}

impl Backend {
    async fn execute(&self, argv: &[String]) -> Result<RespValue> {
        match self {
            Self::Standalone(r) => r.execute(argv).await,
            Self::Cluster(r) => r.execute(argv).await,
            Self::Sentinel(r) => r.execute(argv).await,
        }
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        match self {
            Self::Standalone(r) => r.pipeline(commands).await,
            Self::Cluster(r) => r.pipeline(commands).await,
            Self::Sentinel(r) => r.pipeline(commands).await,
        }
    }

    fn close(&self) {
        match self {
            Self::Standalone(r) => r.close(),
            Self::Cluster(r) => r.close(),
            Self::Sentinel(r) => r.close(),
        }
    }

    /// `(idle, available)` connection counts across pools.
    fn pool_stats(&self) -> (usize, usize) {
        match self {
            Self::Standalone(r) => (r.pool_idle_count(), r.pool_available()),
            Self::Cluster(r) => (r.pool_idle_count(), r.pool_available()),
            Self::Sentinel(r) => (r.pool_idle_count(), r.pool_available()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Standalone(_) => "standalone",
            Self::Cluster(_) => "cluster",
            Self::Sentinel(_) => "sentinel",
        }
    }
}

/// [`Client`] over a real deployment.
pub struct RedisClient {
    backend: Backend,
    timeout: Duration,
}

impl RedisClient {
    /// Build the routers for the configured topology and make sure the
    /// deployment is reachable.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let topology = config.topology()?;
        let timeout = config.timeout();

        let backend = runtime::block_on(async {
            let connect = async {
                match topology {
                    Topology::Standalone(address) => {
                        let router = StandaloneRouter::new(config.connection_config(address));
                        // Fail at construction when nothing answers
                        router.execute(&["PING".to_string()]).await.and_then(check_reply)?;
                        Ok(Backend::Standalone(router))
                    }
                    Topology::Cluster { seeds } => {
                        let template = config.connection_config(Address::tcp("127.0.0.1", 0));
                        Ok(Backend::Cluster(ClusterRouter::new(seeds, template).await?))
                    }
                    Topology::Sentinel {
                        master_name,
                        sentinels,
                    } => {
                        let template = config.connection_config(Address::tcp("127.0.0.1", 0));
                        let sentinel_template =
                            config.sentinel_connection_config(Address::tcp("127.0.0.1", 0));
                        Ok(Backend::Sentinel(
                            SentinelRouter::new(sentinels, master_name, template, sentinel_template)
                                .await?,
                        ))
                    }
                }
            };
            with_timeout(timeout, connect).await
        })?;

        info!(client = backend.name(), url = %config.url, "redis client ready");
        Ok(Self { backend, timeout })
    }

    fn call<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        runtime::block_on(with_timeout(self.timeout, fut))
    }
}

async fn with_timeout<T>(timeout: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(DatasourceError::Timeout(format!(
            "no reply within {timeout:?}"
        ))),
    }
}

impl fmt::Debug for RedisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisClient")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client for RedisClient {
    fn run_cmd(&self, cmd: &str, args: &[&str]) -> Result<RespValue> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(cmd.to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        debug!(?argv, "run_cmd");
        self.call(self.backend.execute(&argv)).and_then(check_reply)
    }

    fn run_flat_cmd(&self, cmd: &str, key: &str, args: &[FlatArg]) -> Result<RespValue> {
        let argv = flat_argv(cmd, key, args);
        debug!(?argv, "run_flat_cmd");
        self.call(self.backend.execute(&argv)).and_then(check_reply)
    }

    fn run_batch_flat_cmd(&self, batch: &[FlatCommand]) -> Result<Vec<RespValue>> {
        let commands: Vec<Vec<String>> = batch.iter().map(FlatCommand::argv).collect();
        debug!(commands = commands.len(), "run_batch_flat_cmd");
        let replies = self.call(self.backend.pipeline(&commands))?;
        replies.into_iter().map(check_reply).collect()
    }

    fn close(&self) -> Result<()> {
        let (idle, available) = self.backend.pool_stats();
        debug!(client = self.backend.name(), idle, available, "closing redis client");
        self.backend.close();
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────
