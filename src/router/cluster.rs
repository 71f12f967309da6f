//! Redis Cluster topology router.
//!
//! Routes each command to the master owning its key's hash slot, follows
//! MOVED and ASK redirections and refreshes the slot map periodically.
//! Commands without a key (INFO, CLUSTER, SLOWLOG, TS.MRANGE, RG.*, …) go
//! to the first known master.

use crate::config::{Address, ConnectionConfig};
use crate::connection::pool::ConnectionPool;
use crate::connection::tcp::RedisConnection;
use crate::crc16::hash_slot;
use crate::error::{DatasourceError, RedisErrorKind, Result};
use crate::resp::types::RespValue;
use crate::router::Router;
use crate::runtime;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of MOVED/ASK redirects before giving up.
const MAX_REDIRECTS: usize = 5;

/// Background slot refresh interval.
const SLOT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// ── Slot map ──────────────────────────────────────────────────────

/// A range of hash slots served by one master.
#[derive(Debug, Clone)]
struct SlotRange {
    start: u16,
    end: u16,
    master: String,
}

/// Slot ranges sorted by start, for binary-search lookup.
#[derive(Debug, Clone, Default)]
struct SlotMap {
    ranges: Vec<SlotRange>,
}

impl SlotMap {
    fn position(&self, slot: u16) -> Option<usize> {
        self.ranges
            .binary_search_by(|r| {
                if slot < r.start {
                    std::cmp::Ordering::Greater
                } else if slot > r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
    }

    fn master_for_slot(&self, slot: u16) -> Option<&str> {
        self.position(slot).map(|i| self.ranges[i].master.as_str())
    }

    /// Point a slot's range at a new master after a MOVED reply.
    fn update_slot_master(&mut self, slot: u16, addr: &str) {
        if let Some(i) = self.position(slot) {
            self.ranges[i].master = addr.to_string();
        }
    }

    fn any_master(&self) -> Option<&str> {
        self.ranges.first().map(|r| r.master.as_str())
    }

    /// Parse a `CLUSTER SLOTS` reply.
    fn from_cluster_slots(resp: &RespValue) -> Result<Self> {
        let slots = resp.as_array().ok_or_else(|| {
            DatasourceError::Cluster(format!(
                "CLUSTER SLOTS: expected array, got {}",
                resp.type_name()
            ))
        })?;

        let mut ranges = Vec::with_capacity(slots.len());
        for entry in slots {
            let Some(items) = entry.as_array() else {
                continue;
            };
            if items.len() < 3 {
                continue;
            }
            let bound = |v: &RespValue| {
                v.as_int()
                    .and_then(|n| u16::try_from(n).ok())
                    .ok_or_else(|| DatasourceError::Cluster("CLUSTER SLOTS: invalid slot bound".into()))
            };
            ranges.push(SlotRange {
                start: bound(&items[0])?,
                end: bound(&items[1])?,
                master: parse_node_addr(&items[2])?,
            });
        }

        ranges.sort_by_key(|r| r.start);
        Ok(Self { ranges })
    }
}

/// `[host, port, …]` node entry → `"host:port"`.
fn parse_node_addr(val: &RespValue) -> Result<String> {
    let items = val
        .as_array()
        .filter(|items| items.len() >= 2)
        .ok_or_else(|| DatasourceError::Cluster("CLUSTER SLOTS: malformed node entry".into()))?;
    let host = items[0]
        .as_str()
        .ok_or_else(|| DatasourceError::Cluster("CLUSTER SLOTS: invalid host".into()))?;
    let port = items[1]
        .as_int()
        .ok_or_else(|| DatasourceError::Cluster("CLUSTER SLOTS: invalid port".into()))?;
    Ok(Address::tcp(host, port as u16).to_string())
}

// ── Key extraction ────────────────────────────────────────────────

/// The key a command routes by, if any.
fn extract_key(args: &[String]) -> Option<&str> {
    let cmd = args.first()?.to_ascii_uppercase();
    match cmd.as_str() {
        "PING" | "INFO" | "CLUSTER" | "CLIENT" | "SLOWLOG" | "SCAN" | "COMMAND" | "CONFIG"
        | "DBSIZE" | "TIME" | "TS.MRANGE" | "TS.MREVRANGE" | "TS.QUERYINDEX" | "TS.MGET"
        | "GRAPH.SLOWLOG" | "GRAPH.CONFIG" | "GRAPH.LIST" => None,
        // FT.* take an index name, not a key
        c if c.starts_with("FT.") || c.starts_with("RG.") => None,
        "MEMORY" => args.get(2).map(String::as_str),
        "XINFO" => args.get(2).map(String::as_str),
        _ => args.get(1).map(String::as_str),
    }
}

// ── ClusterRouter ─────────────────────────────────────────────────

/// Keeps one pool per node and a slot map for routing.
pub struct ClusterRouter {
    /// Per-node pools keyed by "host:port".
    nodes: RwLock<HashMap<String, Arc<ConnectionPool>>>,
    slot_map: RwLock<SlotMap>,
    /// Template for new node pools.
    config: ConnectionConfig,
    closed: AtomicBool,
}

impl ClusterRouter {
    /// Connect to the first reachable seed, read `CLUSTER SLOTS` and start
    /// the background refresh.
    pub async fn new(seeds: Vec<(String, u16)>, config: ConnectionConfig) -> Result<Arc<Self>> {
        if seeds.is_empty() {
            return Err(DatasourceError::Cluster(
                "at least one seed node is required".into(),
            ));
        }

        let router = Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
            slot_map: RwLock::new(SlotMap::default()),
            config,
            closed: AtomicBool::new(false),
        });

        let mut last_err = None;
        for (host, port) in &seeds {
            match router.refresh_slots_from(&Address::tcp(host.as_str(), *port)).await {
                Ok(()) => {
                    last_err = None;
                    break;
                }
                Err(e) => {
                    debug!(seed = %host, port, error = %e, "cluster seed unusable");
                    last_err = Some(e);
                }
            }
        }
        if let Some(e) = last_err {
            return Err(DatasourceError::Cluster(format!(
                "could not connect to any seed node: {e}"
            )));
        }

        let weak = Arc::downgrade(&router);
        runtime::spawn(async move {
            loop {
                tokio::time::sleep(SLOT_REFRESH_INTERVAL).await;
                let Some(router) = weak.upgrade() else {
                    break;
                };
                if router.closed.load(Ordering::Acquire) {
                    break;
                }
                let addr = router.slot_map.read().any_master().map(str::to_string);
                if let Some(addr) = addr {
                    let refreshed = match Address::parse(&addr) {
                        Ok(address) => router.refresh_slots_from(&address).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = refreshed {
                        warn!(node = %addr, error = %e, "cluster slot refresh failed");
                    }
                }
            }
        });

        Ok(router)
    }

    async fn refresh_slots_from(&self, address: &Address) -> Result<()> {
        let mut conn = RedisConnection::connect(&self.config.with_address(address.clone())).await?;
        let resp = conn.execute(&["CLUSTER", "SLOTS"]).await?;
        if let RespValue::Error(msg) = resp {
            return Err(DatasourceError::redis(msg));
        }
        let new_map = SlotMap::from_cluster_slots(&resp)?;

        {
            let mut nodes = self.nodes.write();
            for range in &new_map.ranges {
                self.ensure_pool_for(&mut nodes, &range.master);
            }
        }
        *self.slot_map.write() = new_map;
        Ok(())
    }

    fn ensure_pool_for(&self, nodes: &mut HashMap<String, Arc<ConnectionPool>>, addr: &str) {
        if nodes.contains_key(addr) {
            return;
        }
        match Address::parse(addr) {
            Ok(address) => {
                let pool = ConnectionPool::new(self.config.with_address(address));
                nodes.insert(addr.to_string(), pool);
            }
            Err(e) => warn!(node = %addr, error = %e, "ignoring node with bad address"),
        }
    }

    fn get_pool(&self, addr: &str) -> Result<Arc<ConnectionPool>> {
        if let Some(pool) = self.nodes.read().get(addr) {
            return Ok(pool.clone());
        }
        let mut nodes = self.nodes.write();
        self.ensure_pool_for(&mut nodes, addr);
        nodes
            .get(addr)
            .cloned()
            .ok_or_else(|| DatasourceError::Cluster(format!("no pool for node {addr}")))
    }

    /// Node a command goes to.
    fn route(&self, args: &[String]) -> Result<String> {
        let map = self.slot_map.read();
        let addr = match extract_key(args) {
            Some(key) => map.master_for_slot(hash_slot(key.as_bytes())),
            None => map.any_master(),
        };
        addr.map(str::to_string)
            .ok_or_else(|| DatasourceError::Cluster("no node available for command".into()))
    }

    /// Execute on a specific node, following redirects.
    fn execute_on<'a>(
        &'a self,
        addr: String,
        args: &'a [String],
        redirects_left: usize,
    ) -> Pin<Box<dyn Future<Output = Result<RespValue>> + Send + 'a>> {
        Box::pin(async move {
            let reply = {
                let pool = self.get_pool(&addr)?;
                let mut guard = pool.get().await?;
                guard.execute(args).await?
            };
            self.follow(reply, args, redirects_left).await
        })
    }

    /// Resolve a MOVED / ASK / TRYAGAIN reply; other replies pass through.
    async fn follow(&self, reply: RespValue, args: &[String], redirects_left: usize) -> Result<RespValue> {
        let RespValue::Error(msg) = &reply else {
            return Ok(reply);
        };
        match RedisErrorKind::classify(msg) {
            RedisErrorKind::Moved { slot, addr } => {
                if redirects_left == 0 {
                    return Err(DatasourceError::Cluster("too many MOVED redirects".into()));
                }
                self.slot_map.write().update_slot_master(slot, &addr);
                self.execute_on(addr, args, redirects_left - 1).await
            }
            RedisErrorKind::Ask { addr, .. } => {
                if redirects_left == 0 {
                    return Err(DatasourceError::Cluster("too many ASK redirects".into()));
                }
                let pool = self.get_pool(&addr)?;
                let mut guard = pool.get().await?;
                let asking = vec![vec!["ASKING".to_string()], args.to_vec()];
                let mut replies = guard.pipeline(&asking).await?;
                Ok(replies.pop().unwrap_or(RespValue::Null))
            }
            RedisErrorKind::ClusterDown => Err(DatasourceError::Cluster(msg.clone())),
            RedisErrorKind::TryAgain if redirects_left > 0 => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let addr = self.route(args)?;
                self.execute_on(addr, args, redirects_left - 1).await
            }
            _ => Ok(reply),
        }
    }
}

impl Router for ClusterRouter {
    async fn execute(&self, args: &[String]) -> Result<RespValue> {
        let addr = self.route(args)?;
        self.execute_on(addr, args, MAX_REDIRECTS).await
    }

    async fn pipeline(&self, commands: &[Vec<String>]) -> Result<Vec<RespValue>> {
        // Group by node, keeping each command's position
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, args) in commands.iter().enumerate() {
            groups.entry(self.route(args)?).or_default().push(idx);
        }

        let mut results: Vec<RespValue> = vec![RespValue::Null; commands.len()];
        for (addr, indexes) in groups {
            let batch: Vec<Vec<String>> = indexes.iter().map(|&i| commands[i].clone()).collect();
            let replies = {
                let pool = self.get_pool(&addr)?;
                let mut guard = pool.get().await?;
                guard.pipeline(&batch).await?
            };
            for (idx, reply) in indexes.into_iter().zip(replies) {
                results[idx] = self.follow(reply, &commands[idx], MAX_REDIRECTS).await?;
            }
        }
        Ok(results)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for pool in self.nodes.read().values() {
            pool.close();
        }
    }

    fn pool_idle_count(&self) -> usize {
        self.nodes.read().values().map(|p| p.idle_count()).sum()
    }

    fn pool_available(&self) -> usize {
        self.nodes.read().values().map(|p| p.available()).sum()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
