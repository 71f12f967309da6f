//! Instance settings and per-node connection configuration.
//!
//! The host hands over three pieces per data source instance: the URL, the
//! plain `jsonData` settings and the decrypted secure values. [`ClientConfig`]
//! gathers them, applies defaults and turns them into a [`Topology`] plus the
//! [`ConnectionConfig`] every pooled connection is dialled with.
//!
//! URL forms:
//! - `host[:port]` or `redis://host[:port]`            (standalone)
//! - `host[:port],host[:port],…`                       (cluster seeds / sentinels)
//! - `/var/run/redis/redis.sock`                       (socket)

use crate::error::{DatasourceError, Result};

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Redis port.
pub const DEFAULT_PORT: u16 = 6379;
/// Default Redis Sentinel port.
pub const DEFAULT_SENTINEL_PORT: u16 = 26379;
/// Pool size when the setting is missing or not positive.
pub const DEFAULT_POOL_SIZE: usize = 5;
/// Connect, read and write timeout in seconds when not configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Maximum read buffer size per connection (512 MB).
pub const DEFAULT_MAX_BUF_SIZE: usize = 512 * 1024 * 1024;

/// Which deployment the URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKind {
    #[default]
    Standalone,
    Cluster,
    Sentinel,
    Socket,
}

impl ClientKind {
    /// Unknown names fall back to a standalone server.
    pub fn from_name(name: &str) -> Self {
        match name {
            "cluster" => Self::Cluster,
            "sentinel" => Self::Sentinel,
            "socket" => Self::Socket,
            _ => Self::Standalone,
        }
    }
}

/// Decrypted secure values of an instance.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecureValues {
    pub password: String,
    pub sentinel_password: String,
    #[serde(rename = "tlsCACert")]
    pub tls_ca_cert: String,
    pub tls_client_cert: String,
    pub tls_client_key: String,
}

impl fmt::Debug for SecureValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(s: &str) -> &'static str {
            if s.is_empty() {
                ""
            } else {
                "<redacted>"
            }
        }
        f.debug_struct("SecureValues")
            .field("password", &redact(&self.password))
            .field("sentinel_password", &redact(&self.sentinel_password))
            .field("tls_ca_cert", &redact(&self.tls_ca_cert))
            .field("tls_client_cert", &redact(&self.tls_client_cert))
            .field("tls_client_key", &redact(&self.tls_client_key))
            .finish()
    }
}

/// Instance settings as configured on the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(skip)]
    pub url: String,
    pub client: String,
    pub pool_size: i64,
    /// Seconds.
    pub timeout: i64,
    /// Seconds.
    pub ping_interval: i64,
    /// Microseconds.
    pub pipeline_window: i64,
    pub tls_auth: bool,
    pub tls_skip_verify: bool,
    pub acl: bool,
    pub user: String,
    pub sentinel_name: String,
    pub sentinel_acl: bool,
    pub sentinel_user: String,
    #[serde(skip)]
    pub secure: SecureValues,
}

impl ClientConfig {
    /// Build the configuration from the host settings.
    pub fn from_settings(
        url: &str,
        json_data: &serde_json::Value,
        secure_json_data: &serde_json::Value,
    ) -> Result<Self> {
        let mut config: ClientConfig = if json_data.is_null() {
            ClientConfig::default()
        } else {
            serde_json::from_value(json_data.clone())
                .map_err(|e| DatasourceError::Config(format!("invalid jsonData: {e}")))?
        };
        if !secure_json_data.is_null() {
            config.secure = serde_json::from_value(secure_json_data.clone())
                .map_err(|e| DatasourceError::Config(format!("invalid secureJsonData: {e}")))?;
        }
        config.url = url.trim().to_string();
        Ok(config)
    }

    pub fn kind(&self) -> ClientKind {
        ClientKind::from_name(&self.client)
    }

    pub fn pool_size(&self) -> usize {
        if self.pool_size > 0 {
            self.pool_size as usize
        } else {
            DEFAULT_POOL_SIZE
        }
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout > 0 {
            Duration::from_secs(self.timeout as u64)
        } else {
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        }
    }

    /// Keep-alive cadence: the interval is spread over the pool, so each of
    /// the `poolSize + 1` ticks pings one idle connection.
    pub fn ping_interval(&self) -> Option<Duration> {
        if self.ping_interval <= 0 {
            return None;
        }
        let per_tick = Duration::from_secs(self.ping_interval as u64) / (self.pool_size() as u32 + 1);
        Some(per_tick)
    }

    pub fn pipeline_window(&self) -> Option<Duration> {
        (self.pipeline_window > 0).then(|| Duration::from_micros(self.pipeline_window as u64))
    }

    /// Resolve the URL into a topology.
    pub fn topology(&self) -> Result<Topology> {
        if self.url.is_empty() {
            return Err(DatasourceError::Config("URL is empty".into()));
        }
        match self.kind() {
            ClientKind::Standalone => {
                let (host, port) = parse_host_port(strip_scheme(&self.url), DEFAULT_PORT)?;
                Ok(Topology::Standalone(Address::Tcp { host, port }))
            }
            ClientKind::Socket => Ok(Topology::Standalone(Address::Unix(PathBuf::from(
                self.url.trim_start_matches("unix://"),
            )))),
            ClientKind::Cluster => Ok(Topology::Cluster {
                seeds: parse_address_list(&self.url, DEFAULT_PORT)?,
            }),
            ClientKind::Sentinel => {
                if self.sentinel_name.is_empty() {
                    return Err(DatasourceError::Config(
                        "sentinel master name is required".into(),
                    ));
                }
                Ok(Topology::Sentinel {
                    master_name: self.sentinel_name.clone(),
                    sentinels: parse_address_list(&self.url, DEFAULT_SENTINEL_PORT)?,
                })
            }
        }
    }

    /// Dial settings for data connections to `address`.
    pub fn connection_config(&self, address: Address) -> ConnectionConfig {
        let (username, password) = credentials(self.acl, &self.user, &self.secure.password);
        ConnectionConfig {
            address,
            username,
            password,
            pool_size: self.pool_size(),
            connect_timeout: self.timeout(),
            read_timeout: self.timeout(),
            ping_interval: self.ping_interval(),
            nodelay: self.pipeline_window().is_none(),
            tls: self.tls_settings(),
            max_buffer_size: DEFAULT_MAX_BUF_SIZE,
        }
    }

    /// Dial settings for sentinel connections: same transport, own credentials.
    pub fn sentinel_connection_config(&self, address: Address) -> ConnectionConfig {
        let (username, password) = credentials(
            self.sentinel_acl,
            &self.sentinel_user,
            &self.secure.sentinel_password,
        );
        ConnectionConfig {
            username,
            password,
            ..self.connection_config(address)
        }
    }

    fn tls_settings(&self) -> Option<TlsSettings> {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        self.tls_auth.then(|| TlsSettings {
            skip_verify: self.tls_skip_verify,
            ca_cert: non_empty(&self.secure.tls_ca_cert),
            client_cert: non_empty(&self.secure.tls_client_cert),
            client_key: non_empty(&self.secure.tls_client_key),
        })
    }
}

/// `AUTH user pass` with ACL, `AUTH pass` when only a password is set.
fn credentials(acl: bool, user: &str, password: &str) -> (Option<String>, Option<String>) {
    if acl {
        (Some(user.to_string()), Some(password.to_string()))
    } else if !password.is_empty() {
        (None, Some(password.to_string()))
    } else {
        (None, None)
    }
}

/// Resolved deployment shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Topology {
    Standalone(Address),
    Cluster { seeds: Vec<(String, u16)> },
    Sentinel {
        master_name: String,
        sentinels: Vec<(String, u16)>,
    },
}

/// Where a single connection dials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Address {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` as reported by CLUSTER SLOTS, MOVED or SENTINEL.
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = parse_host_port(addr, DEFAULT_PORT)?;
        Ok(Self::Tcp { host, port })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            Self::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// TLS material for a connection.
#[derive(Clone, Default, PartialEq)]
pub struct TlsSettings {
    pub skip_verify: bool,
    pub ca_cert: Option<String>,
    pub client_cert: Option<String>,
    pub client_key: Option<String>,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("skip_verify", &self.skip_verify)
            .field("ca_cert", &self.ca_cert.is_some())
            .field("client_cert", &self.client_cert.is_some())
            .field("client_key", &self.client_key.is_some())
            .finish()
    }
}

/// Settings one pooled connection is dialled with.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub address: Address,
    /// ACL user name; `None` sends the single-argument AUTH.
    pub username: Option<String>,
    pub password: Option<String>,
    pub pool_size: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Interval between keep-alive pings of idle connections.
    pub ping_interval: Option<Duration>,
    /// `false` leaves Nagle on so pipelined writes coalesce.
    pub nodelay: bool,
    pub tls: Option<TlsSettings>,
    pub max_buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: Address::tcp("127.0.0.1", DEFAULT_PORT),
            username: None,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ping_interval: None,
            nodelay: true,
            tls: None,
            max_buffer_size: DEFAULT_MAX_BUF_SIZE,
        }
    }
}

impl ConnectionConfig {
    /// Same settings, different node.
    pub fn with_address(&self, address: Address) -> Self {
        Self {
            address,
            ..self.clone()
        }
    }
}

// ── URL parsing helpers ────────────────────────────────────────────

fn strip_scheme(s: &str) -> &str {
    let s = s.trim();
    let s = s
        .strip_prefix("redis://")
        .or_else(|| s.strip_prefix("rediss://"))
        .unwrap_or(s);
    // A trailing /db path is not used by any topology here
    s.split('/').next().unwrap_or(s)
}

/// Parse a comma-separated `host[:port]` list.
pub fn parse_address_list(url: &str, default_port: u16) -> Result<Vec<(String, u16)>> {
    let mut nodes = Vec::new();
    for part in url.split(',') {
        let part = strip_scheme(part);
        if part.is_empty() {
            continue;
        }
        nodes.push(parse_host_port(part, default_port)?);
    }
    if nodes.is_empty() {
        return Err(DatasourceError::Config(format!(
            "no address found in URL: {url}"
        )));
    }
    Ok(nodes)
}

/// Parse `host[:port]` or `[ipv6]:port`.
pub fn parse_host_port(s: &str, default_port: u16) -> Result<(String, u16)> {
    let invalid_port = |p: &str| DatasourceError::Config(format!("invalid port: {p}"));

    let (host, port) = if let Some(rest) = s.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| DatasourceError::Config(format!("unclosed IPv6 bracket: {s}")))?;
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| invalid_port(p))?,
            None => default_port,
        };
        (host.to_string(), port)
    } else {
        match s.rsplit_once(':') {
            // Bare IPv6 without brackets keeps the default port
            Some((h, _)) if h.contains(':') => (s.to_string(), default_port),
            Some((h, p)) => (h.to_string(), p.parse().map_err(|_| invalid_port(p))?),
            None => (s.to_string(), default_port),
        }
    };

    if host.is_empty() {
        return Ok(("127.0.0.1".to_string(), port));
    }
    Ok((host, port))
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(url: &str, json_data: serde_json::Value) -> ClientConfig {
        ClientConfig::from_settings(url, &json_data, &serde_json::Value::Null).unwrap()
    }

    #[test]
    fn defaults_apply_for_missing_and_non_positive_values() {
        let c = config("localhost:6379", json!({ "poolSize": 0, "timeout": -3 }));
        assert_eq!(c.pool_size(), 5);
        assert_eq!(c.timeout(), Duration::from_secs(10));
        assert_eq!(c.ping_interval(), None);
        assert_eq!(c.pipeline_window(), None);
        assert_eq!(c.kind(), ClientKind::Standalone);
    }

    #[test]
    fn json_data_is_camel_case() {
        let c = config(
            "localhost",
            json!({
                "client": "sentinel",
                "poolSize": 7,
                "timeout": 3,
                "pingInterval": 16,
                "pipelineWindow": 150,
                "tlsAuth": true,
                "tlsSkipVerify": true,
                "acl": true,
                "user": "alice",
                "sentinelName": "mymaster",
                "sentinelAcl": true,
                "sentinelUser": "sentinel-admin"
            }),
        );
        assert_eq!(c.kind(), ClientKind::Sentinel);
        assert_eq!(c.pool_size(), 7);
        assert_eq!(c.timeout(), Duration::from_secs(3));
        assert_eq!(c.ping_interval(), Some(Duration::from_secs(2)));
        assert_eq!(c.pipeline_window(), Some(Duration::from_micros(150)));
        assert!(c.tls_auth && c.tls_skip_verify && c.acl && c.sentinel_acl);
        assert_eq!(c.user, "alice");
        assert_eq!(c.sentinel_name, "mymaster");
        assert_eq!(c.sentinel_user, "sentinel-admin");
    }

    #[test]
    fn unknown_client_name_is_standalone() {
        assert_eq!(ClientKind::from_name("weird"), ClientKind::Standalone);
        assert_eq!(ClientKind::from_name("socket"), ClientKind::Socket);
    }

    #[test]
    fn secure_values_are_read() {
        let c = ClientConfig::from_settings(
            "localhost",
            &json!({}),
            &json!({ "password": "pw", "tlsCACert": "CA", "sentinelPassword": "spw" }),
        )
        .unwrap();
        assert_eq!(c.secure.password, "pw");
        assert_eq!(c.secure.tls_ca_cert, "CA");
        assert_eq!(c.secure.sentinel_password, "spw");
        assert!(!format!("{:?}", c.secure).contains("pw"));
    }

    #[test]
    fn invalid_json_data_is_config_error() {
        let err = ClientConfig::from_settings("x", &json!({ "poolSize": "many" }), &json!(null))
            .unwrap_err();
        assert!(matches!(err, DatasourceError::Config(_)));
    }

    #[test]
    fn standalone_topology() {
        let c = config("redis://cache.local:6380", json!({}));
        assert_eq!(
            c.topology().unwrap(),
            Topology::Standalone(Address::tcp("cache.local", 6380))
        );
        let c = config("cache.local", json!({}));
        assert_eq!(
            c.topology().unwrap(),
            Topology::Standalone(Address::tcp("cache.local", 6379))
        );
    }

    #[test]
    fn socket_topology() {
        let c = config("/tmp/redis.sock", json!({ "client": "socket" }));
        assert_eq!(
            c.topology().unwrap(),
            Topology::Standalone(Address::Unix(PathBuf::from("/tmp/redis.sock")))
        );
    }

    #[test]
    fn cluster_topology() {
        let c = config("redis://a:7000, b:7001,c", json!({ "client": "cluster" }));
        assert_eq!(
            c.topology().unwrap(),
            Topology::Cluster {
                seeds: vec![
                    ("a".into(), 7000),
                    ("b".into(), 7001),
                    ("c".into(), 6379)
                ]
            }
        );
    }

    #[test]
    fn sentinel_topology_defaults_to_sentinel_port() {
        let c = config("s1,s2:5000", json!({ "client": "sentinel", "sentinelName": "m" }));
        assert_eq!(
            c.topology().unwrap(),
            Topology::Sentinel {
                master_name: "m".into(),
                sentinels: vec![("s1".into(), 26379), ("s2".into(), 5000)]
            }
        );
    }

    #[test]
    fn sentinel_requires_master_name() {
        let c = config("s1", json!({ "client": "sentinel" }));
        assert!(matches!(c.topology(), Err(DatasourceError::Config(_))));
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(config("  ", json!({})).topology().is_err());
        assert!(config(",", json!({ "client": "cluster" })).topology().is_err());
    }

    #[test]
    fn credentials_without_acl() {
        let mut c = config("localhost", json!({ "user": "ignored" }));
        let cc = c.connection_config(Address::tcp("h", 1));
        assert_eq!((cc.username, cc.password), (None, None));

        c.secure.password = "pw".into();
        let cc = c.connection_config(Address::tcp("h", 1));
        assert_eq!((cc.username, cc.password.as_deref()), (None, Some("pw")));
    }

    #[test]
    fn credentials_with_acl() {
        let mut c = config("localhost", json!({ "acl": true, "user": "alice" }));
        c.secure.password = "pw".into();
        let cc = c.connection_config(Address::tcp("h", 1));
        assert_eq!(cc.username.as_deref(), Some("alice"));
        assert_eq!(cc.password.as_deref(), Some("pw"));
    }

    #[test]
    fn sentinel_connections_use_sentinel_credentials() {
        let mut c = config(
            "s1",
            json!({ "client": "sentinel", "sentinelName": "m", "sentinelAcl": true, "sentinelUser": "watcher" }),
        );
        c.secure.password = "data-pw".into();
        c.secure.sentinel_password = "sentinel-pw".into();
        let cc = c.sentinel_connection_config(Address::tcp("s1", 26379));
        assert_eq!(cc.username.as_deref(), Some("watcher"));
        assert_eq!(cc.password.as_deref(), Some("sentinel-pw"));
    }

    #[test]
    fn pipeline_window_disables_nodelay() {
        let c = config("h", json!({ "pipelineWindow": 100 }));
        assert!(!c.connection_config(Address::tcp("h", 1)).nodelay);
        let c = config("h", json!({}));
        assert!(c.connection_config(Address::tcp("h", 1)).nodelay);
    }

    #[test]
    fn tls_settings_follow_tls_auth() {
        let mut c = config("h", json!({ "tlsAuth": true, "tlsSkipVerify": true }));
        c.secure.tls_client_cert = "CERT".into();
        let tls = c.connection_config(Address::tcp("h", 1)).tls.unwrap();
        assert!(tls.skip_verify);
        assert_eq!(tls.client_cert.as_deref(), Some("CERT"));
        assert_eq!(tls.ca_cert, None);

        let c = config("h", json!({}));
        assert!(c.connection_config(Address::tcp("h", 1)).tls.is_none());
    }

    #[test]
    fn host_port_parsing() {
        assert_eq!(parse_host_port("h:1", 9).unwrap(), ("h".into(), 1));
        assert_eq!(parse_host_port("h", 9).unwrap(), ("h".into(), 9));
        assert_eq!(parse_host_port("[::1]:7000", 9).unwrap(), ("::1".into(), 7000));
        assert_eq!(parse_host_port("[::1]", 9).unwrap(), ("::1".into(), 9));
        assert_eq!(parse_host_port("::1", 9).unwrap(), ("::1".into(), 9));
        assert_eq!(parse_host_port(":7000", 9).unwrap(), ("127.0.0.1".into(), 7000));
        assert!(parse_host_port("h:port", 9).is_err());
        assert!(parse_host_port("[::1:7000", 9).is_err());
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::tcp("10.0.0.1", 6379).to_string(), "10.0.0.1:6379");
        assert_eq!(Address::tcp("::1", 6379).to_string(), "[::1]:6379");
        assert_eq!(Address::Unix("/tmp/r.sock".into()).to_string(), "/tmp/r.sock");
        assert_eq!(Address::parse("10.0.0.2:7001").unwrap(), Address::tcp("10.0.0.2", 7001));
    }
}
