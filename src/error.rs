//! Error types shared by the connection layer, the client and the decoders.
//!
//! Every failure that can reach a query response is a [`DatasourceError`].
//! Its `Display` output is what the host shows the user, so server error
//! replies render as the bare server text.

use std::fmt;
use std::io;

/// Structured Redis error kinds, derived from the reply prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// MOVED slot host:port  (cluster)
    Moved { slot: u16, addr: String },
    /// ASK slot host:port  (cluster)
    Ask { slot: u16, addr: String },
    /// CLUSTERDOWN
    ClusterDown,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOSCRIPT No matching script
    NoScript,
    /// BUSY Redis is busy running a script
    Busy,
    /// TRYAGAIN
    TryAgain,
    /// Any other prefix (module errors, NOAUTH, WRONGPASS, …)
    Other(String),
}

impl RedisErrorKind {
    /// Classify a server error message such as `"WRONGTYPE Operation against…"`.
    pub fn classify(msg: &str) -> Self {
        if let Some(rest) = msg.strip_prefix("MOVED ") {
            return match parse_redirect(rest) {
                Some((slot, addr)) => Self::Moved { slot, addr },
                None => Self::Other("MOVED".to_string()),
            };
        }
        if let Some(rest) = msg.strip_prefix("ASK ") {
            return match parse_redirect(rest) {
                Some((slot, addr)) => Self::Ask { slot, addr },
                None => Self::Other("ASK".to_string()),
            };
        }

        let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
        match prefix {
            "ERR" => Self::Err,
            "WRONGTYPE" => Self::WrongType,
            "CLUSTERDOWN" => Self::ClusterDown,
            "LOADING" => Self::Loading,
            "READONLY" => Self::ReadOnly,
            "NOSCRIPT" => Self::NoScript,
            "BUSY" => Self::Busy,
            "TRYAGAIN" => Self::TryAgain,
            other => Self::Other(other.to_string()),
        }
    }
}

/// `<slot> <host:port>` tail of a MOVED / ASK reply.
fn parse_redirect(rest: &str) -> Option<(u16, String)> {
    let (slot, addr) = rest.split_once(' ')?;
    let slot = slot.parse::<u16>().ok()?;
    Some((slot, addr.to_string()))
}

/// All error variants of the data source.
#[derive(Debug)]
pub enum DatasourceError {
    /// TCP / Unix socket / IO level errors
    Connection(io::Error),
    /// RESP protocol parse errors
    Protocol(String),
    /// The parser needs more bytes. Control flow only.
    Incomplete,
    /// Redis returned an error reply
    Redis {
        kind: RedisErrorKind,
        message: String,
    },
    /// Operation timed out
    Timeout(String),
    /// Cluster topology errors (no node for slot, too many redirects)
    Cluster(String),
    /// Sentinel errors (master not found, …)
    Sentinel(String),
    /// Invalid instance settings
    Config(String),
    /// TLS setup failures (bad PEM, unsupported build)
    Tls(String),
    /// Query validation failure with a fixed, user-facing message
    Query(String),
    /// JSON decoding failure (query model, settings, JSON.GET payloads)
    Decode(String),
}

impl DatasourceError {
    /// Create a Redis error from a raw error reply, classifying its kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let message = msg.into();
        let kind = RedisErrorKind::classify(&message);
        Self::Redis { kind, message }
    }

    /// Validation failure carrying a fixed message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// True for failures of the transport itself (socket gone, timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl fmt::Display for DatasourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "connection error: {e}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Incomplete => write!(f, "incomplete RESP message"),
            Self::Redis { message, .. } => f.write_str(message),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cluster(msg) => write!(f, "cluster error: {msg}"),
            Self::Sentinel(msg) => write!(f, "sentinel error: {msg}"),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Tls(msg) => write!(f, "tls error: {msg}"),
            Self::Query(msg) => f.write_str(msg),
            Self::Decode(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for DatasourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DatasourceError {
    fn from(e: io::Error) -> Self {
        Self::Connection(e)
    }
}

impl From<serde_json::Error> for DatasourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DatasourceError>;

// ── Tests ──────────────────────────────────────────────────────────
