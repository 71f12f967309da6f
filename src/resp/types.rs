use bytes::Bytes;

/// A decoded RESP reply.
///
/// RESP3-only shapes are folded into the RESP2 ones by the parser: maps and
/// sets become arrays, doubles and big numbers become simple strings and
/// booleans become integers. Decoders therefore only ever match on the
/// variants below.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// $-1\r\n, *-1\r\n or _\r\n
    Null,
    /// :1000\r\n
    Integer(i64),
    /// $6\r\nfoobar\r\n
    BulkString(Bytes),
    /// +OK\r\n
    SimpleString(String),
    /// *2\r\n…
    Array(Vec<RespValue>),
    /// -ERR message\r\n
    Error(String),
}

// ── Convenience accessors ──────────────────────────────────────────

impl RespValue {
    /// Build a bulk string from anything byte-like (handy for fixtures).
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Self::BulkString(data.into())
    }

    /// Build a simple string.
    pub fn simple(s: impl Into<String>) -> Self {
        Self::SimpleString(s.into())
    }

    /// Borrow the value as UTF-8 text (bulk strings must be valid UTF-8).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SimpleString(s) => Some(s),
            Self::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Text content of a bulk or simple string, lossily decoded.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::SimpleString(s) => Some(s.clone()),
            Self::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Text rendering of a scalar reply: strings as-is, integers in base 10.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Integer(i) => Some(itoa::Buffer::new().format(*i).to_string()),
            _ => self.text(),
        }
    }

    /// The integer value of an integer reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integer reply, or a string reply that parses as a base-10 integer.
    pub fn to_int(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => self.as_str().and_then(|s| s.trim().parse().ok()),
        }
    }

    /// Float value of a string reply, or of an integer reply.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            _ => self.as_str().and_then(|s| s.trim().parse().ok()),
        }
    }

    /// Borrow the elements of an array reply.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Returns true when this value represents null / nil.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the error message if this is an error reply.
    pub fn as_error_msg(&self) -> Option<&str> {
        match self {
            Self::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the type name as a static string (used in log lines).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::BulkString(_) => "bulk_string",
            Self::SimpleString(_) => "simple_string",
            Self::Array(_) => "array",
            Self::Error(_) => "error",
        }
    }
}

impl From<&str> for RespValue {
    fn from(s: &str) -> Self {
        Self::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for RespValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<Vec<RespValue>> for RespValue {
    fn from(items: Vec<RespValue>) -> Self {
        Self::Array(items)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
