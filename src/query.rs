//! Query model and per-query envelopes.

use crate::error::{DatasourceError, Result};
use crate::frame::Frame;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Parameters of one query, as authored in the query editor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryModel {
    #[serde(rename = "type")]
    pub query_type: String,
    pub command: String,
    /// Free-form command text; supersedes `command` when non-empty.
    pub query: String,
    #[serde(alias = "key")]
    pub key_name: String,
    pub field: String,
    pub filter: String,

    // Time series
    pub aggregation: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub bucket: i64,
    pub fill: bool,
    pub legend: String,
    pub value: String,

    // INFO / SLOWLOG
    pub section: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub size: i64,

    // Streaming
    pub streaming: bool,
    pub streaming_data_type: String,

    pub cli: bool,

    // TMSCAN
    #[serde(deserialize_with = "lenient_string")]
    pub cursor: String,
    #[serde(rename = "match")]
    pub match_pattern: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub count: i64,
    #[serde(deserialize_with = "lenient_i64")]
    pub samples: i64,

    // Streams
    pub start: String,
    pub end: String,

    // Graph
    pub cypher: String,

    // Sorted sets
    pub min: String,
    pub max: String,
    pub z_range_query: String,

    // JSON
    pub path: String,

    // Search
    pub search_query: String,
    pub return_fields: Vec<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub offset: i64,
    pub sort_by: String,
    pub sort_direction: String,

    // Gears
    pub unblocking: bool,
    pub requirements: String,
}

impl QueryModel {
    /// Decode the query JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(Self::deserialize(json)?)
    }

    /// Whether the streaming transform applies to this query's frames.
    pub fn wants_streaming(&self) -> bool {
        self.streaming && self.streaming_data_type != "DataFrame"
    }
}

/// Numbers may arrive as JSON numbers, numeric strings or be absent.
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(n) => Ok(n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0)),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(0),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid number: {s:?}"))),
        other => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

// ── Requests ───────────────────────────────────────────────────────

/// Query window, carried as epoch milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub from: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn from_ms(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_ms(&self) -> i64 {
        self.to.timestamp_millis()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    #[serde(default)]
    pub time_range: TimeRange,
    #[serde(default)]
    pub json: serde_json::Value,
}

/// Frames or an error for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DataResponse {
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames, error: None }
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.to_string()),
        }
    }

    pub fn from_result(result: Result<Vec<Frame>>) -> Self {
        match result {
            Ok(frames) => Self::from_frames(frames),
            Err(e) => Self::error(e),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Cancellation handle shared between the host request and its queries.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    cancelled: Arc<AtomicBool>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(DatasourceError::query("context canceled"))
        } else {
            Ok(())
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
