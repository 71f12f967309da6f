//! Column-oriented result frames.
//!
//! A [`Frame`] is a named list of equally long, typed [`Column`]s. Two
//! builder shapes exist:
//!
//! - homogeneous frames declare their columns up front and append rows
//!   ([`Frame::append_row`]);
//! - heterogeneous frames discover columns while reading rows
//!   ([`FieldUnion`]), which back-fills new columns and pads missing cells.
//!
//! A frame is built with one of the two, never both.

use crate::resp::types::RespValue;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{error, warn};

/// Presentation units understood by the host.
pub mod unit {
    pub const DECBYTES: &str = "decbytes";
    pub const DECMBYTES: &str = "decmbytes";
    pub const MILLISECONDS: &str = "ms";
    pub const MICROSECONDS: &str = "µs";
    pub const PERCENT_UNIT: &str = "percentunit";
}

/// Visualization hint for node graphs.
pub const NODE_GRAPH: &str = "nodeGraph";

// ── Values ─────────────────────────────────────────────────────────

/// One cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Time(DateTime<Utc>),
    Bytes(Vec<u8>),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

/// UTC instant from epoch milliseconds. Out-of-range inputs clamp to the epoch.
pub fn time_from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// UTC instant from epoch seconds.
pub fn time_from_secs(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

// ── Columns ────────────────────────────────────────────────────────

/// Typed values of one column. The element type is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values")]
pub enum ColumnValues {
    #[serde(rename = "int64")]
    Int64(Vec<i64>),
    #[serde(rename = "float64")]
    Float64(Vec<f64>),
    #[serde(rename = "string")]
    String(Vec<String>),
    #[serde(rename = "bool")]
    Bool(Vec<bool>),
    #[serde(rename = "time")]
    Time(Vec<DateTime<Utc>>),
    #[serde(rename = "bytes")]
    Bytes(Vec<Vec<u8>>),
}

impl ColumnValues {
    /// Empty values of the same element type as `value`.
    fn empty_like(value: &Value) -> Self {
        match value {
            Value::Int(_) => Self::Int64(Vec::new()),
            Value::Float(_) => Self::Float64(Vec::new()),
            Value::Str(_) => Self::String(Vec::new()),
            Value::Bool(_) => Self::Bool(Vec::new()),
            Value::Time(_) => Self::Time(Vec::new()),
            Value::Bytes(_) => Self::Bytes(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int64(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::String(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Time(v) => v.len(),
            Self::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Time(_) => "time",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Append the zero value of the element type.
    pub fn push_zero(&mut self) {
        match self {
            Self::Int64(v) => v.push(0),
            Self::Float64(v) => v.push(0.0),
            Self::String(v) => v.push(String::new()),
            Self::Bool(v) => v.push(false),
            Self::Time(v) => v.push(DateTime::<Utc>::default()),
            Self::Bytes(v) => v.push(Vec::new()),
        }
    }

    /// Append a cell. Ints go into float columns as is and anything goes
    /// into string columns as text. Any other mismatch turns the whole column
    /// into a string column so no cell is lost.
    pub fn push(&mut self, value: Value) {
        match (self, value) {
            (Self::Int64(v), Value::Int(x)) => v.push(x),
            (Self::Float64(v), Value::Float(x)) => v.push(x),
            (Self::Float64(v), Value::Int(x)) => v.push(x as f64),
            (Self::String(v), Value::Str(x)) => v.push(x),
            (Self::String(v), other) => v.push(display_value(&other)),
            (Self::Bool(v), Value::Bool(x)) => v.push(x),
            (Self::Time(v), Value::Time(x)) => v.push(x),
            (Self::Bytes(v), Value::Bytes(x)) => v.push(x),
            (values, other) => {
                warn!(
                    column = values.type_name(),
                    cell = ?other,
                    "cell type differs from column, storing the column as text"
                );
                let mut text = values.to_strings();
                text.push(display_value(&other));
                *values = Self::String(text);
            }
        }
    }

    /// Every cell rendered as text.
    fn to_strings(&self) -> Vec<String> {
        match self {
            Self::Int64(v) => v.iter().map(|i| itoa::Buffer::new().format(*i).to_string()).collect(),
            Self::Float64(v) => v.iter().map(f64::to_string).collect(),
            Self::String(v) => v.clone(),
            Self::Bool(v) => v.iter().map(bool::to_string).collect(),
            Self::Time(v) => v.iter().map(|t| t.to_rfc3339()).collect(),
            Self::Bytes(v) => v.iter().map(|b| String::from_utf8_lossy(b).into_owned()).collect(),
        }
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Int(i) => itoa::Buffer::new().format(*i).to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Time(t) => t.to_rfc3339(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

impl From<Vec<i64>> for ColumnValues {
    fn from(v: Vec<i64>) -> Self {
        Self::Int64(v)
    }
}

impl From<Vec<f64>> for ColumnValues {
    fn from(v: Vec<f64>) -> Self {
        Self::Float64(v)
    }
}

impl From<Vec<String>> for ColumnValues {
    fn from(v: Vec<String>) -> Self {
        Self::String(v)
    }
}

impl From<Vec<&str>> for ColumnValues {
    fn from(v: Vec<&str>) -> Self {
        Self::String(v.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<bool>> for ColumnValues {
    fn from(v: Vec<bool>) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<DateTime<Utc>>> for ColumnValues {
    fn from(v: Vec<DateTime<Utc>>) -> Self {
        Self::Time(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: impl Into<ColumnValues>) -> Self {
        Self {
            name: name.into(),
            values: values.into(),
            labels: None,
            unit: None,
        }
    }

    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<i64>::new())
    }

    pub fn float64(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<f64>::new())
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<String>::new())
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<DateTime<Utc>>::new())
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: impl Into<Value>) {
        self.values.push(value.into());
    }
}

// ── Frames ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    pub preferred_visualisation_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            meta: None,
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn with_visualization(mut self, hint: &str) -> Self {
        self.meta = Some(FrameMeta {
            preferred_visualisation_type: hint.to_string(),
        });
        self
    }

    pub fn push_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Row count (length of the first column).
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Append one row to a frame whose columns were declared up front.
    /// Cells map to columns by position; missing trailing cells are zero.
    pub fn append_row(&mut self, row: Vec<Value>) {
        let mut cells = row.into_iter();
        for column in &mut self.columns {
            match cells.next() {
                Some(cell) => column.values.push(cell),
                None => column.values.push_zero(),
            }
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Frame `name` with a single cell in `column`: float64 when `text`
/// parses as a float, string otherwise.
pub fn scalar_frame(name: &str, text: &str, column: &str) -> Frame {
    let values = match text.parse::<f64>() {
        Ok(f) => ColumnValues::Float64(vec![f]),
        Err(_) => ColumnValues::String(vec![text.to_string()]),
    };
    Frame::new(name).with_column(Column::new(column, values))
}

/// Append one single-cell column per key of a key/value reply.
///
/// Accepts a flat `k, v, k, v` array or an array of `[k, v]` pairs. Keys
/// must be bulk strings. Text values that parse as integers become int64,
/// other text stays string; integers stay int64 and RESP3 doubles become
/// float64. Anything else is logged and skipped.
pub fn flatten_key_value_array(items: &[RespValue], frame: &mut Frame) {
    let as_pairs = !items.is_empty()
        && items
            .iter()
            .all(|item| matches!(item.as_array(), Some(pair) if pair.len() == 2));

    let pairs: Vec<(&RespValue, &RespValue)> = if as_pairs {
        items
            .iter()
            .filter_map(|item| match item.as_array() {
                Some([k, v]) => Some((k, v)),
                _ => None,
            })
            .collect()
    } else {
        items.chunks_exact(2).map(|c| (&c[0], &c[1])).collect()
    };

    for (key, value) in pairs {
        let key = match key {
            RespValue::BulkString(_) => key.text().unwrap_or_default(),
            other => {
                error!(kind = other.type_name(), "unsupported key type in key/value reply");
                continue;
            }
        };

        let values = match value {
            RespValue::BulkString(_) => {
                let text = value.text().unwrap_or_default();
                match text.parse::<i64>() {
                    Ok(i) => ColumnValues::Int64(vec![i]),
                    Err(_) => ColumnValues::String(vec![text]),
                }
            }
            RespValue::Integer(i) => ColumnValues::Int64(vec![*i]),
            RespValue::SimpleString(s) => match s.parse::<f64>() {
                Ok(f) => ColumnValues::Float64(vec![f]),
                Err(_) => ColumnValues::String(vec![s.clone()]),
            },
            other => {
                error!(key = %key, kind = other.type_name(), "unsupported value type in key/value reply");
                continue;
            }
        };
        frame.push_column(Column::new(key, values));
    }
}

/// Columns discovered row by row.
///
/// A column first seen at row `r` is back-filled with `r` zero values of
/// its type; a known column absent from a row gets its zero value. All
/// columns therefore have exactly as many values as rows were pushed.
#[derive(Debug, Default)]
pub struct FieldUnion {
    columns: Vec<Column>,
    rows: usize,
}

impl FieldUnion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with fixed leading columns.
    pub fn with_columns(columns: Vec<Column>) -> Self {
        Self { columns, rows: 0 }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn push_row<I, K>(&mut self, cells: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        self.rows += 1;
        for (name, value) in cells {
            let name = name.as_ref();
            let index = match self.columns.iter().position(|c| c.name == name) {
                Some(i) => i,
                None => {
                    let mut values = ColumnValues::empty_like(&value);
                    for _ in 1..self.rows {
                        values.push_zero();
                    }
                    self.columns.push(Column::new(name, values));
                    self.columns.len() - 1
                }
            };
            let column = &mut self.columns[index];
            // Repeated name within one row: first value wins
            if column.len() < self.rows {
                column.values.push(value);
            }
        }
        for column in &mut self.columns {
            while column.len() < self.rows {
                column.values.push_zero();
            }
        }
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn into_frame(self, name: impl Into<String>) -> Frame {
        Frame::new(name).with_columns(self.columns)
    }
}

// ── Tests ──────────────────────────────────────────────────────────
