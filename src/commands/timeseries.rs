//! RedisTimeSeries: `TS.RANGE`, `TS.MRANGE`, `TS.GET`, `TS.INFO` and
//! `TS.QUERYINDEX`.

use crate::client::{Client, FlatArg};
use crate::error::{DatasourceError, Result};
use crate::frame::{flatten_key_value_array, time_from_millis, unit, Column, ColumnValues, Frame};
use crate::query::QueryModel;
use crate::resp::record::Record;
use crate::resp::types::RespValue;

use std::collections::BTreeMap;
use tracing::{error, warn};

use super::{split_args, string_list};

const FILTER_NOT_VALID: &str = "Filter is not valid";
/// Upper bound on synthetic samples inserted into one gap.
const MAX_FILL_PER_GAP: i64 = 10_000;

/// `[timestamp, value]` pairs of a range reply. Timestamps may be integers
/// or text; unparsable cells read as zero.
fn samples(reply: &RespValue) -> Vec<(i64, f64)> {
    reply
        .as_array()
        .unwrap_or_default()
        .iter()
        .filter_map(|sample| match sample.as_array() {
            Some([ts, value, ..]) => Some((
                ts.to_int().unwrap_or(0),
                value.to_f64().unwrap_or(0.0),
            )),
            _ => None,
        })
        .collect()
}

/// Insert zero samples at `prev + k·bucket` for every such instant strictly
/// before the next sample, wherever two consecutive samples are more than
/// one bucket apart. At most [`MAX_FILL_PER_GAP`] samples go into one gap.
pub fn fill_gaps(samples: &[(i64, f64)], fill: bool, bucket: i64) -> Vec<(i64, f64)> {
    if !fill || bucket <= 0 {
        return samples.to_vec();
    }

    let mut out = Vec::with_capacity(samples.len());
    let mut prev: Option<i64> = None;
    for &(ts, value) in samples {
        if let Some(prev) = prev {
            if let Some(delta) = ts.checked_sub(prev).filter(|d| *d > bucket) {
                // Instants prev + k·bucket strictly before ts
                let missing = (delta - 1) / bucket;
                if missing > MAX_FILL_PER_GAP {
                    warn!(prev, next = ts, bucket, missing, "gap too wide, filling only its start");
                }
                let mut gap = prev;
                for _ in 0..missing.min(MAX_FILL_PER_GAP) {
                    gap += bucket;
                    out.push((gap, 0.0));
                }
            }
        }
        out.push((ts, value));
        prev = Some(ts);
    }
    out
}

fn series_columns(samples: &[(i64, f64)], mut value_column: Column) -> [Column; 2] {
    value_column.values = ColumnValues::Float64(samples.iter().map(|(_, v)| *v).collect());
    [
        Column::new(
            "time",
            samples
                .iter()
                .map(|(ts, _)| time_from_millis(*ts))
                .collect::<Vec<_>>(),
        ),
        value_column,
    ]
}

fn aggregation_args(qm: &QueryModel) -> Vec<FlatArg> {
    if qm.aggregation.is_empty() {
        Vec::new()
    } else {
        vec![
            "AGGREGATION".into(),
            FlatArg::from(&qm.aggregation),
            FlatArg::Int(qm.bucket),
        ]
    }
}

/// `TS.RANGE key from to [AGGREGATION type bucket]`
pub fn query_ts_range(from: i64, to: i64, qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let mut args = vec![FlatArg::Int(from), FlatArg::Int(to)];
    args.extend(aggregation_args(qm));
    let reply = client.run_flat_cmd("TS.RANGE", &qm.key_name, &args)?;

    let name = if qm.legend.is_empty() { &qm.key_name } else { &qm.legend };
    let rows = fill_gaps(&samples(&reply), qm.fill, qm.bucket);
    Ok(vec![
        Frame::new(name).with_columns(series_columns(&rows, Column::float64(&qm.value)))
    ])
}

/// `TS.MRANGE from to [AGGREGATION type bucket] WITHLABELS FILTER filter…`
pub fn query_ts_mrange(from: i64, to: i64, qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let filter = split_args(&qm.filter, FILTER_NOT_VALID)?;

    let mut args = vec![FlatArg::Int(to)];
    args.extend(aggregation_args(qm));
    args.extend(["WITHLABELS".into(), "FILTER".into(), FlatArg::from(filter)]);
    let reply = client.run_flat_cmd("TS.MRANGE", &from.to_string(), &args)?;

    let series = match reply {
        RespValue::Array(series) => series,
        other => {
            return Err(DatasourceError::redis(other.to_text().unwrap_or_default()));
        }
    };

    let mut frames = Vec::with_capacity(series.len());
    for entry in &series {
        let Some([name, labels, data, ..]) = entry.as_array() else {
            error!(kind = entry.type_name(), "unexpected TS.MRANGE series shape");
            continue;
        };

        let labels: BTreeMap<String, String> = Record::from_reply(labels)
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_text().unwrap_or_default()))
            .collect();

        let legend = if qm.legend.is_empty() {
            name.text().unwrap_or_default()
        } else {
            labels.get(&qm.legend).cloned().unwrap_or_default()
        };
        let value_name = if qm.value.is_empty() {
            String::new()
        } else {
            labels.get(&qm.value).cloned().unwrap_or_default()
        };

        let mut value_column = Column::float64(value_name);
        if qm.legend.is_empty() {
            value_column = value_column.with_labels(labels);
        }

        let rows = fill_gaps(&samples(data), qm.fill, qm.bucket);
        frames.push(Frame::new(legend).with_columns(series_columns(&rows, value_column)));
    }
    Ok(frames)
}

/// `TS.GET key`: the latest sample.
pub fn query_ts_get(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("TS.GET", &[qm.key_name.as_str()])?;
    let Some([ts, value, ..]) = reply.as_array() else {
        return Ok(Vec::new());
    };

    let sample = [(ts.to_int().unwrap_or(0), value.to_f64().unwrap_or(0.0))];
    Ok(vec![Frame::new(&qm.key_name)
        .with_columns(series_columns(&sample, Column::float64("value")))])
}

/// `TS.INFO key`: one column per attribute.
pub fn query_ts_info(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("TS.INFO", &[qm.key_name.as_str()])?;
    let info = Record::from_reply(&reply);

    let mut frame = Frame::new(&qm.key_name);
    for (name, value) in info.iter() {
        match value {
            RespValue::Integer(i) => {
                let column = match name {
                    "firstTimestamp" | "lastTimestamp" => {
                        Column::new(name, vec![time_from_millis(*i)])
                    }
                    "memoryUsage" => Column::new(name, vec![*i]).with_unit(unit::DECBYTES),
                    "retentionTime" => Column::new(name, vec![*i]).with_unit(unit::MILLISECONDS),
                    _ => Column::new(name, vec![*i]),
                };
                frame.push_column(column);
            }
            RespValue::BulkString(_) | RespValue::SimpleString(_) => {
                frame.push_column(Column::new(name, vec![value.text().unwrap_or_default()]));
            }
            RespValue::Array(items) => flatten_key_value_array(items, &mut frame),
            RespValue::Null => {}
            other => error!(field = name, kind = other.type_name(), "unsupported TS.INFO value"),
        }
    }
    Ok(vec![frame])
}

/// `TS.QUERYINDEX filter…`: the matching keys.
pub fn query_ts_queryindex(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let filter = split_args(&qm.filter, FILTER_NOT_VALID)?;
    let args: Vec<&str> = filter.iter().map(String::as_str).collect();
    let reply = client.run_cmd("TS.QUERYINDEX", &args)?;
    Ok(vec![
        Frame::new(&qm.key_name).with_column(Column::new("Value", string_list(&reply)))
    ])
}

// ── Tests ──────────────────────────────────────────────────────────
