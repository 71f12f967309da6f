//! Server introspection: `INFO`, `CLIENT LIST` and `SLOWLOG GET`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{time_from_secs, unit, Column, ColumnValues, Frame, Value};
use crate::query::QueryModel;
use crate::resp::types::RespValue;

use std::collections::HashMap;
use tracing::debug;

use super::{reply_text, text_lines};

/// `key:value` lines of an INFO-style blob. Lines without a colon are skipped.
pub(crate) fn key_value_lines(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text_lines(text).filter_map(|line| line.split_once(':'))
}

/// One single-cell column per `key:value` line: float64 when the value
/// parses, string otherwise.
pub(crate) fn key_value_frame(name: &str, text: &str) -> Frame {
    let mut frame = Frame::new(name);
    for (key, value) in key_value_lines(text) {
        let values = match value.parse::<f64>() {
            Ok(f) => ColumnValues::Float64(vec![f]),
            Err(_) => ColumnValues::String(vec![value.to_string()]),
        };
        frame.push_column(Column::new(key, values));
    }
    frame
}

/// `a=1,b=2` into a lookup table.
fn stat_pairs(stats: &str) -> HashMap<&str, &str> {
    stats.split(',').filter_map(|kv| kv.split_once('=')).collect()
}

fn stat_f64(stats: &HashMap<&str, &str>, name: &str) -> f64 {
    stats.get(name).and_then(|v| v.parse().ok()).unwrap_or(0.0)
}

/// `INFO [section]`
pub fn query_info(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = if qm.section.is_empty() {
        client.run_cmd("INFO", &[])?
    } else {
        client.run_cmd("INFO", &[qm.section.as_str()])?
    };
    let text = reply_text(&reply);

    let frame = match qm.section.as_str() {
        "commandstats" if qm.streaming => commandstats_calls(&qm.command, &text),
        "commandstats" => commandstats(&qm.command, &text),
        "errorstats" => errorstats(&qm.command, &text, qm.streaming),
        _ => key_value_frame(&qm.command, &text),
    };
    Ok(vec![frame])
}

fn commandstats(name: &str, text: &str) -> Frame {
    let mut frame = Frame::new(name).with_columns([
        Column::string("Command"),
        Column::float64("Calls"),
        Column::float64("Usec").with_unit(unit::MICROSECONDS),
        Column::float64("Usec_per_call").with_unit(unit::MICROSECONDS),
        Column::float64("RejectedCalls"),
        Column::float64("FailedCalls"),
        Column::float64("CallsMaster"),
    ]);

    for (key, stats) in key_value_lines(text) {
        let command = key.strip_prefix("cmdstat_").unwrap_or(key);
        let stats = stat_pairs(stats);
        frame.append_row(vec![
            command.into(),
            stat_f64(&stats, "calls").into(),
            stat_f64(&stats, "usec").into(),
            stat_f64(&stats, "usec_per_call").into(),
            stat_f64(&stats, "rejected_calls").into(),
            stat_f64(&stats, "failed_calls").into(),
            stat_f64(&stats, "calls_master").into(),
        ]);
    }
    frame
}

/// Streaming shape: one int64 column of calls per command.
fn commandstats_calls(name: &str, text: &str) -> Frame {
    let mut frame = Frame::new(name);
    for (key, stats) in key_value_lines(text) {
        let command = key.strip_prefix("cmdstat_").unwrap_or(key);
        let calls = stat_pairs(stats)
            .get("calls")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        frame.push_column(Column::new(command, vec![calls]));
    }
    frame
}

fn errorstats(name: &str, text: &str, streaming: bool) -> Frame {
    let counts: Vec<(&str, i64)> = key_value_lines(text)
        .map(|(key, stats)| {
            let error = key.strip_prefix("errorstat_").unwrap_or(key);
            let count = stat_pairs(stats)
                .get("count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            (error, count)
        })
        .collect();

    if streaming {
        let mut frame = Frame::new(name);
        for (error, count) in counts {
            frame.push_column(Column::new(error, vec![count]));
        }
        return frame;
    }

    let mut frame = Frame::new(name).with_columns([Column::string("Error"), Column::int64("Count")]);
    for (error, count) in counts {
        frame.append_row(vec![error.into(), count.into()]);
    }
    frame
}

/// `CLIENT LIST`: one row per client. The first line defines the columns.
pub fn query_client_list(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("CLIENT", &["LIST"])?;
    let text = reply_text(&reply);

    let mut frame = Frame::new(&qm.command);
    for (index, line) in text_lines(&text).enumerate() {
        let tokens: Vec<(&str, &str)> = line
            .split_whitespace()
            .filter_map(|token| token.split_once('='))
            .collect();

        if index == 0 {
            for (name, value) in &tokens {
                frame.push_column(match value.parse::<i64>() {
                    Ok(_) => Column::int64(*name),
                    Err(_) => Column::string(*name),
                });
            }
        }

        frame.append_row(
            tokens
                .into_iter()
                .map(|(_, value)| match value.parse::<i64>() {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::from(value),
                })
                .collect(),
        );
    }
    Ok(vec![frame])
}

/// Render one slowlog argument; kinds other than integers and text are skipped.
fn slowlog_argument(arg: &RespValue) -> Option<String> {
    match arg {
        RespValue::Integer(_) | RespValue::BulkString(_) | RespValue::SimpleString(_) => arg.to_text(),
        other => {
            debug!(kind = other.type_name(), "skipping slowlog argument");
            None
        }
    }
}

/// `SLOWLOG GET [size]`
pub fn query_slowlog_get(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = if qm.size > 0 {
        client.run_flat_cmd("SLOWLOG", "GET", &[FlatArg::Int(qm.size)])?
    } else {
        client.run_cmd("SLOWLOG", &["GET"])?
    };

    let mut frame = Frame::new(&qm.command).with_columns([
        Column::int64("Id"),
        Column::time("Timestamp"),
        Column::int64("Duration").with_unit(unit::MICROSECONDS),
        Column::string("Command"),
    ]);

    for entry in reply.as_array().unwrap_or_default() {
        let Some(entry) = entry.as_array().filter(|e| e.len() >= 4) else {
            continue;
        };

        // Some server builds insert an extra element before the arguments
        let args_index = match entry.get(4) {
            Some(RespValue::Array(_)) => 4,
            _ => 3,
        };
        let command = entry[args_index]
            .as_array()
            .unwrap_or_default()
            .iter()
            .filter_map(slowlog_argument)
            .collect::<Vec<_>>()
            .join(" ");

        frame.append_row(vec![
            entry[0].to_int().unwrap_or(0).into(),
            time_from_secs(entry[1].to_int().unwrap_or(0)).into(),
            entry[2].to_int().unwrap_or(0).into(),
            command.into(),
        ]);
    }
    Ok(vec![frame])
}

// ── Tests ──────────────────────────────────────────────────────────
