//! Streams: `XINFO STREAM`, `XRANGE` and `XREVRANGE`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{Column, ColumnValues, Frame};
use crate::query::QueryModel;
use crate::resp::record::Record;
use crate::resp::types::RespValue;

/// Entry fields as `"k"="v"` lines.
fn entry_fields(fields: &RespValue) -> String {
    let mut out = String::new();
    for pair in fields.as_array().unwrap_or_default().chunks_exact(2) {
        out.push_str(&format!(
            "\"{}\"=\"{}\"\n",
            pair[0].to_text().unwrap_or_default(),
            pair[1].to_text().unwrap_or_default()
        ));
    }
    out
}

/// `XINFO STREAM key`: a (Field, Value) frame named by key.
pub fn query_xinfo_stream(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("XINFO", "STREAM", &[FlatArg::from(&qm.key_name)])?;
    let info = Record::from_reply(&reply);

    let mut rows: Vec<(&str, String)> = vec![
        ("length", info.int("length").to_string()),
        ("radix-tree-keys", info.int("radix-tree-keys").to_string()),
        ("radix-tree-nodes", info.int("radix-tree-nodes").to_string()),
        ("groups", info.int("groups").to_string()),
        ("last-generated-id", info.text("last-generated-id")),
    ];

    for (entry, id_name, fields_name) in [
        ("first-entry", "first-entry-id", "first-entry-fields"),
        ("last-entry", "last-entry-id", "last-entry-fields"),
    ] {
        if let Some([id, fields, ..]) = info.get(entry).and_then(RespValue::as_array) {
            rows.push((id_name, id.to_text().unwrap_or_default()));
            rows.push((fields_name, entry_fields(fields)));
        }
    }

    let (fields, values): (Vec<String>, Vec<String>) =
        rows.into_iter().map(|(f, v)| (f.to_string(), v)).unzip();
    Ok(vec![Frame::new(&qm.key_name)
        .with_column(Column::new("Field", fields))
        .with_column(Column::new("Value", values))])
}

/// `XRANGE key start end [COUNT n]`
pub fn query_xrange(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    range(qm, client, false)
}

/// `XREVRANGE key end start [COUNT n]`
pub fn query_xrevrange(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    range(qm, client, true)
}

fn range(qm: &QueryModel, client: &dyn Client, reverse: bool) -> Result<Vec<Frame>> {
    let start = if qm.start.is_empty() { "-" } else { qm.start.as_str() };
    let end = if qm.end.is_empty() { "+" } else { qm.end.as_str() };

    let (cmd, mut args) = if reverse {
        ("XREVRANGE", vec![FlatArg::from(end), FlatArg::from(start)])
    } else {
        ("XRANGE", vec![FlatArg::from(start), FlatArg::from(end)])
    };
    if qm.count > 0 {
        args.extend([FlatArg::from("COUNT"), FlatArg::Int(qm.count)]);
    }

    let reply = client.run_flat_cmd(cmd, &qm.key_name, &args)?;
    Ok(vec![entries_frame(&qm.command, &reply)])
}

/// `$streamId` plus the union of entry fields. A field is int64 when every
/// value seen for it parses as an integer, string otherwise.
fn entries_frame(name: &str, reply: &RespValue) -> Frame {
    let mut ids = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<(usize, String)>> = Vec::new();

    for entry in reply.as_array().unwrap_or_default() {
        let Some([id, fields, ..]) = entry.as_array() else {
            continue;
        };
        ids.push(id.to_text().unwrap_or_default());

        let mut row = Vec::new();
        for pair in fields.as_array().unwrap_or_default().chunks_exact(2) {
            let key = pair[0].to_text().unwrap_or_default();
            let index = match names.iter().position(|n| *n == key) {
                Some(i) => i,
                None => {
                    names.push(key);
                    names.len() - 1
                }
            };
            row.push((index, pair[1].to_text().unwrap_or_default()));
        }
        rows.push(row);
    }

    let mut frame = Frame::new(name).with_column(Column::new("$streamId", ids));
    for (index, field) in names.into_iter().enumerate() {
        let cells: Vec<Option<&str>> = rows
            .iter()
            .map(|row| {
                row.iter()
                    .find(|(i, _)| *i == index)
                    .map(|(_, v)| v.as_str())
            })
            .collect();

        let all_int = cells.iter().flatten().all(|v| v.parse::<i64>().is_ok());
        let values = if all_int {
            ColumnValues::Int64(
                cells
                    .iter()
                    .map(|c| c.and_then(|v| v.parse().ok()).unwrap_or(0))
                    .collect(),
            )
        } else {
            ColumnValues::String(cells.iter().map(|c| c.unwrap_or_default().to_string()).collect())
        };
        frame.push_column(Column::new(field, values));
    }
    frame
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{bulk_array, ScriptedClient};

    fn model(command: &str) -> QueryModel {
        QueryModel {
            command: command.into(),
            key_name: "events".into(),
            ..QueryModel::default()
        }
    }

    #[test]
    fn xinfo_stream_fields() {
        let client = ScriptedClient::new().reply(RespValue::Array(vec![
            "length".into(),
            RespValue::Integer(2),
            "radix-tree-keys".into(),
            RespValue::Integer(1),
            "radix-tree-nodes".into(),
            RespValue::Integer(2),
            "groups".into(),
            RespValue::Integer(0),
            "last-generated-id".into(),
            "1581305811325-0".into(),
            "first-entry".into(),
            RespValue::Array(vec!["1581305811324-0".into(), bulk_array(&["temp", "27", "unit", "C"])]),
            "last-entry".into(),
            RespValue::Array(vec!["1581305811325-0".into(), bulk_array(&["temp", "28"])]),
        ]));
        let frames = query_xinfo_stream(&model("xinfoStream"), &client).unwrap();
        let frame = &frames[0];

        assert_eq!(client.first_call(), vec!["XINFO", "STREAM", "events"]);
        assert_eq!(frame.name, "events");
        assert_eq!(frame.rows(), 9);
        assert_eq!(
            frame.columns[0].values,
            ColumnValues::from(vec![
                "length",
                "radix-tree-keys",
                "radix-tree-nodes",
                "groups",
                "last-generated-id",
                "first-entry-id",
                "first-entry-fields",
                "last-entry-id",
                "last-entry-fields",
            ])
        );
        let ColumnValues::String(values) = &frame.columns[1].values else {
            panic!("values are strings");
        };
        assert_eq!(values[0], "2");
        assert_eq!(values[6], "\"temp\"=\"27\"\n\"unit\"=\"C\"\n");
    }

    #[test]
    fn xinfo_empty_stream_has_no_entries() {
        let client = ScriptedClient::new().reply(RespValue::Array(vec![
            "length".into(),
            RespValue::Integer(0),
            "first-entry".into(),
            RespValue::Null,
            "last-entry".into(),
            RespValue::Null,
        ]));
        let frames = query_xinfo_stream(&model("xinfoStream"), &client).unwrap();
        assert_eq!(frames[0].rows(), 5);
    }

    fn entry(id: &str, fields: &[&str]) -> RespValue {
        RespValue::Array(vec![id.into(), bulk_array(fields)])
    }

    #[test]
    fn xrange_union_of_fields() {
        let client = ScriptedClient::new().reply(RespValue::Array(vec![
            entry("1-0", &["temp", "27", "unit", "C"]),
            entry("2-0", &["temp", "28", "note", "hot"]),
            entry("3-0", &["unit", "F"]),
        ]));
        let frames = query_xrange(&model("xrange"), &client).unwrap();
        let frame = &frames[0];

        assert_eq!(client.first_call(), vec!["XRANGE", "events", "-", "+"]);
        assert_eq!(frame.name, "xrange");
        assert_eq!(frame.columns[0].name, "$streamId");
        assert_eq!(frame.columns[0].values, ColumnValues::from(vec!["1-0", "2-0", "3-0"]));
        assert_eq!(frame.column("temp").unwrap().values, ColumnValues::Int64(vec![27, 28, 0]));
        assert_eq!(frame.column("unit").unwrap().values, ColumnValues::from(vec!["C", "", "F"]));
        assert_eq!(frame.column("note").unwrap().values, ColumnValues::from(vec!["", "hot", ""]));
    }

    #[test]
    fn xrevrange_swaps_bounds() {
        let client = ScriptedClient::new().reply(RespValue::Array(vec![]));
        let qm = QueryModel {
            start: "1-0".into(),
            end: "9-0".into(),
            count: 5,
            ..model("xrevrange")
        };
        let frames = query_xrevrange(&qm, &client).unwrap();
        assert_eq!(frames[0].rows(), 0);
        assert_eq!(
            client.first_call(),
            vec!["XREVRANGE", "events", "9-0", "1-0", "COUNT", "5"]
        );
    }
}
