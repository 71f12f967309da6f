//! RedisGraph: `GRAPH.QUERY`, `GRAPH.SLOWLOG`, `GRAPH.CONFIG`,
//! `GRAPH.EXPLAIN` and `GRAPH.PROFILE`.
//!
//! `GRAPH.QUERY` replies (verbose mode) are `[header, rows, statistics]`.
//! Node cells are three `[name, value]` pairs (id, labels, properties) and
//! relation cells five (id, type, src_node, dest_node, properties).

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{scalar_frame, time_from_secs, unit, Column, Frame, Value, NODE_GRAPH};
use crate::query::QueryModel;
use crate::resp::types::RespValue;

use std::collections::HashSet;

use super::reply_text;

#[derive(Debug, Clone, PartialEq)]
struct Node {
    id: String,
    title: String,
    main_stat: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Edge {
    id: String,
    source: String,
    target: String,
    main_stat: String,
}

/// Value of a `[name, value]` pair.
fn pair_value(pair: &RespValue) -> Option<&RespValue> {
    pair.as_array().and_then(|p| p.get(1))
}

fn pair_id(pair: &RespValue) -> String {
    pair_value(pair)
        .and_then(RespValue::to_int)
        .map(|id| itoa::Buffer::new().format(id).to_string())
        .unwrap_or_default()
}

/// Properties as `(name, text)`; values other than strings and integers
/// read as empty.
fn properties(pair: &RespValue) -> Vec<(String, String)> {
    pair_value(pair)
        .and_then(RespValue::as_array)
        .unwrap_or(&[])
        .iter()
        .filter_map(RespValue::as_array)
        .filter_map(|prop| match prop {
            [name, value] => Some((reply_text(name), reply_text(value))),
            _ => None,
        })
        .collect()
}

fn render_properties(props: &[(String, String)]) -> String {
    props
        .iter()
        .map(|(name, value)| format!("\"{name}\"=\"{value}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What one cell of a result row holds.
enum Cell {
    Node(Node, String),
    Edge(Edge, String),
    Scalar(Value),
}

fn parse_cell(cell: &RespValue) -> Cell {
    match cell {
        RespValue::Array(parts) if parts.len() == 3 => {
            let title = pair_value(&parts[1])
                .and_then(RespValue::as_array)
                .and_then(|labels| labels.first())
                .map(reply_text)
                .unwrap_or_default();
            let props = properties(&parts[2]);
            let node = Node {
                id: pair_id(&parts[0]),
                title,
                main_stat: props.first().map(|(_, v)| v.clone()).unwrap_or_default(),
            };
            Cell::Node(node, render_properties(&props))
        }
        RespValue::Array(parts) if parts.len() == 5 => {
            let edge = Edge {
                id: pair_id(&parts[0]),
                source: pair_id(&parts[2]),
                target: pair_id(&parts[3]),
                main_stat: pair_value(&parts[1]).map(reply_text).unwrap_or_default(),
            };
            Cell::Edge(edge, render_properties(&properties(&parts[4])))
        }
        RespValue::Integer(i) => Cell::Scalar(Value::Int(*i)),
        other => Cell::Scalar(Value::Str(reply_text(other))),
    }
}

/// Header names; compact headers are `[type, name]` pairs.
fn header_names(header: &RespValue) -> Vec<String> {
    header
        .as_array()
        .unwrap_or(&[])
        .iter()
        .map(|h| match h {
            RespValue::Array(_) => pair_value(h).map(reply_text).unwrap_or_default(),
            other => reply_text(other),
        })
        .collect()
}

/// `GRAPH.QUERY key cypher`: `nodes` and `edges` frames for the node graph
/// panel, a `data` frame with the raw result set and a `metadata` frame with
/// the query statistics. Empty frames are left out.
pub fn query_graph_query(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("GRAPH.QUERY", &qm.key_name, &[FlatArg::from(&qm.cypher)])?;
    let parts = reply.as_array().unwrap_or(&[]);

    // Write-only queries answer with the statistics alone
    let (header, rows, statistics) = match parts {
        [header, rows, statistics, ..] => (Some(header), rows.as_array().unwrap_or(&[]), Some(statistics)),
        [statistics] => (None, &[][..], Some(statistics)),
        _ => (None, &[][..], None),
    };
    let headers = header.map(header_names).unwrap_or_default();

    let mut nodes = Frame::new("nodes")
        .with_columns([
            Column::string("id"),
            Column::string("title"),
            Column::string("subTitle"),
            Column::string("mainStat"),
            Column::int64("arc__"),
        ])
        .with_visualization(NODE_GRAPH);
    let mut edges = Frame::new("edges")
        .with_columns([
            Column::string("id"),
            Column::string("source"),
            Column::string("target"),
            Column::string("mainStat"),
        ])
        .with_visualization(NODE_GRAPH);
    let mut data = Frame::new("data");

    let mut seen = HashSet::new();
    for row in rows {
        let mut cells = Vec::new();
        for cell in row.as_array().unwrap_or(&[]) {
            match parse_cell(cell) {
                Cell::Node(node, props) => {
                    if seen.insert(node.id.clone()) {
                        nodes.append_row(vec![
                            node.id.into(),
                            node.title.into(),
                            Value::from(""),
                            node.main_stat.into(),
                            Value::Int(1),
                        ]);
                    }
                    cells.push(Value::Str(props));
                }
                Cell::Edge(edge, props) => {
                    edges.append_row(vec![
                        edge.id.into(),
                        edge.source.into(),
                        edge.target.into(),
                        edge.main_stat.into(),
                    ]);
                    cells.push(Value::Str(props));
                }
                Cell::Scalar(value) => cells.push(value),
            }
        }
        if cells.is_empty() {
            continue;
        }

        // Column types follow the first row
        if data.columns.is_empty() {
            for (index, name) in headers.iter().enumerate() {
                let column = match cells.get(index) {
                    Some(Value::Int(_)) => Column::int64(name.as_str()),
                    _ => Column::string(name.as_str()),
                };
                data.push_column(column);
            }
        }
        data.append_row(cells);
    }

    let mut metadata = Frame::new("metadata").with_columns([Column::string("data"), Column::string("value")]);
    if let Some(statistics) = statistics {
        for line in statistics.as_array().unwrap_or(&[]).iter().filter_map(RespValue::text) {
            let fields: Vec<&str> = line.split(':').collect();
            if let [name, value] = fields.as_slice() {
                metadata.append_row(vec![(*name).into(), value.trim().into()]);
            }
        }
    }

    Ok([nodes, edges, data, metadata]
        .into_iter()
        .filter(|frame| frame.rows() > 0)
        .collect())
}

/// `GRAPH.SLOWLOG key`: entries are `[timestamp, command, query, duration]`.
pub fn query_graph_slowlog(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("GRAPH.SLOWLOG", &qm.key_name, &[])?;

    let mut frame = Frame::new(&qm.command).with_columns([
        Column::time("timestamp"),
        Column::string("command"),
        Column::string("query"),
        Column::float64("duration").with_unit(unit::MICROSECONDS),
    ]);
    for entry in reply.as_array().unwrap_or(&[]) {
        let fields = super::string_list(entry);
        let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or_default();
        frame.append_row(vec![
            time_from_secs(field(0).parse().unwrap_or(0)).into(),
            field(1).into(),
            field(2).into(),
            Value::Float(field(3).parse().unwrap_or(0.0)),
        ]);
    }
    Ok(vec![frame])
}

fn flatten_text(reply: &RespValue, out: &mut Vec<String>) {
    match reply {
        RespValue::Array(items) => items.iter().for_each(|item| flatten_text(item, out)),
        other => out.push(reply_text(other)),
    }
}

fn scalar_or_list(name: &str, reply: &RespValue) -> Frame {
    match reply {
        RespValue::Array(_) => {
            let mut values = Vec::new();
            flatten_text(reply, &mut values);
            Frame::new(name).with_column(Column::new("Value", values))
        }
        other => scalar_frame(name, &reply_text(other), "Value"),
    }
}

/// `GRAPH.CONFIG GET name`
pub fn query_graph_config(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("GRAPH.CONFIG", &["GET", &qm.key_name])?;
    Ok(vec![scalar_or_list(&qm.key_name, &reply)])
}

/// `GRAPH.EXPLAIN key cypher` and `GRAPH.PROFILE key cypher`: the plan as
/// one line per row.
pub fn query_graph_plan(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd(
        &qm.command.to_ascii_uppercase(),
        &qm.key_name,
        &[FlatArg::from(&qm.cypher)],
    )?;
    Ok(vec![scalar_or_list(&qm.key_name, &reply)])
}

// ── Tests ──────────────────────────────────────────────────────────
