//! RediSearch: `FT.INFO` and `FT.SEARCH`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{unit, Column, FieldUnion, Frame, Value};
use crate::query::QueryModel;
use crate::resp::record::Record;
use crate::resp::types::RespValue;

use tracing::error;

/// Display units of selected `FT.INFO` attributes.
fn info_unit(name: &str) -> Option<&'static str> {
    match name {
        "inverted_sz_mb"
        | "offset_vectors_sz_mb"
        | "doc_table_size_mb"
        | "sortable_values_size_mb"
        | "key_table_size_mb" => Some(unit::DECMBYTES),
        "percent_indexed" => Some(unit::PERCENT_UNIT),
        _ => None,
    }
}

/// `FT.INFO index`: one column per scalar attribute. Nested arrays
/// (fields, gc stats, cursor stats) are not decomposed.
pub fn query_ft_info(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("FT.INFO", &[qm.key_name.as_str()])?;
    let info = Record::from_reply(&reply);

    let mut frame = Frame::new(&qm.key_name);
    for (name, value) in info.iter() {
        match value {
            RespValue::Integer(i) => frame.push_column(Column::new(name, vec![*i])),
            RespValue::BulkString(_) => {
                let text = value.text().unwrap_or_default();
                match text.parse::<f64>() {
                    Ok(f) => {
                        let mut column = Column::new(name, vec![f]);
                        if let Some(unit) = info_unit(name) {
                            column = column.with_unit(unit);
                        }
                        frame.push_column(column);
                    }
                    Err(_) => frame.push_column(Column::new(name, vec![text])),
                }
            }
            RespValue::SimpleString(s) => frame.push_column(Column::new(name, vec![s.clone()])),
            RespValue::Array(_) => {}
            other => error!(field = name, kind = other.type_name(), "unsupported FT.INFO value"),
        }
    }
    Ok(vec![frame])
}

fn search_args(qm: &QueryModel) -> Vec<FlatArg> {
    let query = if qm.search_query.is_empty() { "*" } else { qm.search_query.as_str() };
    let mut args = vec![FlatArg::from(query)];

    if !qm.return_fields.is_empty() {
        args.push("RETURN".into());
        args.push(FlatArg::Int(qm.return_fields.len() as i64));
        args.push(FlatArg::from(qm.return_fields.clone()));
    }

    if qm.offset > 0 || qm.count > 0 {
        let count = if qm.count > 0 { qm.count } else { 10 };
        args.extend(["LIMIT".into(), FlatArg::Int(qm.offset), FlatArg::Int(count)]);
    }

    if !qm.sort_by.is_empty() {
        args.extend(["SORTBY".into(), FlatArg::from(&qm.sort_by)]);
        if !qm.sort_direction.is_empty() {
            args.push(FlatArg::from(&qm.sort_direction));
        }
    }
    args
}

/// `FT.SEARCH index query [RETURN n field…] [LIMIT offset count] [SORTBY field dir]`
pub fn query_ft_search(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("FT.SEARCH", &qm.key_name, &search_args(qm))?;

    let mut union = FieldUnion::with_columns(vec![Column::string("keyName")]);
    // First element is the total hit count
    let mut items = reply.as_array().unwrap_or_default().iter().skip(1).peekable();
    while let Some(doc) = items.next() {
        let mut cells = vec![("keyName".to_string(), Value::from(doc.text().unwrap_or_default()))];
        if let Some(RespValue::Array(fields)) = items.peek() {
            for pair in fields.chunks_exact(2) {
                cells.push((
                    pair[0].to_text().unwrap_or_default(),
                    Value::from(pair[1].to_text().unwrap_or_default()),
                ));
            }
            items.next();
        }
        union.push_row(cells);
    }
    Ok(vec![union.into_frame("Results")])
}

// ── Tests ──────────────────────────────────────────────────────────
