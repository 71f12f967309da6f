//! Free-form commands typed by the user, as used by the CLI panel and by
//! template variables.

use crate::client::{Client, FlatArg};
use crate::error::{DatasourceError, Result};
use crate::frame::{scalar_frame, Column, Frame};
use crate::query::QueryModel;
use crate::resp::types::RespValue;

use super::{reply_text, split_args};

/// Cell for an array reply without elements.
pub const EMPTY_ARRAY: &str = "(empty array)";

/// Run `query` split shell-style: the first word is the command, the
/// second is passed as the key.
fn execute(query: &str, client: &dyn Client) -> Result<RespValue> {
    let words = split_args(query, "Query is not valid")?;
    let Some((command, params)) = words.split_first() else {
        return Err(DatasourceError::query("Command is empty"));
    };

    match params.split_first() {
        None => client.run_cmd(command, &[]),
        Some((key, rest)) => {
            let args: Vec<FlatArg> = rest.iter().map(FlatArg::from).collect();
            client.run_flat_cmd(command, key, &args)
        }
    }
}

/// Array elements as text, nested arrays flattened in place.
fn flatten(items: &[RespValue], out: &mut Vec<String>) -> Result<()> {
    for item in items {
        match item {
            RespValue::BulkString(_) | RespValue::SimpleString(_) | RespValue::Integer(_) => {
                out.push(reply_text(item));
            }
            RespValue::Array(nested) if nested.is_empty() => out.push(EMPTY_ARRAY.to_string()),
            RespValue::Array(nested) => flatten(nested, out)?,
            _ => return Err(DatasourceError::query("Unsupported array return type")),
        }
    }
    Ok(())
}

/// Run a free-form command and return its reply as a `Value` column, or as
/// redis-cli formatted text when `cli` is set.
pub fn query_custom_command(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    if qm.query.trim().is_empty() {
        return Err(DatasourceError::query("Command is empty"));
    }

    let reply = execute(&qm.query, client)?;
    let name = qm.key_name.as_str();

    if qm.cli {
        return Ok(vec![Frame::new(name).with_column(Column::new("Value", vec![cli_text(&reply)]))]);
    }

    let frame = match &reply {
        RespValue::Integer(i) => Frame::new(name).with_column(Column::new("Value", vec![*i])),
        RespValue::BulkString(_) => {
            let text = reply_text(&reply).replace("\r\n", "\n");
            if text.contains('\n') {
                let lines: Vec<&str> = text.split('\n').collect();
                Frame::new(name).with_column(Column::new("Value", lines))
            } else {
                scalar_frame(name, &text, "Value")
            }
        }
        RespValue::SimpleString(text) => scalar_frame(name, text, "Value"),
        RespValue::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            if items.is_empty() {
                values.push(EMPTY_ARRAY.to_string());
            } else {
                flatten(items, &mut values)?;
            }
            Frame::new(name).with_column(Column::new("Value", values))
        }
        RespValue::Null => return Err(DatasourceError::query("Wrong command")),
        RespValue::Error(_) => return Err(DatasourceError::query("Unsupported return type")),
    };
    Ok(vec![frame])
}

// ── CLI formatting ─────────────────────────────────────────────────

/// Render a reply the way `redis-cli` prints it.
///
/// Array members are numbered `N) ` with the numbers right-aligned to the
/// widest index of their array; nested members are indented to line up
/// under their parent's first member.
pub fn cli_text(reply: &RespValue) -> String {
    let mut out = String::new();
    write_cli(reply, 0, &mut out);
    out
}

fn write_cli(reply: &RespValue, indent: usize, out: &mut String) {
    match reply {
        RespValue::Integer(i) => {
            out.push_str("(integer) ");
            out.push_str(itoa::Buffer::new().format(*i));
            out.push('\n');
        }
        RespValue::BulkString(_) | RespValue::SimpleString(_) => {
            out.push('"');
            out.push_str(&reply_text(reply));
            out.push_str("\"\n");
        }
        RespValue::Null => out.push_str("(nil)\n"),
        RespValue::Error(msg) => {
            out.push_str("(error) ");
            out.push_str(msg);
            out.push('\n');
        }
        RespValue::Array(items) if items.is_empty() => out.push_str("(empty list or set)\n"),
        RespValue::Array(items) => {
            let width = items.len().to_string().len();
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.extend(std::iter::repeat(' ').take(indent));
                }
                out.push_str(&format!("{:>width$}) ", index + 1));
                write_cli(item, indent + width + 2, out);
            }
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
