//! Hash and set commands: `HGETALL`, `HGET`, `HMGET`, `SMEMBERS`, `HKEYS`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{scalar_frame, Column, ColumnValues, Frame};
use crate::query::QueryModel;

use super::{reply_text, split_args, string_list};

/// `HGETALL key`: a (Field, Value) frame named by key. Values stay text.
pub fn query_hgetall(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("HGETALL", &qm.key_name, &[])?;
    let items = string_list(&reply);

    let mut fields = Vec::with_capacity(items.len() / 2);
    let mut values = Vec::with_capacity(items.len() / 2);
    for pair in items.chunks_exact(2) {
        fields.push(pair[0].clone());
        values.push(pair[1].clone());
    }

    Ok(vec![Frame::new(&qm.key_name)
        .with_column(Column::new("Field", fields))
        .with_column(Column::new("Value", values))])
}

/// `HGET key field`
pub fn query_hget(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd("HGET", &qm.key_name, &[FlatArg::from(&qm.field)])?;
    Ok(vec![scalar_frame(&qm.key_name, &reply_text(&reply), "Value")])
}

/// `HMGET key field…`: one single-cell column per requested field.
pub fn query_hmget(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let fields = split_args(&qm.field, "Field is not valid")?;
    let reply = client.run_flat_cmd("HMGET", &qm.key_name, &[FlatArg::from(fields.clone())])?;

    let mut frame = Frame::new(&qm.command);
    for (field, value) in fields.iter().zip(string_list(&reply)) {
        let values = match value.parse::<f64>() {
            Ok(f) => ColumnValues::Float64(vec![f]),
            Err(_) => ColumnValues::String(vec![value]),
        };
        frame.push_column(Column::new(field.as_str(), values));
    }
    Ok(vec![frame])
}

/// `SMEMBERS key` / `HKEYS key`: a single `Value` column.
pub fn query_smembers(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_flat_cmd(&qm.command.to_ascii_uppercase(), &qm.key_name, &[])?;
    Ok(vec![
        Frame::new(&qm.key_name).with_column(Column::new("Value", string_list(&reply)))
    ])
}

// ── Tests ──────────────────────────────────────────────────────────
