//! `CLUSTER INFO` and `CLUSTER NODES`.

use crate::client::Client;
use crate::error::Result;
use crate::frame::{unit, Column, Frame};
use crate::query::QueryModel;

use chrono::Utc;

use super::info::key_value_frame;
use super::{reply_text, text_lines};

pub fn query_cluster_info(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("CLUSTER", &["INFO"])?;
    Ok(vec![key_value_frame(&qm.command, &reply_text(&reply))])
}

/// One row per node line `id addr flags master ping pong epoch state [slot…]`.
pub fn query_cluster_nodes(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("CLUSTER", &["NODES"])?;
    let text = reply_text(&reply);

    let mut frame = Frame::new(&qm.command).with_columns([
        Column::string("Id"),
        Column::string("Address"),
        Column::string("Flags"),
        Column::string("Master"),
        Column::int64("Ping").with_unit(unit::MILLISECONDS),
        Column::int64("Pong").with_unit(unit::MILLISECONDS),
        Column::int64("Epoch"),
        Column::string("State"),
        Column::string("Slot"),
    ]);

    let now = Utc::now().timestamp_millis();
    let or_now = |field: &str| match field.parse::<i64>().unwrap_or(0) {
        0 => now,
        ms => ms,
    };

    for line in text_lines(&text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 {
            continue;
        }
        frame.append_row(vec![
            fields[0].into(),
            fields[1].into(),
            fields[2].into(),
            fields[3].into(),
            or_now(fields[4]).into(),
            or_now(fields[5]).into(),
            fields[6].parse::<i64>().unwrap_or(0).into(),
            fields[7].into(),
            fields.get(8).copied().unwrap_or_default().into(),
        ]);
    }
    Ok(vec![frame])
}

// ── Tests ──────────────────────────────────────────────────────────
