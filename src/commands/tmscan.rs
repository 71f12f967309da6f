//! TMSCAN: one `SCAN` step profiled with `MEMORY USAGE` and `TYPE`.
//!
//! Each call advances the cursor once. Memory usage is fetched for every
//! scanned key in one pipeline; when `size` is set only the largest `size`
//! keys are kept, and their types are fetched in a second pipeline.

use crate::client::{Client, FlatArg, FlatCommand};
use crate::error::{DatasourceError, Result};
use crate::frame::{unit, Column, Frame};
use crate::query::QueryModel;
use crate::resp::types::RespValue;

use super::{reply_text, string_list};

#[derive(Debug, Clone, PartialEq)]
struct KeyProfile {
    name: String,
    memory: i64,
    kind: String,
}

/// `SCAN cursor [MATCH pattern] [COUNT n]` → (next cursor, keys).
fn scan(qm: &QueryModel, client: &dyn Client) -> Result<(String, Vec<String>)> {
    let cursor = if qm.cursor.is_empty() { "0" } else { qm.cursor.as_str() };

    let mut args: Vec<FlatArg> = Vec::new();
    if !qm.match_pattern.is_empty() {
        args.push("MATCH".into());
        args.push(FlatArg::from(&qm.match_pattern));
    }
    if qm.count > 0 {
        args.push("COUNT".into());
        args.push(qm.count.into());
    }

    let reply = client.run_flat_cmd("SCAN", cursor, &args)?;
    match reply.as_array() {
        Some([next, keys]) => Ok((reply_text(next), string_list(keys))),
        _ => Err(DatasourceError::Protocol(format!(
            "unexpected SCAN reply: {}",
            reply.type_name()
        ))),
    }
}

pub fn query_tmscan(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let (cursor, keys) = scan(qm, client)?;

    let mut profiles: Vec<KeyProfile> = keys
        .into_iter()
        .map(|name| KeyProfile {
            name,
            memory: 0,
            kind: String::new(),
        })
        .collect();

    if !profiles.is_empty() {
        let batch: Vec<FlatCommand> = profiles
            .iter()
            .map(|p| {
                let mut args = vec![FlatArg::from(&p.name)];
                if qm.samples > 0 {
                    args.push("SAMPLES".into());
                    args.push(qm.samples.into());
                }
                FlatCommand::new("MEMORY", "USAGE", args)
            })
            .collect();
        let replies = client.run_batch_flat_cmd(&batch)?;
        for (profile, reply) in profiles.iter_mut().zip(&replies) {
            profile.memory = reply.to_int().unwrap_or(0);
        }
    }

    if qm.size > 0 && (qm.size as usize) < profiles.len() {
        // Stable: equal sizes keep scan order
        profiles.sort_by(|a, b| b.memory.cmp(&a.memory));
        profiles.truncate(qm.size as usize);
    }

    if !profiles.is_empty() {
        let batch: Vec<FlatCommand> = profiles
            .iter()
            .map(|p| FlatCommand::new("TYPE", p.name.as_str(), Vec::new()))
            .collect();
        let replies = client.run_batch_flat_cmd(&batch)?;
        for (profile, reply) in profiles.iter_mut().zip(&replies) {
            profile.kind = reply_text(reply);
        }
    }

    let mut names = Vec::with_capacity(profiles.len());
    let mut kinds = Vec::with_capacity(profiles.len());
    let mut memory = Vec::with_capacity(profiles.len());
    for profile in profiles {
        names.push(profile.name);
        kinds.push(profile.kind);
        memory.push(profile.memory);
    }

    Ok(vec![
        Frame::new("tmscan").with_columns([
            Column::new("key", names),
            Column::new("type", kinds),
            Column::new("memory", memory).with_unit(unit::DECBYTES),
        ]),
        Frame::new("Cursor").with_column(Column::new("cursor", vec![cursor])),
    ])
}

// ── Tests ──────────────────────────────────────────────────────────
