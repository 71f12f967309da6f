//! RedisGears: `RG.PYSTATS`, `RG.DUMPREGISTRATIONS`, `RG.PYEXECUTE` and
//! `RG.PYDUMPREQS`.

use crate::client::{Client, FlatArg};
use crate::error::Result;
use crate::frame::{Column, Frame, Value};
use crate::query::QueryModel;
use crate::resp::record::Record;
use crate::resp::types::RespValue;

use tracing::error;

use super::{reply_text, string_list};

/// Python interpreter memory statistics.
pub fn query_rg_pystats(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let stats = Record::from_reply(&client.run_cmd("RG.PYSTATS", &[])?);

    let frame = Frame::new(&qm.command).with_columns(
        ["TotalAllocated", "PeakAllocated", "CurrAllocated"]
            .into_iter()
            .map(|name| Column::new(name, vec![stats.int(name)])),
    );
    Ok(vec![frame])
}

/// `"k"="v"` lines of a registration's arguments.
fn registration_args(args: &Record) -> String {
    let mut out = String::new();
    for (key, value) in args.iter() {
        out.push_str(&format!("\"{key}\"=\"{}\"\n", reply_text(value)));
    }
    out
}

/// One row per registered function.
pub fn query_rg_dumpregistrations(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("RG.DUMPREGISTRATIONS", &[])?;

    let mut frame = Frame::new(&qm.command).with_columns([
        Column::string("id"),
        Column::string("reader"),
        Column::string("desc"),
        Column::string("PD"),
        Column::string("mode"),
        Column::int64("numTriggered"),
        Column::int64("numSuccess"),
        Column::int64("numFailures"),
        Column::int64("numAborted"),
        Column::string("lastError"),
        Column::string("args"),
        Column::string("status"),
    ]);

    for entry in reply.as_array().unwrap_or(&[]) {
        let registration = Record::from_reply(entry);
        let data = registration.record("RegistrationData");
        frame.append_row(vec![
            registration.text("id").into(),
            registration.text("reader").into(),
            registration.text("desc").into(),
            registration.text("PD").into(),
            data.text("mode").into(),
            data.int("numTriggered").into(),
            data.int("numSuccess").into(),
            data.int("numFailures").into(),
            data.int("numAborted").into(),
            data.text("lastError").into(),
            registration_args(&data.record("args")).into(),
            data.text("status").into(),
        ]);
    }
    Ok(vec![frame])
}

/// `RG.PYEXECUTE script [UNBLOCKING] [REQUIREMENTS deps]`
///
/// Blocking runs yield a `results` and an `errors` frame; an unblocking run
/// yields only the operation id.
pub fn query_rg_pyexecute(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let mut args: Vec<FlatArg> = Vec::new();
    if qm.unblocking {
        args.push("UNBLOCKING".into());
    }
    if !qm.requirements.is_empty() {
        args.push("REQUIREMENTS".into());
        args.push(FlatArg::from(&qm.requirements));
    }

    let reply = client.run_flat_cmd("RG.PYEXECUTE", &qm.key_name, &args)?;

    if qm.unblocking {
        return Ok(vec![Frame::new("operationId")
            .with_column(Column::new("operationId", vec![reply_text(&reply)]))]);
    }

    let (results, errors) = match &reply {
        RespValue::Array(parts) if parts.len() == 2 => (string_list(&parts[0]), string_list(&parts[1])),
        RespValue::SimpleString(_) | RespValue::BulkString(_) => (Vec::new(), Vec::new()),
        other => {
            error!(kind = other.type_name(), "unexpected RG.PYEXECUTE reply");
            (Vec::new(), Vec::new())
        }
    };

    Ok(vec![
        Frame::new("results").with_column(Column::new("results", results)),
        Frame::new("errors").with_column(Column::new("errors", errors)),
    ])
}

fn wheels(value: Option<&RespValue>) -> String {
    match value {
        None | Some(RespValue::Null) => String::new(),
        Some(RespValue::Array(items)) => items
            .iter()
            .map(reply_text)
            .collect::<Vec<_>>()
            .join(", "),
        Some(value @ (RespValue::BulkString(_) | RespValue::SimpleString(_))) => reply_text(value),
        Some(other) => {
            error!(kind = other.type_name(), "unexpected Wheels value");
            "Can't parse output".to_string()
        }
    }
}

/// Installed Python requirements.
pub fn query_rg_pydumpreqs(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd("RG.PYDUMPREQS", &[])?;

    let mut frame = Frame::new(&qm.command).with_columns([
        Column::int64("GearReqVersion"),
        Column::string("Name"),
        Column::string("IsDownloaded"),
        Column::string("IsInstalled"),
        Column::string("CompiledOs"),
        Column::string("Wheels"),
    ]);

    for entry in reply.as_array().unwrap_or(&[]) {
        let req = Record::from_reply(entry);
        frame.append_row(vec![
            Value::Int(req.int("GearReqVersion")),
            req.text("Name").into(),
            req.text("IsDownloaded").into(),
            req.text("IsInstalled").into(),
            req.text("CompiledOs").into(),
            wheels(req.get("Wheels")).into(),
        ]);
    }
    Ok(vec![frame])
}

// ── Tests ──────────────────────────────────────────────────────────
