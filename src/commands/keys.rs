//! Commands taking one key and returning one value: `TYPE`, `GET`, `TTL`,
//! `HLEN`, `XLEN`, `LLEN` and `SCARD`.

use crate::client::Client;
use crate::error::Result;
use crate::frame::{scalar_frame, Frame};
use crate::query::QueryModel;

use super::reply_text;

/// Run `<command> key` and wrap the reply in a scalar frame named by key.
pub fn query_key_command(qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    let reply = client.run_cmd(&qm.command.to_ascii_uppercase(), &[qm.key_name.as_str()])?;
    Ok(vec![scalar_frame(&qm.key_name, &reply_text(&reply), "Value")])
}

// ── Tests ──────────────────────────────────────────────────────────
