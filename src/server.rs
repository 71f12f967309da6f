//! Host protocol: one JSON object per line on the standard streams.
//!
//! ```text
//! → {"id":1,"method":"queryData","pluginContext":{…},"queries":[…]}
//! ← {"id":1,"result":{"A":{"frames":[…]}}}
//! → {"id":2,"method":"checkHealth","pluginContext":{…}}
//! ← {"id":2,"result":{"status":"OK","message":"…"}}
//! → {"id":3,"method":"cancel","target":1}
//! → {"id":4,"method":"dispose","pluginContext":{"dataSourceId":7}}
//! ```
//!
//! Every request runs on its own thread and responses are written as they
//! complete, so they may arrive out of order. End of input waits for the
//! in-flight requests and returns.

use crate::datasource::{Datasource, PluginContext};
use crate::query::{DataQuery, QueryContext};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Request {
    pub id: Value,
    pub method: String,
    pub plugin_context: PluginContext,
    pub queries: Vec<DataQuery>,
    /// Request id a `cancel` applies to.
    pub target: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Contexts of the requests still running, by request id.
type InFlight = Arc<Mutex<HashMap<String, QueryContext>>>;

/// Answer one request.
pub fn handle(datasource: &Datasource, request: Request, query_ctx: &QueryContext) -> Response {
    let id = request.id;
    match request.method.as_str() {
        "queryData" => match datasource.query_data(&request.plugin_context, &request.queries, query_ctx) {
            Ok(responses) => match serde_json::to_value(responses) {
                Ok(result) => Response::ok(id, result),
                Err(e) => Response::error(id, e.to_string()),
            },
            Err(e) => Response::error(id, e.to_string()),
        },
        "checkHealth" => match serde_json::to_value(datasource.check_health(&request.plugin_context)) {
            Ok(result) => Response::ok(id, result),
            Err(e) => Response::error(id, e.to_string()),
        },
        "dispose" => {
            let disposed = datasource.dispose(request.plugin_context.data_source_id);
            Response::ok(id, Value::Bool(disposed))
        }
        other => Response::error(id, format!("unknown method: {other}")),
    }
}

fn write_line<W: Write>(output: &Mutex<W>, response: &Response) -> io::Result<()> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    let mut out = output.lock();
    out.write_all(&line)?;
    out.flush()
}

/// Serve requests from `input` until it is exhausted.
///
/// Fails on the first I/O error on either stream.
pub fn serve<R, W>(input: R, output: W, datasource: Arc<Datasource>) -> io::Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let output = Arc::new(Mutex::new(output));
    let in_flight: InFlight = Arc::default();
    let write_error: Arc<Mutex<Option<io::Error>>> = Arc::default();
    let mut workers = Vec::new();

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "malformed request line");
                write_line(&output, &Response::error(Value::Null, format!("invalid request: {e}")))?;
                continue;
            }
        };
        debug!(id = %request.id, method = %request.method, "request");

        if request.method == "cancel" {
            if let Some(ctx) = in_flight.lock().get(&request.target.to_string()) {
                ctx.cancel();
            }
            continue;
        }

        let query_ctx = QueryContext::new();
        let key = request.id.to_string();
        in_flight.lock().insert(key.clone(), query_ctx.clone());

        let datasource = Arc::clone(&datasource);
        let output = Arc::clone(&output);
        let in_flight = Arc::clone(&in_flight);
        let write_error = Arc::clone(&write_error);
        workers.push(thread::spawn(move || {
            let response = handle(&datasource, request, &query_ctx);
            in_flight.lock().remove(&key);
            if let Err(e) = write_line(&output, &response) {
                warn!(error = %e, "writing response failed");
                let mut first = write_error.lock();
                if first.is_none() {
                    *first = Some(e);
                }
            }
        }));

        workers.retain(|worker| !worker.is_finished());
    }

    for worker in workers {
        if worker.join().is_err() {
            warn!("request thread panicked");
        }
    }

    let first = write_error.lock().take();
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
