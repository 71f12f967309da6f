//! Query dispatcher.
//!
//! Decodes one query, routes it to the decoder for its command and wraps
//! the outcome into a [`DataResponse`]. A panicking decoder is contained
//! here: it is logged and yields an empty response for that query only.

use crate::client::Client;
use crate::commands::{
    cluster, custom, gears, graph, hash, info, json, keys, search, stream, timeseries, tmscan, zset,
};
use crate::error::{DatasourceError, Result};
use crate::frame::Frame;
use crate::query::{DataQuery, DataResponse, QueryContext, QueryModel};
use crate::streaming;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error};

/// Selectors understood by [`query`].
pub const COMMANDS: &[&str] = &[
    "tsrange",
    "tsmrange",
    "ts.get",
    "ts.info",
    "ts.queryindex",
    "ts.range",
    "ts.mrange",
    "hgetall",
    "hget",
    "hmget",
    "smembers",
    "hkeys",
    "type",
    "get",
    "ttl",
    "hlen",
    "xlen",
    "llen",
    "scard",
    "info",
    "clientList",
    "slowlogGet",
    "xinfoStream",
    "xrange",
    "xrevrange",
    "clusterInfo",
    "clusterNodes",
    "ft.info",
    "ft.search",
    "tmscan",
    "rg.pystats",
    "rg.dumpregistrations",
    "rg.pyexecute",
    "rg.pydumpreqs",
    "graph.query",
    "graph.slowlog",
    "graph.config",
    "graph.explain",
    "graph.profile",
    "zrange",
    "json.type",
    "json.get",
    "json.objkeys",
    "json.objlen",
    "json.arrlen",
];

/// Run one query against `client`.
pub fn query(data_query: &DataQuery, client: &dyn Client, ctx: &QueryContext) -> DataResponse {
    debug!(ref_id = %data_query.ref_id, json = %data_query.json, "query");

    let qm = match QueryModel::from_json(&data_query.json) {
        Ok(qm) => qm,
        Err(e) => return DataResponse::error(e),
    };
    if let Err(e) = ctx.check() {
        return DataResponse::error(e);
    }

    let from = data_query.time_range.from_ms();
    let to = data_query.time_range.to_ms();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(from, to, &qm, client)));
    let result = match outcome {
        Ok(result) => result,
        Err(payload) => {
            error!(
                ref_id = %data_query.ref_id,
                command = %qm.command,
                panic = %panic_message(payload.as_ref()),
                "decoder panicked"
            );
            return DataResponse::default();
        }
    };

    // Frames built after cancellation are discarded
    if let Err(e) = ctx.check() {
        return DataResponse::error(e);
    }

    let result = result.and_then(|frames| {
        if qm.wants_streaming() {
            streaming::apply(frames, &qm)
        } else {
            Ok(frames)
        }
    });
    DataResponse::from_result(result)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run(from: i64, to: i64, qm: &QueryModel, client: &dyn Client) -> Result<Vec<Frame>> {
    if !qm.query.is_empty() {
        return custom::query_custom_command(qm, client);
    }

    match qm.command.as_str() {
        // Nothing selected yet in the editor
        "" => Ok(Vec::new()),

        "ts.range" | "tsrange" => timeseries::query_ts_range(from, to, qm, client),
        "ts.mrange" | "tsmrange" => timeseries::query_ts_mrange(from, to, qm, client),
        "ts.get" => timeseries::query_ts_get(qm, client),
        "ts.info" => timeseries::query_ts_info(qm, client),
        "ts.queryindex" => timeseries::query_ts_queryindex(qm, client),

        "hgetall" => hash::query_hgetall(qm, client),
        "hget" => hash::query_hget(qm, client),
        "hmget" => hash::query_hmget(qm, client),
        "smembers" | "hkeys" => hash::query_smembers(qm, client),
        "type" | "get" | "ttl" | "hlen" | "xlen" | "llen" | "scard" => {
            keys::query_key_command(qm, client)
        }

        "info" => info::query_info(qm, client),
        "clientList" => info::query_client_list(qm, client),
        "slowlogGet" => info::query_slowlog_get(qm, client),

        "xinfoStream" => stream::query_xinfo_stream(qm, client),
        "xrange" => stream::query_xrange(qm, client),
        "xrevrange" => stream::query_xrevrange(qm, client),

        "clusterInfo" => cluster::query_cluster_info(qm, client),
        "clusterNodes" => cluster::query_cluster_nodes(qm, client),

        "ft.info" => search::query_ft_info(qm, client),
        "ft.search" => search::query_ft_search(qm, client),

        "tmscan" => tmscan::query_tmscan(qm, client),

        "rg.pystats" => gears::query_rg_pystats(qm, client),
        "rg.dumpregistrations" => gears::query_rg_dumpregistrations(qm, client),
        "rg.pyexecute" => gears::query_rg_pyexecute(qm, client),
        "rg.pydumpreqs" => gears::query_rg_pydumpreqs(qm, client),

        "graph.query" => graph::query_graph_query(qm, client),
        "graph.slowlog" => graph::query_graph_slowlog(qm, client),
        "graph.config" => graph::query_graph_config(qm, client),
        "graph.explain" | "graph.profile" => graph::query_graph_plan(qm, client),

        "zrange" => zset::query_zrange(qm, client),

        "json.get" => json::query_json_get(qm, client),
        "json.objkeys" => json::query_json_objkeys(qm, client),
        "json.objlen" | "json.type" | "json.arrlen" => json::query_json_scalar(qm, client),

        _ => Err(DatasourceError::query("Unknown command")),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
