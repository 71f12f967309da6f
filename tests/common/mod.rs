//! Shared helpers for integration tests.
//!
//! [`MockRedis`] is an in-process RESP server on `127.0.0.1:0`. Each
//! connection gets its own thread; every command is recorded and answered
//! by the test's handler, so the whole stack (pool, router, client,
//! decoders) runs against real wire bytes without a Redis server.

#![allow(dead_code)]

use redis_datasource::datasource::PluginContext;
use redis_datasource::error::DatasourceError;
use redis_datasource::query::DataQuery;
use redis_datasource::resp::parse_slice;
use redis_datasource::resp::types::RespValue;

use parking_lot::Mutex;
use serde_json::json;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

type Handler = dyn Fn(&[String]) -> RespValue + Send + Sync;

pub struct MockRedis {
    pub port: u16,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockRedis {
    /// Start a server answering every command with `handler(argv)`.
    pub fn start(handler: impl Fn(&[String]) -> RespValue + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let handler: Arc<Handler> = Arc::new(handler);
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        {
            let commands = Arc::clone(&commands);
            let connections = Arc::clone(&connections);
            thread::spawn(move || {
                for socket in listener.incoming() {
                    let Ok(socket) = socket else { break };
                    connections.fetch_add(1, Ordering::SeqCst);
                    let handler = Arc::clone(&handler);
                    let commands = Arc::clone(&commands);
                    thread::spawn(move || serve_connection(socket, handler, commands));
                }
            });
        }

        Self {
            port,
            commands,
            connections,
        }
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().clone()
    }

    /// Commands named `name` (case-insensitive).
    pub fn commands_named(&self, name: &str) -> Vec<Vec<String>> {
        self.commands()
            .into_iter()
            .filter(|argv| argv.first().is_some_and(|c| c.eq_ignore_ascii_case(name)))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve_connection(mut socket: TcpStream, handler: Arc<Handler>, commands: Arc<Mutex<Vec<Vec<String>>>>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match socket.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&buf[..n]);

        // Answer every complete command in the buffer (pipelines included)
        let mut out = Vec::new();
        loop {
            match parse_slice(&pending) {
                Ok((value, used)) => {
                    pending.drain(..used);
                    let argv = argv_of(&value);
                    commands.lock().push(argv.clone());
                    encode_reply(&handler(&argv), &mut out);
                }
                Err(DatasourceError::Incomplete) => break,
                Err(_) => return,
            }
        }
        if socket.write_all(&out).is_err() {
            return;
        }
    }
}

fn argv_of(value: &RespValue) -> Vec<String> {
    value
        .as_array()
        .unwrap_or(&[])
        .iter()
        .map(|v| v.text().unwrap_or_default())
        .collect()
}

/// RESP2 wire form of a reply.
pub fn encode_reply(value: &RespValue, out: &mut Vec<u8>) {
    match value {
        RespValue::Null => out.extend_from_slice(b"$-1\r\n"),
        RespValue::Integer(i) => out.extend_from_slice(format!(":{i}\r\n").as_bytes()),
        RespValue::SimpleString(s) => out.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        RespValue::Error(e) => out.extend_from_slice(format!("-{e}\r\n").as_bytes()),
        RespValue::BulkString(b) => {
            out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        RespValue::Array(items) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_reply(item, out);
            }
        }
    }
}

pub fn bulk_array(items: &[&str]) -> RespValue {
    RespValue::Array(items.iter().map(|s| RespValue::from(*s)).collect())
}

/// Host context for a data source at `url`.
pub fn plugin_context(id: i64, updated: i64, url: &str, json_data: serde_json::Value) -> PluginContext {
    serde_json::from_value(json!({
        "dataSourceId": id,
        "updated": updated,
        "settings": { "url": url, "jsonData": json_data, "secureJsonData": {} }
    }))
    .expect("plugin context")
}

/// A query over the window used throughout the time-series fixtures.
pub fn data_query(ref_id: &str, json: serde_json::Value) -> DataQuery {
    serde_json::from_value(json!({
        "refId": ref_id,
        "timeRange": { "from": 1548149180000i64, "to": 1548149195000i64 },
        "json": json,
    }))
    .expect("data query")
}
