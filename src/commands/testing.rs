//! In-memory [`Client`] with scripted replies.
//!
//! Replies are consumed in order, single commands and batches from separate
//! queues. Every issued command is recorded so tests can assert on the
//! exact argument vectors.

use crate::client::{flat_argv, Client, FlatArg, FlatCommand};
use crate::error::{DatasourceError, Result};
use crate::resp::types::RespValue;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;

#[derive(Debug, Clone)]
enum Scripted {
    Reply(RespValue),
    Transport(String),
}

impl Scripted {
    fn into_result(self) -> Result<RespValue> {
        match self {
            Self::Reply(RespValue::Error(msg)) => Err(DatasourceError::redis(msg)),
            Self::Reply(reply) => Ok(reply),
            Self::Transport(msg) => Err(DatasourceError::Connection(io::Error::new(
                io::ErrorKind::ConnectionReset,
                msg,
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Scripted>>,
    batches: Mutex<VecDeque<Vec<Scripted>>>,
    calls: Mutex<Vec<Vec<String>>>,
    closed: Mutex<bool>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply to the next single command.
    pub fn reply(self, reply: impl Into<RespValue>) -> Self {
        self.replies.lock().push_back(Scripted::Reply(reply.into()));
        self
    }

    /// Queue a server error reply.
    pub fn server_error(self, msg: &str) -> Self {
        self.reply(RespValue::Error(msg.to_string()))
    }

    /// Queue a transport failure.
    pub fn transport_error(self, msg: &str) -> Self {
        self.replies.lock().push_back(Scripted::Transport(msg.to_string()));
        self
    }

    /// Queue the replies to the next batch.
    pub fn batch(self, replies: Vec<RespValue>) -> Self {
        self.batches
            .lock()
            .push_back(replies.into_iter().map(Scripted::Reply).collect());
        self
    }

    /// Every command issued so far, batches flattened in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().clone()
    }

    /// The first issued command.
    pub fn first_call(&self) -> Vec<String> {
        self.calls.lock().first().cloned().unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    fn next_reply(&self, argv: Vec<String>) -> Result<RespValue> {
        self.calls.lock().push(argv);
        match self.replies.lock().pop_front() {
            Some(scripted) => scripted.into_result(),
            None => Err(DatasourceError::Protocol("no scripted reply left".into())),
        }
    }
}

impl Client for ScriptedClient {
    fn run_cmd(&self, cmd: &str, args: &[&str]) -> Result<RespValue> {
        let mut argv = vec![cmd.to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        self.next_reply(argv)
    }

    fn run_flat_cmd(&self, cmd: &str, key: &str, args: &[FlatArg]) -> Result<RespValue> {
        self.next_reply(flat_argv(cmd, key, args))
    }

    fn run_batch_flat_cmd(&self, batch: &[FlatCommand]) -> Result<Vec<RespValue>> {
        self.calls.lock().extend(batch.iter().map(FlatCommand::argv));
        let scripted = self
            .batches
            .lock()
            .pop_front()
            .ok_or_else(|| DatasourceError::Protocol("no scripted batch left".into()))?;
        scripted.into_iter().map(Scripted::into_result).collect()
    }

    fn close(&self) -> Result<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Build a bulk-string array from string slices.
pub fn bulk_array(items: &[&str]) -> RespValue {
    RespValue::Array(items.iter().map(|s| RespValue::from(*s)).collect())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_in_order_and_records() {
        let client = ScriptedClient::new()
            .reply("v")
            .server_error("WRONGTYPE Operation against a key holding the wrong kind of value")
            .batch(vec![RespValue::Integer(1), RespValue::Error("ERR x".into())]);

        assert_eq!(client.run_cmd("GET", &["k"]).unwrap(), RespValue::from("v"));
        let err = client.run_flat_cmd("HGETALL", "k", &[]).unwrap_err();
        assert!(err.to_string().starts_with("WRONGTYPE"));

        let batch = [FlatCommand::new("TYPE", "a", vec![]), FlatCommand::new("TYPE", "b", vec![])];
        assert_eq!(client.run_batch_flat_cmd(&batch).unwrap_err().to_string(), "ERR x");

        assert_eq!(
            client.calls(),
            vec![
                vec!["GET".to_string(), "k".into()],
                vec!["HGETALL".to_string(), "k".into()],
                vec!["TYPE".to_string(), "a".into()],
                vec!["TYPE".to_string(), "b".into()],
            ]
        );
        assert!(client.run_cmd("PING", &[]).is_err());
    }

    #[test]
    fn transport_errors() {
        let client = ScriptedClient::new().transport_error("broken pipe");
        assert!(client.run_cmd("PING", &[]).unwrap_err().is_transport());
        client.close().unwrap();
        assert!(client.is_closed());
    }
}
