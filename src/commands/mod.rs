//! Command decoders.
//!
//! One module per command family. Every decoder has the shape
//! `fn(&QueryModel, &dyn Client) -> Result<Vec<Frame>>` (time-series range
//! queries also take the query window), issues its commands through the
//! [`Client`](crate::client::Client) and turns the replies into frames.

pub mod cluster;
pub mod custom;
pub mod gears;
pub mod graph;
pub mod hash;
pub mod info;
pub mod json;
pub mod keys;
pub mod search;
pub mod stream;
pub mod timeseries;
pub mod tmscan;
pub mod zset;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::{DatasourceError, Result};
use crate::resp::types::RespValue;

/// Text of a scalar reply; empty for null and arrays.
pub(crate) fn reply_text(reply: &RespValue) -> String {
    reply.to_text().unwrap_or_default()
}

/// Split shell-quoted user input. Invalid quoting fails with `message`.
pub(crate) fn split_args(text: &str, message: &str) -> Result<Vec<String>> {
    shell_words::split(text).map_err(|_| DatasourceError::query(message))
}

/// Elements of an array reply as text. Null elements read as empty.
pub(crate) fn string_list(reply: &RespValue) -> Vec<String> {
    reply
        .as_array()
        .unwrap_or(&[])
        .iter()
        .map(reply_text)
        .collect()
}

/// Non-blank lines; `\r\n` and `\n` endings both accepted.
pub(crate) fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().filter(|line| !line.trim().is_empty())
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use testing::bulk_array;

    #[test]
    fn split_args_quoting() {
        assert_eq!(
            split_args(r#"name "first name" 'last'"#, "bad").unwrap(),
            vec!["name", "first name", "last"]
        );
        assert!(split_args("", "bad").unwrap().is_empty());
        assert_eq!(split_args("\"open", "Filter is not valid").unwrap_err().to_string(), "Filter is not valid");
    }

    #[test]
    fn lists_and_lines() {
        let reply = RespValue::Array(vec!["a".into(), RespValue::Null, RespValue::Integer(3)]);
        assert_eq!(string_list(&reply), vec!["a", "", "3"]);
        assert!(string_list(&RespValue::Null).is_empty());
        assert_eq!(string_list(&bulk_array(&["x"])), vec!["x"]);

        let lines: Vec<_> = text_lines("# Server\r\nredis_version:6.0\r\n\r\nos:Linux\n").collect();
        assert_eq!(lines, vec!["# Server", "redis_version:6.0", "os:Linux"]);
    }
}
