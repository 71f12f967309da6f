//! Streaming RESP parser.
//!
//! [`parse`] takes the bytes read so far and returns
//! `Ok((RespValue, bytes_consumed))`, `Err(Incomplete)` when more data is
//! needed, or `Err(Protocol(…))` on malformed input.
//!
//! Bulk strings are cut out of the shared `Bytes` buffer with `slice()`,
//! so large replies (INFO, CLIENT LIST, JSON.GET) are never copied.
//! RESP3 frames are accepted and folded into the RESP2 shapes.

use bytes::Bytes;
use crate::error::{DatasourceError, Result};
use crate::resp::types::RespValue;
use memchr::memchr;

/// Nesting limit for aggregate replies.
const MAX_DEPTH: usize = 128;

/// Parse one RESP value from the front of `buf`.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    parse_at(buf, 0, 0)
}

/// Convenience wrapper: parse from a byte slice (copies into `Bytes` first).
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

/// Parse the value starting at `buf[start]`; returns the absolute end offset.
fn parse_at(buf: &Bytes, start: usize, depth: usize) -> Result<(RespValue, usize)> {
    if depth > MAX_DEPTH {
        return Err(DatasourceError::Protocol("reply nested too deeply".into()));
    }
    let Some(&tag) = buf.get(start) else {
        return Err(DatasourceError::Incomplete);
    };

    match tag {
        b'+' | b'(' => {
            let (line, next) = read_line(buf, start + 1)?;
            Ok((RespValue::SimpleString(utf8(line, "simple string")?), next))
        }
        b',' => {
            // RESP3 double, kept as its textual form
            let (line, next) = read_line(buf, start + 1)?;
            Ok((RespValue::SimpleString(utf8(line, "double")?), next))
        }
        b'-' => {
            let (line, next) = read_line(buf, start + 1)?;
            Ok((RespValue::Error(utf8(line, "error")?), next))
        }
        b':' => {
            let (line, next) = read_line(buf, start + 1)?;
            Ok((RespValue::Integer(parse_int_from_bytes(line)?), next))
        }
        b'#' => {
            let (line, next) = read_line(buf, start + 1)?;
            match line {
                b"t" => Ok((RespValue::Integer(1), next)),
                b"f" => Ok((RespValue::Integer(0), next)),
                _ => Err(DatasourceError::Protocol("invalid boolean frame".into())),
            }
        }
        b'_' => {
            let (_, next) = read_line(buf, start + 1)?;
            Ok((RespValue::Null, next))
        }
        b'$' => match read_blob(buf, start)? {
            (Some(data), next) => Ok((RespValue::BulkString(data), next)),
            (None, next) => Ok((RespValue::Null, next)),
        },
        b'=' => match read_blob(buf, start)? {
            // Verbatim string: drop the 4-byte "txt:" style format prefix
            (Some(data), next) if data.len() >= 4 && data[3] == b':' => {
                Ok((RespValue::BulkString(data.slice(4..)), next))
            }
            (Some(data), next) => Ok((RespValue::BulkString(data), next)),
            (None, next) => Ok((RespValue::Null, next)),
        },
        b'!' => match read_blob(buf, start)? {
            (Some(data), next) => Ok((
                RespValue::Error(String::from_utf8_lossy(&data).into_owned()),
                next,
            )),
            (None, next) => Ok((RespValue::Null, next)),
        },
        b'*' | b'~' | b'>' => {
            let (line, next) = read_line(buf, start + 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Ok((RespValue::Null, next));
            }
            let (items, end) = parse_elements(buf, next, count as usize, depth)?;
            Ok((RespValue::Array(items), end))
        }
        b'%' => {
            // Map: flattened into an alternating key/value array
            let (line, next) = read_line(buf, start + 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Err(DatasourceError::Protocol("negative map count".into()));
            }
            let (items, end) = parse_elements(buf, next, count as usize * 2, depth)?;
            Ok((RespValue::Array(items), end))
        }
        b'|' => {
            // Attributes are out-of-band metadata; skip them, keep the data
            let (line, next) = read_line(buf, start + 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Err(DatasourceError::Protocol("negative attribute count".into()));
            }
            let (_, after) = parse_elements(buf, next, count as usize * 2, depth)?;
            parse_at(buf, after, depth + 1)
        }
        other => Err(DatasourceError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

fn parse_elements(
    buf: &Bytes,
    mut next: usize,
    count: usize,
    depth: usize,
) -> Result<(Vec<RespValue>, usize)> {
    // Cap the preallocation: the count comes off the wire
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let (item, end) = parse_at(buf, next, depth + 1)?;
        items.push(item);
        next = end;
    }
    Ok((items, next))
}

// ── Helpers ────────────────────────────────────────────────────────

/// `<tag><len>\r\n<data>\r\n`; a negative length is a null blob.
fn read_blob(buf: &Bytes, start: usize) -> Result<(Option<Bytes>, usize)> {
    let (line, next) = read_line(buf, start + 1)?;
    let len = parse_int_from_bytes(line)?;
    if len < 0 {
        return Ok((None, next));
    }
    let data_end = next + len as usize;
    if buf.len() < data_end + 2 {
        return Err(DatasourceError::Incomplete);
    }
    if &buf[data_end..data_end + 2] != b"\r\n" {
        return Err(DatasourceError::Protocol(
            "bulk string not terminated by \\r\\n".into(),
        ));
    }
    Ok((Some(buf.slice(next..data_end)), data_end + 2))
}

/// Read the line starting at `buf[offset]` up to `\r\n`.
/// Returns `(line_bytes, index_after_crlf)`.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let tail = buf.get(offset..).ok_or(DatasourceError::Incomplete)?;
    let cr = memchr(b'\r', tail).ok_or(DatasourceError::Incomplete)? + offset;
    match buf.get(cr + 1) {
        Some(b'\n') => Ok((&buf[offset..cr], cr + 2)),
        Some(_) => Err(DatasourceError::Protocol("expected \\n after \\r".into())),
        None => Err(DatasourceError::Incomplete),
    }
}

fn utf8(line: &[u8], what: &str) -> Result<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| DatasourceError::Protocol(format!("invalid UTF-8 in {what}: {e}")))
}

/// Parse a signed base-10 integer from a header line without allocating.
pub(crate) fn parse_int_from_bytes(bytes: &[u8]) -> Result<i64> {
    let (negative, digits) = match bytes.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some((b'+', rest)) => (false, rest),
        Some(_) => (false, bytes),
        None => return Err(DatasourceError::Protocol("empty integer".into())),
    };
    if digits.is_empty() {
        return Err(DatasourceError::Protocol("integer has no digits".into()));
    }

    // Accumulate negatively so i64::MIN does not overflow
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(DatasourceError::Protocol(format!(
                "invalid byte in integer: 0x{b:02x}"
            )));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub(i64::from(b - b'0')))
            .ok_or_else(|| DatasourceError::Protocol("integer overflow".into()))?;
    }
    if negative {
        Ok(n)
    } else {
        n.checked_neg()
            .ok_or_else(|| DatasourceError::Protocol("integer overflow".into()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
