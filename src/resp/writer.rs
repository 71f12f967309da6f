//! RESP command serializer.
//!
//! Every argument goes out as a binary-safe bulk string:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`

use itoa::Buffer;

/// Encode one command (list of arguments) into RESP wire format.
///
/// ```ignore
/// let bytes = encode_command(&["TS.GET", "sensor:1"]);
/// // → *2\r\n$6\r\nTS.GET\r\n$8\r\nsensor:1\r\n
/// ```
pub fn encode_command<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(args));
    write_command(&mut buf, args, &mut Buffer::new());
    buf
}

/// Encode several commands into one contiguous buffer so a pipeline goes
/// out in a single `write_all`.
pub fn encode_pipeline<A: AsRef<[u8]>>(commands: &[Vec<A>]) -> Vec<u8> {
    let cap = commands.iter().map(|c| encoded_len(c)).sum();
    let mut buf = Vec::with_capacity(cap);
    let mut itoa_buf = Buffer::new();
    for args in commands {
        write_command(&mut buf, args, &mut itoa_buf);
    }
    buf
}

fn encoded_len<A: AsRef<[u8]>>(args: &[A]) -> usize {
    // '*' + digits + \r\n, then '$' + digits + \r\n + data + \r\n per arg
    13 + args.iter().map(|a| 15 + a.as_ref().len()).sum::<usize>()
}

fn write_command<A: AsRef<[u8]>>(buf: &mut Vec<u8>, args: &[A], itoa_buf: &mut Buffer) {
    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    for arg in args {
        let arg = arg.as_ref();
        buf.push(b'$');
        buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::parser::parse_slice;
    use crate::resp::types::RespValue;

    #[test]
    fn encode_single_arg() {
        assert_eq!(encode_command(&["PING"]), b"*1\r\n$4\r\nPING\r\n");
    }

    #[test]
    fn encode_mixed_args() {
        assert_eq!(
            encode_command(&["TS.RANGE", "temp", "-", "+"]),
            b"*4\r\n$8\r\nTS.RANGE\r\n$4\r\ntemp\r\n$1\r\n-\r\n$1\r\n+\r\n"
        );
    }

    #[test]
    fn encode_empty_and_binary_args() {
        let args: [&[u8]; 3] = [b"SET", b"", &[0x00, 0xFF]];
        assert_eq!(
            encode_command(&args),
            b"*3\r\n$3\r\nSET\r\n$0\r\n\r\n$2\r\n\x00\xFF\r\n"
        );
    }

    #[test]
    fn encode_owned_strings() {
        let args = vec!["GET".to_string(), "k".to_string()];
        assert_eq!(encode_command(&args), b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
    }

    #[test]
    fn pipeline_is_concatenation() {
        let cmds = vec![
            vec!["MEMORY", "USAGE", "a"],
            vec!["MEMORY", "USAGE", "b"],
        ];
        let mut expected = encode_command(&cmds[0]);
        expected.extend(encode_command(&cmds[1]));
        assert_eq!(encode_pipeline(&cmds), expected);
    }

    #[test]
    fn empty_pipeline() {
        let cmds: Vec<Vec<&str>> = vec![];
        assert!(encode_pipeline(&cmds).is_empty());
    }

    #[test]
    fn encoded_command_parses_as_array() {
        let (value, _) = parse_slice(&encode_command(&["TYPE", "key:1"])).unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![RespValue::from("TYPE"), RespValue::from("key:1")])
        );
    }

    #[test]
    fn capacity_covers_output() {
        let args = ["SCAN", "0", "MATCH", "user:*", "COUNT", "1000"];
        assert!(encode_command(&args).len() <= encoded_len(&args));
    }
}
