//! Hand-written parser for inbound memcached ASCII commands
//!
//! A command is a single CRLF-terminated line; `set` is additionally followed by a
//! data block of exactly `<bytes>` bytes and a trailing CRLF. The parser never
//! consumes partial input: if the buffer does not hold a whole command yet it
//! returns `NeedMoreData` and the caller retries after the next read.

use crate::ProtocolError;
use crate::protocol::command::{Command, MAX_ITEM_SIZE, check_key};
use std::borrow::Cow;

/// Result of parsing
#[derive(Debug)]
pub enum ParseResult<'a> {
    /// Command fully parsed, with the number of bytes it occupied
    Complete(Command<'a>, usize),
    /// Need more data to complete parsing
    NeedMoreData,
    /// Parse error; the offending line should be skipped
    Error(ProtocolError),
}

/// Find \r\n in buffer
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n")
}

/// Case-insensitive command comparison (avoids allocation from to_ascii_lowercase)
#[inline]
fn cmd_eq(cmd: &[u8], expected: &[u8]) -> bool {
    cmd.eq_ignore_ascii_case(expected)
}

/// Parse one command from the front of `buf`
pub fn parse(buf: &[u8]) -> ParseResult<'_> {
    let Some(line_end) = find_crlf(buf) else {
        return ParseResult::NeedMoreData;
    };

    let mut parts = buf[..line_end]
        .split(|&b| b == b' ')
        .filter(|part| !part.is_empty());

    let Some(name) = parts.next() else {
        return ParseResult::Error(ProtocolError::InvalidCommand("empty command".to_string()));
    };

    let line_len = line_end + 2;
    let result = if cmd_eq(name, b"get") {
        parse_get(parts, false).map(|cmd| (cmd, line_len))
    } else if cmd_eq(name, b"gets") {
        parse_get(parts, true).map(|cmd| (cmd, line_len))
    } else if cmd_eq(name, b"set") {
        return parse_set(parts, buf, line_len);
    } else if cmd_eq(name, b"delete") {
        parse_delete(parts).map(|cmd| (cmd, line_len))
    } else if cmd_eq(name, b"version") {
        Ok((Command::Version, line_len))
    } else if cmd_eq(name, b"quit") {
        Ok((Command::Quit, line_len))
    } else {
        Err(ProtocolError::InvalidCommand(
            String::from_utf8_lossy(name).into_owned(),
        ))
    };

    match result {
        Ok((cmd, consumed)) => ParseResult::Complete(cmd, consumed),
        Err(e) => ParseResult::Error(e),
    }
}

fn parse_get<'a>(
    parts: impl Iterator<Item = &'a [u8]>,
    with_cas: bool,
) -> Result<Command<'a>, ProtocolError> {
    let keys = parts
        .map(|key| check_key(key).map(|()| Cow::Borrowed(key)))
        .collect::<Result<Vec<_>, _>>()?;

    if keys.is_empty() {
        return Err(ProtocolError::InvalidCommand(
            "get requires at least one key".to_string(),
        ));
    }

    Ok(Command::Get { keys, with_cas })
}

/// set <key> <flags> <exptime> <bytes> [noreply]\r\n<data>\r\n
fn parse_set<'a>(
    parts: impl Iterator<Item = &'a [u8]>,
    buf: &'a [u8],
    line_len: usize,
) -> ParseResult<'a> {
    let (key, exptime, bytes, noreply) = match parse_set_header(parts) {
        Ok(header) => header,
        Err(e) => return ParseResult::Error(e),
    };

    let Some(total) = line_len
        .checked_add(bytes)
        .and_then(|end| end.checked_add(2))
    else {
        return ParseResult::Error(ProtocolError::InvalidBytesLength);
    };
    let data_end = total - 2;
    if buf.len() < total {
        return ParseResult::NeedMoreData;
    }
    if &buf[data_end..total] != b"\r\n" {
        return ParseResult::Error(ProtocolError::UnexpectedData);
    }

    ParseResult::Complete(
        Command::Set {
            key: Cow::Borrowed(key),
            exptime,
            data: Cow::Borrowed(&buf[line_len..data_end]),
            noreply,
        },
        total,
    )
}

/// delete <key> [time] [noreply]
///
/// The optional time argument is accepted and ignored, as memcached does.
fn parse_delete<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<Command<'a>, ProtocolError> {
    let key = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidCommand("delete requires a key".to_string()))?;
    check_key(key)?;

    let noreply = parts.any(|part| part == b"noreply");

    Ok(Command::Delete {
        key: Cow::Borrowed(key),
        noreply,
    })
}

fn parse_set_header<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<(&'a [u8], u64, usize, bool), ProtocolError> {
    let key = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidCommand("missing key".to_string()))?;
    check_key(key)?;
    // Flags are validated but not stored; every value is served back with 0
    parse_number::<u32>(parts.next()).ok_or(ProtocolError::InvalidFlags)?;
    let exptime = parse_number::<u64>(parts.next()).ok_or(ProtocolError::InvalidExptime)?;
    let bytes = parse_number::<usize>(parts.next())
        .filter(|&n| n <= MAX_ITEM_SIZE)
        .ok_or(ProtocolError::InvalidBytesLength)?;
    let noreply = parts.next() == Some(b"noreply".as_slice());
    Ok((key, exptime, bytes, noreply))
}

fn parse_number<T: std::str::FromStr>(bytes: Option<&[u8]>) -> Option<T> {
    std::str::from_utf8(bytes?).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let buf = b"get foo bar\r\n";
        match parse(buf) {
            ParseResult::Complete(Command::Get { keys, with_cas }, consumed) => {
                assert_eq!(keys.len(), 2);
                assert_eq!(keys[0].as_ref(), b"foo");
                assert_eq!(keys[1].as_ref(), b"bar");
                assert!(!with_cas);
                assert_eq!(consumed, buf.len());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_gets() {
        match parse(b"gets a\r\n") {
            ParseResult::Complete(Command::Get { keys, with_cas }, _) => {
                assert_eq!(keys[0].as_ref(), b"a");
                assert!(with_cas);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_set() {
        let buf = b"set mykey 42 3600 5\r\nhello\r\nget mykey\r\n";
        match parse(buf) {
            ParseResult::Complete(
                Command::Set {
                    key,
                    exptime,
                    data,
                    noreply,
                },
                consumed,
            ) => {
                assert_eq!(key.as_ref(), b"mykey");
                assert_eq!(exptime, 3600);
                assert_eq!(data.as_ref(), b"hello");
                assert!(!noreply);
                assert_eq!(consumed, b"set mykey 42 3600 5\r\nhello\r\n".len());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_set_binary_data() {
        let buf = b"set k 0 0 4\r\na\r\nb\r\n";
        match parse(buf) {
            ParseResult::Complete(Command::Set { data, .. }, consumed) => {
                assert_eq!(data.as_ref(), b"a\r\nb");
                assert_eq!(consumed, buf.len());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_set_waits_for_data() {
        assert!(matches!(
            parse(b"set k 0 0 10\r\nhal"),
            ParseResult::NeedMoreData
        ));
    }

    #[test]
    fn test_parse_set_bad_terminator() {
        assert!(matches!(
            parse(b"set k 0 0 2\r\nabcd"),
            ParseResult::Error(ProtocolError::UnexpectedData)
        ));
    }

    #[test]
    fn test_parse_set_bad_header() {
        assert!(matches!(
            parse(b"set k x 0 2\r\nab\r\n"),
            ParseResult::Error(ProtocolError::InvalidFlags)
        ));
        assert!(matches!(
            parse(b"set k 0 -1 2\r\nab\r\n"),
            ParseResult::Error(ProtocolError::InvalidExptime)
        ));
        assert!(matches!(
            parse(b"set k 0 0\r\n"),
            ParseResult::Error(ProtocolError::InvalidBytesLength)
        ));
    }

    #[test]
    fn test_parse_set_oversized() {
        assert!(matches!(
            parse(b"set k 0 0 18446744073709551615\r\nab\r\n"),
            ParseResult::Error(ProtocolError::InvalidBytesLength)
        ));

        let header = format!("set k 0 0 {}\r\n", MAX_ITEM_SIZE + 1);
        assert!(matches!(
            parse(header.as_bytes()),
            ParseResult::Error(ProtocolError::InvalidBytesLength)
        ));

        // Exactly at the limit still waits for the data block
        let header = format!("set k 0 0 {MAX_ITEM_SIZE}\r\n");
        assert!(matches!(parse(header.as_bytes()), ParseResult::NeedMoreData));
    }

    #[test]
    fn test_parse_delete() {
        match parse(b"delete mykey\r\n") {
            ParseResult::Complete(Command::Delete { key, noreply }, _) => {
                assert_eq!(key.as_ref(), b"mykey");
                assert!(!noreply);
            }
            other => panic!("unexpected: {other:?}"),
        }

        match parse(b"delete mykey 0 noreply\r\n") {
            ParseResult::Complete(Command::Delete { noreply, .. }, _) => assert!(noreply),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_version_and_quit() {
        assert!(matches!(
            parse(b"VERSION\r\n"),
            ParseResult::Complete(Command::Version, 9)
        ));
        assert!(matches!(
            parse(b"quit\r\n"),
            ParseResult::Complete(Command::Quit, 6)
        ));
    }

    #[test]
    fn test_parse_need_more_data() {
        assert!(matches!(parse(b"get foo"), ParseResult::NeedMoreData));
    }

    #[test]
    fn test_parse_invalid_command() {
        assert!(matches!(
            parse(b"incr counter 1\r\n"),
            ParseResult::Error(ProtocolError::InvalidCommand(_))
        ));
        assert!(matches!(
            parse(b"\r\n"),
            ParseResult::Error(ProtocolError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_parse_key_too_long() {
        let mut buf = b"get ".to_vec();
        buf.extend_from_slice(&[b'a'; 251]);
        buf.extend_from_slice(b"\r\n");

        assert!(matches!(
            parse(&buf),
            ParseResult::Error(ProtocolError::KeyTooLong)
        ));
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"abc\r\n"), Some(3));
        assert_eq!(find_crlf(b"a\rb\r\n"), Some(3));
        assert_eq!(find_crlf(b"abc\n"), None);
    }
}
