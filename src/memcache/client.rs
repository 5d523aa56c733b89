//! Wire-level `get`/`set`/`delete` on a single checked-out connection
//!
//! One command in flight per connection. Any error returned here leaves the stream
//! in an unknown position; callers must close the connection rather than pool it.

use crate::protocol::{MAX_ITEM_SIZE, request};
use crate::{ProtocolError, StorageError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Fetch `key`. `Ok(None)` when the server answers `END` with no value.
///
/// Only the first value is returned. Any further `VALUE` blocks and stray lines
/// before `END` are drained so the connection can be reused.
pub async fn get<S>(stream: &mut S, key: &str) -> Result<Option<Bytes>, StorageError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(key.len() + 8);
    request::gets(&mut buf, key);
    send(stream, &buf).await?;

    let mut line = Vec::with_capacity(64);
    read_line(stream, &mut line).await?;

    if line == b"END\r\n" {
        return Ok(None);
    }
    if is_error_reply(&line) {
        return Err(rejected("get", &line));
    }

    let value = if line.starts_with(b"VALUE ") {
        let len = value_length(&line)?;
        read_block(stream, len).await?
    } else {
        // Header-less payload line
        Bytes::copy_from_slice(&line[..line.len() - 2])
    };

    loop {
        read_line(stream, &mut line).await?;
        if line == b"END\r\n" {
            return Ok(Some(value));
        }
        if line.starts_with(b"VALUE ") {
            let len = value_length(&line)?;
            read_block(stream, len).await?;
        }
    }
}

/// Store `value` under `key`; `exptime` is already in wire form
pub async fn set<S>(stream: &mut S, key: &str, exptime: u64, value: &[u8]) -> Result<(), StorageError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    request::set(&mut buf, key, exptime, value);
    send(stream, &buf).await?;

    let mut line = Vec::with_capacity(16);
    read_line(stream, &mut line).await?;
    if line == b"STORED\r\n" {
        Ok(())
    } else {
        Err(rejected("set", &line))
    }
}

/// Remove `key`; a missing key counts as success
pub async fn delete<S>(stream: &mut S, key: &str) -> Result<(), StorageError>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(key.len() + 9);
    request::delete(&mut buf, key);
    send(stream, &buf).await?;

    let mut line = Vec::with_capacity(16);
    read_line(stream, &mut line).await?;
    match line.as_slice() {
        b"DELETED\r\n" | b"NOT_FOUND\r\n" => Ok(()),
        _ => Err(rejected("delete", &line)),
    }
}

async fn send<S>(stream: &mut S, buf: &[u8]) -> Result<(), StorageError>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one reply line, CRLF included
async fn read_line<S>(stream: &mut S, line: &mut Vec<u8>) -> Result<(), StorageError>
where
    S: AsyncBufRead + Unpin,
{
    line.clear();
    let n = stream.read_until(b'\n', line).await?;
    if n == 0 || line.last() != Some(&b'\n') {
        return Err(ProtocolError::UnexpectedEof.into());
    }
    if !line.ends_with(b"\r\n") {
        return Err(
            ProtocolError::MissingTerminator(String::from_utf8_lossy(line).into_owned()).into(),
        );
    }
    Ok(())
}

/// Read a `len`-byte data block followed by CRLF
async fn read_block<S>(stream: &mut S, len: usize) -> Result<Bytes, StorageError>
where
    S: AsyncBufRead + Unpin,
{
    let total = len
        .checked_add(2)
        .ok_or(ProtocolError::InvalidBytesLength)?;
    let mut data = BytesMut::zeroed(total);
    if let Err(e) = stream.read_exact(&mut data).await {
        return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::UnexpectedEof.into()
        } else {
            e.into()
        });
    }
    if &data[len..] != b"\r\n" {
        return Err(ProtocolError::MissingTerminator(
            String::from_utf8_lossy(&data[len..]).into_owned(),
        )
        .into());
    }
    data.truncate(len);
    Ok(data.freeze())
}

/// Byte count from `VALUE <key> <flags> <bytes> [<cas>]\r\n`, at most `MAX_ITEM_SIZE`
fn value_length(header: &[u8]) -> Result<usize, ProtocolError> {
    let invalid = || ProtocolError::InvalidValueHeader(String::from_utf8_lossy(header).into_owned());
    let fields = &header[..header.len() - 2];
    let bytes = fields
        .split(|&b| b == b' ')
        .filter(|f| !f.is_empty())
        .nth(3)
        .ok_or_else(invalid)?;
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&len| len <= MAX_ITEM_SIZE)
        .ok_or_else(invalid)
}

fn is_error_reply(line: &[u8]) -> bool {
    line == b"ERROR\r\n" || line.starts_with(b"CLIENT_ERROR ") || line.starts_with(b"SERVER_ERROR ")
}

fn rejected(command: &'static str, line: &[u8]) -> StorageError {
    StorageError::Rejected {
        command,
        response: String::from_utf8_lossy(line).into_owned(),
    }
}
