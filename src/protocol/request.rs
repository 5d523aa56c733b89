//! Request encoder used by the cluster client
//!
//! Only the three commands the client issues are supported; keys are expected to
//! have passed `check_key` already.

use bytes::BytesMut;
use itoa::Buffer;

/// gets <key>\r\n
pub fn gets(buf: &mut BytesMut, key: &str) {
    buf.extend_from_slice(b"gets ");
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// set <key> 0 <exptime> <bytes>\r\n<data>\r\n
pub fn set(buf: &mut BytesMut, key: &str, exptime: u64, data: &[u8]) {
    let mut itoa_buf = Buffer::new();
    buf.reserve(key.len() + data.len() + 32);
    buf.extend_from_slice(b"set ");
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b" 0 ");
    buf.extend_from_slice(itoa_buf.format(exptime).as_bytes());
    buf.extend_from_slice(b" ");
    buf.extend_from_slice(itoa_buf.format(data.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
}

/// delete <key>\r\n
pub fn delete(buf: &mut BytesMut, key: &str) {
    buf.extend_from_slice(b"delete ");
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b"\r\n");
}
