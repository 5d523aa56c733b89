//! Reply builder for the front server

use bytes::BytesMut;
use itoa::Buffer;

/// Accumulates replies for one connection until they are flushed
pub struct ResponseWriter {
    buf: BytesMut,
}

impl ResponseWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffer, leaving an empty buffer in its place
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// VALUE <key> 0 <bytes>[ <cas>]\r\n<data>\r\n
    ///
    /// Flags are always 0; storage keeps opaque bytes only.
    pub fn value(&mut self, key: &[u8], data: &[u8], cas: Option<u64>) {
        let mut itoa_buf = Buffer::new();
        self.buf.extend_from_slice(b"VALUE ");
        self.buf.extend_from_slice(key);
        self.buf.extend_from_slice(b" 0 ");
        self.buf
            .extend_from_slice(itoa_buf.format(data.len()).as_bytes());
        if let Some(cas) = cas {
            self.buf.extend_from_slice(b" ");
            self.buf.extend_from_slice(itoa_buf.format(cas).as_bytes());
        }
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    pub fn end(&mut self) {
        self.buf.extend_from_slice(b"END\r\n");
    }

    pub fn stored(&mut self) {
        self.buf.extend_from_slice(b"STORED\r\n");
    }

    pub fn deleted(&mut self) {
        self.buf.extend_from_slice(b"DELETED\r\n");
    }

    pub fn version(&mut self, version: &str) {
        self.line(b"VERSION ", version);
    }

    pub fn client_error(&mut self, message: &str) {
        self.line(b"CLIENT_ERROR ", message);
    }

    pub fn server_error(&mut self, message: &str) {
        self.line(b"SERVER_ERROR ", message);
    }

    fn line(&mut self, prefix: &[u8], message: &str) {
        self.buf.extend_from_slice(prefix);
        self.buf.extend_from_slice(message.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
    }
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_response() {
        let mut writer = ResponseWriter::new(256);
        writer.value(b"key1", b"value1", None);
        writer.value(b"key2", b"v2", Some(0));
        writer.end();

        let expected = b"VALUE key1 0 6\r\nvalue1\r\nVALUE key2 0 2 0\r\nv2\r\nEND\r\n";
        assert_eq!(writer.buffer(), &expected[..]);
    }

    #[test]
    fn test_simple_responses() {
        let mut writer = ResponseWriter::new(256);

        writer.stored();
        assert_eq!(writer.take().as_ref(), b"STORED\r\n");

        writer.deleted();
        assert_eq!(writer.take().as_ref(), b"DELETED\r\n");
        assert!(writer.is_empty());
    }

    #[test]
    fn test_errors_and_version() {
        let mut writer = ResponseWriter::default();

        writer.client_error("bad command line format");
        assert_eq!(
            writer.take().as_ref(),
            b"CLIENT_ERROR bad command line format\r\n"
        );

        writer.server_error("storage failure");
        writer.version("shardcache 0.1.0");
        assert_eq!(
            writer.buffer(),
            b"SERVER_ERROR storage failure\r\nVERSION shardcache 0.1.0\r\n"
        );
    }
}
