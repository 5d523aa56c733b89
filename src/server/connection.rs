//! Per-connection read/parse/execute loop

use super::Server;
use super::handler;
use crate::protocol::{Command, ParseResult, ResponseWriter, find_crlf, parse};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Serve one client until it quits, disconnects, or the server is cancelled
pub async fn handle(
    server: Arc<Server>,
    mut stream: TcpStream,
    _permit: OwnedSemaphorePermit,
) -> anyhow::Result<()> {
    let result = serve(&server, &mut stream).await;
    server.metrics.active_connections.dec();
    result
}

async fn serve(server: &Server, stream: &mut TcpStream) -> anyhow::Result<()> {
    let mut read_buf = BytesMut::with_capacity(server.config.read_buffer_size);
    let mut response = ResponseWriter::new(server.config.write_buffer_size);

    loop {
        let n = tokio::select! {
            _ = server.cancel_token.cancelled() => return Ok(()),
            result = stream.read_buf(&mut read_buf) => match result {
                Ok(n) => n,
                Err(e) => {
                    debug!("Read error: {}", e);
                    return Ok(());
                }
            },
        };
        if n == 0 {
            return Ok(());
        }
        server.metrics.bytes_read.inc_by(n as u64);

        // Run every complete command in the buffer; a partial `set` data block
        // stays buffered and is parsed again after the next read
        loop {
            match parse(&read_buf) {
                ParseResult::Complete(cmd, consumed) => {
                    let quit = matches!(cmd, Command::Quit);
                    let noreply = cmd.is_noreply();

                    handler::execute(server, cmd, &mut response).await;
                    let _ = read_buf.split_to(consumed);

                    if noreply {
                        response.clear();
                    } else if !response.is_empty() {
                        flush(server, stream, &mut response).await?;
                    }

                    if quit {
                        return Ok(());
                    }
                }
                ParseResult::NeedMoreData => break,
                ParseResult::Error(e) => {
                    server.metrics.protocol_errors.inc();
                    debug!("Protocol error: {}", e);
                    response.client_error(&e.to_string());

                    // Skip the offending line
                    match find_crlf(&read_buf) {
                        Some(pos) => {
                            let _ = read_buf.split_to(pos + 2);
                        }
                        None => read_buf.clear(),
                    }

                    flush(server, stream, &mut response).await?;
                }
            }
        }
    }
}

async fn flush(
    server: &Server,
    stream: &mut TcpStream,
    response: &mut ResponseWriter,
) -> std::io::Result<()> {
    let buf = response.take();
    server.metrics.bytes_written.inc_by(buf.len() as u64);
    stream.write_all(&buf).await
}
