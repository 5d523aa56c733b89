//! Command handlers: map parsed commands onto `Storage` calls

use super::Server;
use crate::StorageError;
use crate::protocol::{Command, ResponseWriter, ttl_from_exptime};
use bytes::Bytes;
use std::borrow::Cow;
use std::time::Instant;
use tracing::warn;

const VERSION: &str = concat!("shardcache ", env!("CARGO_PKG_VERSION"));

/// Execute a parsed command, appending its reply to `response`
pub async fn execute(server: &Server, cmd: Command<'_>, response: &mut ResponseWriter) {
    let start = Instant::now();
    match cmd {
        Command::Get { keys, with_cas } => {
            server.metrics.cmd_get.inc();
            handle_get(server, &keys, with_cas, response).await;
        }
        Command::Set {
            key, exptime, data, ..
        } => {
            server.metrics.cmd_set.inc();
            handle_set(server, &key, exptime, &data, response).await;
        }
        Command::Delete { key, .. } => {
            server.metrics.cmd_delete.inc();
            handle_delete(server, &key, response).await;
        }
        Command::Version => response.version(VERSION),
        // Handled in connection loop
        Command::Quit => return,
    }
    server
        .metrics
        .cmd_latency
        .observe(start.elapsed().as_secs_f64());
}

/// Keys were validated as printable ASCII by the parser
fn key_str(key: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(key)
}

async fn handle_get(
    server: &Server,
    keys: &[Cow<'_, [u8]>],
    with_cas: bool,
    response: &mut ResponseWriter,
) {
    // Nothing is written until every key has been looked up, so a failure
    // part-way through yields a single SERVER_ERROR line
    let mut hits = Vec::with_capacity(keys.len());
    for key in keys {
        let name = key_str(key);
        match server.storage.get(&name).await {
            Ok(Some(value)) => {
                server.metrics.get_hits.inc();
                hits.push((key, value));
            }
            Ok(None) => server.metrics.get_misses.inc(),
            Err(e) => return storage_failure(server, "get", &name, &e, response),
        }
    }

    // No CAS support; gets reports a constant unique value
    let cas = with_cas.then_some(0);
    for (key, value) in hits {
        response.value(key, &value, cas);
    }
    response.end();
}

async fn handle_set(
    server: &Server,
    key: &[u8],
    exptime: u64,
    data: &[u8],
    response: &mut ResponseWriter,
) {
    let name = key_str(key);
    let result = match ttl_from_exptime(exptime) {
        Some(ttl) => {
            server
                .storage
                .set(&name, Bytes::copy_from_slice(data), ttl)
                .await
        }
        // Already expired: drop whatever was there
        None => server.storage.delete(&name).await,
    };

    match result {
        Ok(()) => response.stored(),
        Err(e) => storage_failure(server, "set", &name, &e, response),
    }
}

async fn handle_delete(server: &Server, key: &[u8], response: &mut ResponseWriter) {
    let name = key_str(key);
    match server.storage.delete(&name).await {
        Ok(()) => response.deleted(),
        Err(e) => storage_failure(server, "delete", &name, &e, response),
    }
}

/// Log the cause, tell the client only that storage failed
fn storage_failure(
    server: &Server,
    command: &str,
    key: &str,
    e: &StorageError,
    response: &mut ResponseWriter,
) {
    server.metrics.storage_errors.inc();
    warn!(command, key, "Storage failure: {}", e);
    response.server_error("storage failure");
}
