//! Per-shard pool of idle TCP connections
//!
//! The mutex guards only the idle bookkeeping. Dialing and every byte of I/O
//! happen on the caller's own checked-out connection, outside the lock.

use crate::StorageError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connections opened to shards
pub static CONNECTIONS_DIALED: AtomicU64 = AtomicU64::new(0);

/// Acquires served from the idle set
pub static CONNECTIONS_REUSED: AtomicU64 = AtomicU64::new(0);

/// Connections closed after a failed command
pub static CONNECTIONS_DISCARDED: AtomicU64 = AtomicU64::new(0);

/// Connections closed on release because the idle set was full
pub static CONNECTIONS_OVERFLOWED: AtomicU64 = AtomicU64::new(0);

/// Connections closed on release because the pool was already shut down
pub static CONNECTIONS_CLOSED_AFTER_SHUTDOWN: AtomicU64 = AtomicU64::new(0);

/// A connection checked out of (or destined for) the pool.
///
/// Owned by exactly one caller while checked out.
#[derive(Debug)]
pub struct PooledConnection {
    addr: SocketAddr,
    stream: BufReader<TcpStream>,
    deadline: Instant,
}

impl PooledConnection {
    /// Shard this connection talks to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Point in time after which I/O on this checkout is abandoned
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn stream_mut(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.stream
    }

    /// Local socket address, unique per open connection
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.get_ref().local_addr()
    }
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<SocketAddr, Vec<PooledConnection>>,
    closed: bool,
}

/// Bounded cache of idle connections, keyed by shard address
pub struct ConnectionPool {
    state: Mutex<PoolState>,
    capacity: usize,
    timeout: Duration,
}

impl ConnectionPool {
    /// `capacity` idle connections are kept per shard; `timeout` bounds dialing
    /// and each checkout's I/O
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            capacity,
            timeout,
        }
    }

    /// Check out a connection to `addr`, reusing an idle one when possible
    pub async fn acquire(&self, addr: SocketAddr) -> Result<PooledConnection, StorageError> {
        let reused = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(StorageError::Closed);
            }
            state.idle.get_mut(&addr).and_then(Vec::pop)
        };

        if let Some(mut conn) = reused {
            conn.deadline = Instant::now() + self.timeout;
            CONNECTIONS_REUSED.fetch_add(1, Ordering::Relaxed);
            return Ok(conn);
        }

        self.dial(addr).await
    }

    async fn dial(&self, addr: SocketAddr) -> Result<PooledConnection, StorageError> {
        let stream = connect_within(addr, self.timeout, TcpStream::connect(addr)).await?;

        // Disable Nagle's algorithm for lower latency
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        CONNECTIONS_DIALED.fetch_add(1, Ordering::Relaxed);
        debug!(%addr, "Opened shard connection");

        Ok(PooledConnection {
            addr,
            stream: BufReader::new(stream),
            deadline: Instant::now() + self.timeout,
        })
    }

    /// Return a healthy connection; it is closed instead if the shard's idle set
    /// is full or the pool has been shut down
    pub fn release(&self, conn: PooledConnection) {
        let rejected = {
            let mut state = self.state.lock();
            if state.closed {
                CONNECTIONS_CLOSED_AFTER_SHUTDOWN.fetch_add(1, Ordering::Relaxed);
                Some(conn)
            } else {
                let idle = state.idle.entry(conn.addr).or_default();
                if idle.len() < self.capacity {
                    idle.push(conn);
                    None
                } else {
                    CONNECTIONS_OVERFLOWED.fetch_add(1, Ordering::Relaxed);
                    Some(conn)
                }
            }
        };

        if let Some(conn) = rejected {
            debug!(addr = %conn.addr, "Closing connection instead of pooling it");
        }
    }

    /// Close a connection whose state can no longer be trusted
    pub fn discard(&self, conn: PooledConnection) {
        CONNECTIONS_DISCARDED.fetch_add(1, Ordering::Relaxed);
        debug!(addr = %conn.addr, "Discarding broken connection");
    }

    /// Close every idle connection and refuse further checkouts. Idempotent.
    pub fn close_all(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };

        let count: usize = drained.values().map(Vec::len).sum();
        if count > 0 {
            info!(count, "Closed idle shard connections");
        }
    }

    /// Idle connections currently held for `addr`
    pub fn idle_count(&self, addr: SocketAddr) -> usize {
        self.state.lock().idle.get(&addr).map_or(0, Vec::len)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Bound a dial: refusal is `ConnectFailed`, running out of time is `Timeout`
async fn connect_within<S>(
    addr: SocketAddr,
    timeout: Duration,
    connect: impl Future<Output = std::io::Result<S>>,
) -> Result<S, StorageError> {
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(StorageError::ConnectFailed {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(StorageError::Timeout {
            addr: addr.to_string(),
        }),
    }
}
