//! Memcached cluster backend: route, check out, run one command, settle

use crate::config::ShardConfig;
use crate::memcache::{ConnectionPool, PooledConnection, ShardRouter, client};
use crate::protocol::{check_key, exptime_from_ttl};
use crate::storage::Storage;
use crate::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// `Storage` over a fixed set of memcached shards
pub struct DistributedCache {
    router: ShardRouter,
    pool: ConnectionPool,
}

impl DistributedCache {
    pub fn new(config: ShardConfig) -> crate::Result<Self> {
        let router = ShardRouter::new(config.shards)?;
        let pool = ConnectionPool::new(config.pool_size, config.timeout);
        Ok(Self { router, pool })
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    async fn checkout(&self, key: &str) -> Result<PooledConnection, StorageError> {
        check_key(key.as_bytes()).map_err(|_| StorageError::InvalidKey(key.to_owned()))?;
        self.pool.acquire(self.router.route(key)).await
    }

    /// Pool the connection after success, close it after any failure
    fn settle<T>(
        &self,
        conn: PooledConnection,
        outcome: Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        match &outcome {
            Ok(_) => self.pool.release(conn),
            Err(e) => {
                if let StorageError::Protocol(p) = e {
                    warn!(addr = %conn.addr(), "Protocol desync, dropping connection: {}", p);
                }
                self.pool.discard(conn);
            }
        }
        outcome
    }
}

/// Run `fut` against the checkout deadline
async fn bounded<T>(
    addr: SocketAddr,
    deadline: Instant,
    fut: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .unwrap_or_else(|_| {
            Err(StorageError::Timeout {
                addr: addr.to_string(),
            })
        })
}

#[async_trait]
impl Storage for DistributedCache {
    fn name(&self) -> &'static str {
        "distributed"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError> {
        let mut conn = self.checkout(key).await?;
        let (addr, deadline) = (conn.addr(), conn.deadline());
        let outcome = bounded(addr, deadline, client::get(conn.stream_mut(), key)).await;
        self.settle(conn, outcome)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StorageError> {
        let mut conn = self.checkout(key).await?;
        let (addr, deadline) = (conn.addr(), conn.deadline());
        let exptime = exptime_from_ttl(ttl);
        let outcome = bounded(
            addr,
            deadline,
            client::set(conn.stream_mut(), key, exptime, &value),
        )
        .await;
        self.settle(conn, outcome)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.checkout(key).await?;
        let (addr, deadline) = (conn.addr(), conn.deadline());
        let outcome = bounded(addr, deadline, client::delete(conn.stream_mut(), key)).await;
        self.settle(conn, outcome)
    }

    async fn shutdown(&self) {
        self.pool.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Scripted shard: answers each request line with the next canned reply.
    /// `set` data blocks are consumed and ignored.
    async fn scripted_shard(replies: Vec<&'static str>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut replies = replies.into_iter();
            while let Ok((stream, _)) = listener.accept().await {
                let mut stream = BufReader::new(stream);
                let mut line = String::new();
                loop {
                    line.clear();
                    if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                        break;
                    }
                    if let Some(len) = line.strip_prefix("set ").and_then(|rest| {
                        rest.split_whitespace().nth(3).and_then(|n| n.parse::<usize>().ok())
                    }) {
                        let mut data = vec![0u8; len + 2];
                        stream.read_exact(&mut data).await.unwrap();
                    }
                    let Some(reply) = replies.next() else {
                        return;
                    };
                    stream.get_mut().write_all(reply.as_bytes()).await.unwrap();
                }
            }
        });
        addr
    }

    fn cache(addr: SocketAddr, timeout: Duration) -> DistributedCache {
        DistributedCache::new(ShardConfig {
            shards: vec![addr],
            pool_size: 2,
            timeout,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_reuses_connection() {
        let addr = scripted_shard(vec![
            "STORED\r\n",
            "VALUE a 0 3\r\nxyz\r\nEND\r\n",
            "DELETED\r\n",
            "END\r\n",
        ])
        .await;
        let cache = cache(addr, Duration::from_secs(1));

        cache
            .set("a", Bytes::from_static(b"xyz"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(cache.pool().idle_count(addr), 1);

        assert_eq!(
            cache.get("a").await.unwrap(),
            Some(Bytes::from_static(b"xyz"))
        );
        cache.delete("a").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.pool().idle_count(addr), 1);
    }

    #[tokio::test]
    async fn test_protocol_error_discards_connection() {
        let addr = scripted_shard(vec!["VALUE a 0 3\r\nxyz\r\nEND\n"]).await;
        let cache = cache(addr, Duration::from_secs(1));

        let err = cache.get("a").await.unwrap_err();
        assert!(matches!(err, StorageError::Protocol(_)), "unexpected: {err:?}");
        assert_eq!(cache.pool().idle_count(addr), 0);
    }

    #[tokio::test]
    async fn test_rejected_set_discards_connection() {
        let addr = scripted_shard(vec!["SERVER_ERROR out of memory\r\n"]).await;
        let cache = cache(addr, Duration::from_secs(1));

        let err = cache
            .set("a", Bytes::from_static(b"x"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { command: "set", .. }));
        assert_eq!(cache.pool().idle_count(addr), 0);
    }

    #[tokio::test]
    async fn test_silent_shard_times_out() {
        // Accepts and reads, never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink).await;
        });
        let cache = cache(addr, Duration::from_millis(100));

        let err = cache.get("a").await.unwrap_err();
        assert!(err.is_timeout(), "unexpected: {err:?}");
        assert_eq!(cache.pool().idle_count(addr), 0);
    }

    #[tokio::test]
    async fn test_invalid_key_never_dials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let cache = cache(addr, Duration::from_secs(1));

        for key in ["", "has space", "line\r\nbreak"] {
            assert!(matches!(
                cache.get(key).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
        // A valid key does try the (dead) shard
        assert!(cache.get("ok").await.unwrap_err().is_connect_failure());
    }

    #[tokio::test]
    async fn test_shutdown_closes_pool() {
        let addr = scripted_shard(vec!["DELETED\r\n"]).await;
        let cache = cache(addr, Duration::from_secs(1));

        cache.delete("a").await.unwrap();
        assert_eq!(cache.pool().idle_count(addr), 1);

        cache.shutdown().await;
        assert_eq!(cache.pool().idle_count(addr), 0);
        assert!(matches!(cache.get("a").await, Err(StorageError::Closed)));
    }

    #[test]
    fn test_empty_shard_list() {
        let result = DistributedCache::new(ShardConfig {
            shards: vec![],
            pool_size: 1,
            timeout: Duration::from_secs(1),
        });
        assert!(result.is_err());
    }
}
