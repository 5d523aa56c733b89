//! DistributedCache against real ShardCache servers acting as memcached shards

use bytes::Bytes;
use shardcache::config::{ServerConfig, ShardConfig};
use shardcache::metrics::Metrics;
use shardcache::server::Server;
use shardcache::storage::{DistributedCache, EmbeddedCache, Storage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Shard {
    addr: SocketAddr,
    cache: Arc<EmbeddedCache>,
}

async fn spawn_shard(cancel: &CancellationToken) -> Shard {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cache = Arc::new(EmbeddedCache::new(Duration::from_millis(50)));
    let server = Arc::new(Server::new(
        ServerConfig::default(),
        Arc::clone(&cache) as Arc<dyn Storage>,
        Arc::new(Metrics::new()),
        cancel.clone(),
    ));
    tokio::spawn(server.serve(listener));
    Shard { addr, cache }
}

async fn cluster(n: usize) -> (Vec<Shard>, DistributedCache, CancellationToken) {
    let cancel = CancellationToken::new();
    let mut shards = Vec::with_capacity(n);
    for _ in 0..n {
        shards.push(spawn_shard(&cancel).await);
    }
    let cache = DistributedCache::new(ShardConfig {
        shards: shards.iter().map(|s| s.addr).collect(),
        pool_size: 4,
        timeout: Duration::from_secs(2),
    })
    .unwrap();
    (shards, cache, cancel)
}

#[tokio::test]
async fn test_keys_land_on_their_routed_shard() {
    let (shards, cache, cancel) = cluster(3).await;

    for i in 0..60 {
        let key = format!("user:{i}");
        cache
            .set(&key, Bytes::from(format!("value-{i}")), Duration::ZERO)
            .await
            .unwrap();
    }

    for i in 0..60 {
        let key = format!("user:{i}");
        let expected = Bytes::from(format!("value-{i}"));
        assert_eq!(cache.get(&key).await.unwrap(), Some(expected.clone()));

        let home = cache.router().route(&key);
        for shard in &shards {
            let stored = shard.cache.lookup(&key);
            if shard.addr == home {
                assert_eq!(stored, Some(expected.clone()));
            } else {
                assert_eq!(stored, None, "{key} leaked onto {}", shard.addr);
            }
        }
    }

    let total: usize = shards.iter().map(|s| s.cache.len()).sum();
    assert_eq!(total, 60);

    cache.shutdown().await;
    cancel.cancel();
}

#[tokio::test]
async fn test_binary_values_and_delete() {
    let (_shards, cache, cancel) = cluster(2).await;

    let value = Bytes::from_static(b"line one\r\nEND\r\nline three\0");
    cache
        .set("blob", value.clone(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(cache.get("blob").await.unwrap(), Some(value));

    cache.delete("blob").await.unwrap();
    assert_eq!(cache.get("blob").await.unwrap(), None);
    // Idempotent
    cache.delete("blob").await.unwrap();

    cache.shutdown().await;
    cancel.cancel();
}

#[tokio::test]
async fn test_ttl_expires_on_shard() {
    let (_shards, cache, cancel) = cluster(1).await;

    // Sub-second TTLs round up to one second on the wire
    cache
        .set("short", Bytes::from_static(b"v"), Duration::from_millis(300))
        .await
        .unwrap();
    assert!(cache.get("short").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(cache.get("short").await.unwrap(), None);

    cache.shutdown().await;
    cancel.cancel();
}

#[tokio::test]
async fn test_concurrent_clients_share_pool() {
    let (shards, cache, cancel) = cluster(2).await;
    let cache = Arc::new(cache);

    let mut tasks = Vec::new();
    for t in 0..16 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            for i in 0..20 {
                let key = format!("k:{t}:{i}");
                cache
                    .set(&key, Bytes::from(key.clone()), Duration::ZERO)
                    .await
                    .unwrap();
                assert_eq!(cache.get(&key).await.unwrap(), Some(Bytes::from(key)));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    for shard in &shards {
        assert!(cache.pool().idle_count(shard.addr) <= cache.pool().capacity());
    }

    cache.shutdown().await;
    cancel.cancel();
}
