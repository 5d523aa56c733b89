//! Key to shard routing
//!
//! `crc32(key) % shard_count` over a fixed list. This is not consistent hashing:
//! changing the list remaps most keys. Placement must match every other client of
//! the same cluster.

use crate::ShardCacheError;
use std::net::SocketAddr;

/// Maps keys onto a static, ordered shard list
#[derive(Debug, Clone)]
pub struct ShardRouter {
    shards: Vec<SocketAddr>,
}

impl ShardRouter {
    pub fn new(shards: Vec<SocketAddr>) -> crate::Result<Self> {
        if shards.is_empty() {
            return Err(ShardCacheError::Config(
                "shard list must not be empty".to_string(),
            ));
        }
        Ok(Self { shards })
    }

    /// Shard owning `key`
    pub fn route(&self, key: &str) -> SocketAddr {
        let hash = crc32fast::hash(key.as_bytes());
        self.shards[hash as usize % self.shards.len()]
    }

    pub fn shards(&self) -> &[SocketAddr] {
        &self.shards
    }
}
