//! Storage layer: the `Storage` capability and its two backends

mod distributed;
mod embedded;
mod entry;

pub use distributed::DistributedCache;
pub use embedded::{EmbeddedCache, SWEEP_EVICTED};
pub use entry::CacheEntry;

use crate::config::{Backend, MemcacheConfig, StorageConfig};
use crate::{ShardCacheError, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Key/value operations shared by every backend.
///
/// A miss is `Ok(None)`, never an error. A zero `ttl` means the value never expires.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend label for logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StorageError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), StorageError>;

    /// Removing a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Release background tasks and connections. Idempotent.
    async fn shutdown(&self);
}

/// Build the configured backend. Must be called within a Tokio runtime.
pub fn open(storage: &StorageConfig, memcache: &MemcacheConfig) -> crate::Result<Arc<dyn Storage>> {
    let backend: Arc<dyn Storage> = match storage.backend {
        Backend::Embedded => {
            if storage.sweep_interval_ms == 0 {
                return Err(ShardCacheError::Config(
                    "storage.sweep_interval_ms must be greater than zero".to_string(),
                ));
            }
            Arc::new(EmbeddedCache::new(storage.sweep_interval()))
        }
        Backend::Distributed => {
            let shards = memcache.resolve()?;
            info!(
                shards = shards.shards.len(),
                pool_size = shards.pool_size,
                timeout_ms = memcache.timeout_ms,
                "Using memcached cluster"
            );
            Arc::new(DistributedCache::new(shards)?)
        }
    };

    info!("Storage backend: {}", backend.name());
    Ok(backend)
}
