//! # ShardCache
//!
//! A cache behind one small `Storage` interface (get / set / delete with TTL), with
//! two interchangeable backends:
//!
//! - **Embedded**: an in-process map behind a reader-writer lock, with per-entry
//!   TTL, lazy expiry on read, and a cancellable background sweep.
//! - **Distributed**: a fixed set of memcached shards. Keys are routed by
//!   `crc32(key) % shards`, each shard has a bounded pool of idle TCP connections,
//!   and commands use the memcached text protocol.
//!
//! The binary puts either backend behind a memcached-protocol TCP server with
//! Prometheus metrics and health endpoints.
//!
//! ## Example
//!
//! ```ignore
//! use shardcache::config::{Backend, Config};
//! use shardcache::storage;
//!
//! let mut config = Config::default();
//! config.storage.backend = Backend::Distributed;
//! config.memcache.servers = vec!["10.0.0.1:11211".into(), "10.0.0.2:11211".into()];
//!
//! let cache = storage::open(&config.storage, &config.memcache)?;
//! cache.set("user:42", "alice".into(), Duration::from_secs(60)).await?;
//! let hit = cache.get("user:42").await?;
//! cache.shutdown().await;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌──────────────────┐
//! │ memcache     │────▶│ ShardCache server    │────▶│ EmbeddedCache    │
//! │ client       │     │  ├─ ASCII protocol   │  or │ DistributedCache │
//! └──────────────┘     │  └─ dyn Storage      │     │  ├─ ShardRouter  │
//!                      └──────────────────────┘     │  ├─ Pool         │
//!                                                   │  └─ client ──▶ memcached shards
//!                                                   └──────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod memcache;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod storage;

pub use error::{ProtocolError, Result, ShardCacheError, StorageError};
