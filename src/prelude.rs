//! Prelude module for common imports.
//!
//! ```ignore
//! use shardcache::prelude::*;
//! ```

// Error types
pub use crate::error::{ProtocolError, Result, ShardCacheError, StorageError};

// Configuration
pub use crate::config::{Backend, Config, MemcacheConfig, ServerConfig, StorageConfig};

// Storage
pub use crate::storage::{DistributedCache, EmbeddedCache, Storage};

// Cluster plumbing
pub use crate::memcache::{ConnectionPool, ShardRouter};

// Metrics
pub use crate::metrics::Metrics;

// Server
pub use crate::server::Server;

// Common external crates
pub use bytes::Bytes;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tracing::{debug, error, info, trace, warn};
