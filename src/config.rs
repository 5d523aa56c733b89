//! Configuration for ShardCache

use crate::ShardCacheError;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub memcache: MemcacheConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Front server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen_addr: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Read buffer size per connection (bytes)
    pub read_buffer_size: usize,

    /// Write buffer size per connection (bytes)
    pub write_buffer_size: usize,

    /// Number of Tokio worker threads (0 = number of CPUs)
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:11311".to_string(),
            max_connections: 10000,
            read_buffer_size: 8192,
            write_buffer_size: 8192,
            worker_threads: 0,
        }
    }
}

/// Which storage engine backs the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process TTL map
    #[default]
    Embedded,
    /// Sharded memcached cluster
    #[serde(alias = "memcache")]
    Distributed,
}

impl std::str::FromStr for Backend {
    type Err = ShardCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "embedded" => Ok(Backend::Embedded),
            "distributed" | "memcache" => Ok(Backend::Distributed),
            other => Err(ShardCacheError::Config(format!("Unknown backend: {other}"))),
        }
    }
}

/// Storage backend selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,

    /// Interval between expiry sweeps of the embedded cache
    pub sweep_interval_ms: u64,
}

impl StorageConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Embedded,
            sweep_interval_ms: 50,
        }
    }
}

/// Memcached cluster (distributed backend) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemcacheConfig {
    /// Shard addresses as host:port, in routing order
    pub servers: Vec<String>,

    /// Idle connections retained per shard
    pub pool_size: usize,

    /// Dial timeout, and I/O deadline applied on every acquire
    pub timeout_ms: u64,
}

impl Default for MemcacheConfig {
    fn default() -> Self {
        Self {
            servers: vec!["127.0.0.1:11211".to_string()],
            pool_size: 5,
            timeout_ms: 1000,
        }
    }
}

impl MemcacheConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve every shard address (TCP only), failing fast on bad input
    pub fn resolve(&self) -> crate::Result<ShardConfig> {
        if self.servers.is_empty() {
            return Err(ShardCacheError::Config(
                "memcache.servers must list at least one shard".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ShardCacheError::Config(
                "memcache.timeout_ms must be greater than zero".to_string(),
            ));
        }

        let mut shards = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let addr = server
                .to_socket_addrs()
                .map_err(|e| {
                    ShardCacheError::Config(format!("Can't resolve TCP address {server}: {e}"))
                })?
                .next()
                .ok_or_else(|| {
                    ShardCacheError::Config(format!("No address found for {server}"))
                })?;
            shards.push(addr);
        }

        Ok(ShardConfig {
            shards,
            pool_size: self.pool_size,
            timeout: self.timeout(),
        })
    }
}

/// Resolved, immutable shard settings
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub shards: Vec<SocketAddr>,
    pub pool_size: usize,
    pub timeout: Duration,
}

/// Metrics and health check configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection
    pub enabled: bool,

    /// Address for metrics/health HTTP server
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Log filter used when RUST_LOG is not set
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ShardCacheError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&contents)
            .map_err(|e| ShardCacheError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables or use defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> crate::Result<()> {
        if let Some(addr) = var("SHARDCACHE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        if let Some(backend) = var("SHARDCACHE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }

        if let Some(ms) = var("SHARDCACHE_SWEEP_INTERVAL_MS")
            && let Ok(n) = ms.parse()
        {
            self.storage.sweep_interval_ms = n;
        }

        if let Some(servers) = var("SHARDCACHE_MEMCACHE_SERVERS") {
            self.memcache.servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(size) = var("SHARDCACHE_MEMCACHE_POOL_SIZE")
            && let Ok(n) = size.parse()
        {
            self.memcache.pool_size = n;
        }

        if let Some(ms) = var("SHARDCACHE_MEMCACHE_TIMEOUT_MS")
            && let Ok(n) = ms.parse()
        {
            self.memcache.timeout_ms = n;
        }

        if let Some(addr) = var("SHARDCACHE_METRICS_ADDR") {
            self.metrics.listen_addr = addr;
        }

        if let Some(enabled) = var("SHARDCACHE_METRICS_ENABLED") {
            self.metrics.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Some(level) = var("SHARDCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }
}
