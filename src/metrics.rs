//! Prometheus metrics for ShardCache

use crate::memcache::pool::{
    CONNECTIONS_CLOSED_AFTER_SHUTDOWN, CONNECTIONS_DIALED, CONNECTIONS_DISCARDED,
    CONNECTIONS_OVERFLOWED, CONNECTIONS_REUSED,
};
use crate::storage::SWEEP_EVICTED;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::atomic::{AtomicU64, Ordering};

/// Front server metrics
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_get: IntCounter,
    pub cmd_set: IntCounter,
    pub cmd_delete: IntCounter,

    // Hit/miss counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,

    // Connection metrics
    pub active_connections: IntGauge,
    pub total_connections: IntCounter,
    pub rejected_connections: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
    pub storage_errors: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    registry.register(Box::new(counter.clone())).unwrap();
    counter
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cmd_get = counter(&registry, "shardcache_cmd_get_total", "Total GET commands");
        let cmd_set = counter(&registry, "shardcache_cmd_set_total", "Total SET commands");
        let cmd_delete = counter(
            &registry,
            "shardcache_cmd_delete_total",
            "Total DELETE commands",
        );

        let get_hits = counter(&registry, "shardcache_get_hits_total", "Total GET hits");
        let get_misses = counter(&registry, "shardcache_get_misses_total", "Total GET misses");

        let active_connections = IntGauge::new(
            "shardcache_active_connections",
            "Current active connections",
        )
        .unwrap();
        registry
            .register(Box::new(active_connections.clone()))
            .unwrap();
        let total_connections = counter(
            &registry,
            "shardcache_connections_total",
            "Total connections accepted",
        );
        let rejected_connections = counter(
            &registry,
            "shardcache_rejected_connections_total",
            "Total connections rejected",
        );

        let bytes_read = counter(&registry, "shardcache_bytes_read_total", "Total bytes read");
        let bytes_written = counter(
            &registry,
            "shardcache_bytes_written_total",
            "Total bytes written",
        );

        // Remote backends add a network round trip, hence the longer tail
        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new(
                "shardcache_cmd_latency_seconds",
                "Command latency in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
        )
        .unwrap();
        registry.register(Box::new(cmd_latency.clone())).unwrap();

        let protocol_errors = counter(
            &registry,
            "shardcache_protocol_errors_total",
            "Total client protocol errors",
        );
        let storage_errors = counter(
            &registry,
            "shardcache_storage_errors_total",
            "Total storage backend errors",
        );

        Self {
            registry,
            cmd_get,
            cmd_set,
            cmd_delete,
            get_hits,
            get_misses,
            active_connections,
            total_connections,
            rejected_connections,
            bytes_read,
            bytes_written,
            cmd_latency,
            protocol_errors,
            storage_errors,
        }
    }

    /// Prometheus text exposition, including the backend's static counters
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        let mut output = String::from_utf8(buffer).unwrap();

        let statics: [(&str, &str, &AtomicU64); 6] = [
            (
                "shardcache_sweep_evicted_total",
                "Expired entries removed by the embedded sweep",
                &SWEEP_EVICTED,
            ),
            (
                "shardcache_pool_dialed_total",
                "Connections opened to memcached shards",
                &CONNECTIONS_DIALED,
            ),
            (
                "shardcache_pool_reused_total",
                "Checkouts served by an idle connection",
                &CONNECTIONS_REUSED,
            ),
            (
                "shardcache_pool_discarded_total",
                "Connections closed after a failed command",
                &CONNECTIONS_DISCARDED,
            ),
            (
                "shardcache_pool_overflowed_total",
                "Connections closed on release because the idle set was full",
                &CONNECTIONS_OVERFLOWED,
            ),
            (
                "shardcache_pool_closed_after_shutdown_total",
                "Connections closed on release after the pool was shut down",
                &CONNECTIONS_CLOSED_AFTER_SHUTDOWN,
            ),
        ];

        for (name, help, value) in statics {
            let value = value.load(Ordering::Relaxed);
            output.push_str(&format!(
                "\n# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        metrics.cmd_get.inc();
        metrics.cmd_set.inc();
        metrics.get_hits.inc();
        metrics.active_connections.set(5);

        let output = metrics.gather();
        assert!(output.contains("shardcache_cmd_get_total 1"));
        assert!(output.contains("shardcache_active_connections 5"));
    }

    #[test]
    fn test_gather_includes_backend_counters() {
        let output = Metrics::new().gather();
        assert!(output.contains("# TYPE shardcache_sweep_evicted_total counter"));
        assert!(output.contains("shardcache_pool_dialed_total "));
        assert!(output.contains("shardcache_pool_overflowed_total "));
        assert!(output.contains("shardcache_pool_closed_after_shutdown_total "));
    }
}
