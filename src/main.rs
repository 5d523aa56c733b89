//! ShardCache - memcached-protocol cache service
//!
//! Serves the memcached text protocol from an embedded TTL map or a sharded
//! memcached cluster, selected by configuration.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use shardcache::config::Config;
use shardcache::health::HealthServer;
use shardcache::metrics::Metrics;
use shardcache::server::Server;
use shardcache::storage;
use std::sync::Arc;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting ShardCache");
    info!("Configuration: {:?}", config);

    let mut runtime_builder = Builder::new_multi_thread();
    if config.server.worker_threads > 0 {
        runtime_builder.worker_threads(config.server.worker_threads);
        info!("Using {} worker threads", config.server.worker_threads);
    }
    let runtime = runtime_builder.enable_all().build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let cancel_token = CancellationToken::new();

    let cache = storage::open(&config.storage, &config.memcache)?;
    let metrics = Arc::new(Metrics::new());

    let health_server = if config.metrics.enabled {
        let health = Arc::new(HealthServer::new(Arc::clone(&metrics)));
        let health_clone = Arc::clone(&health);
        let metrics_config = config.metrics.clone();

        std::thread::spawn(move || {
            if let Err(e) = health_clone.run(&metrics_config) {
                error!("Health server error: {}", e);
            }
        });

        Some(health)
    } else {
        None
    };

    let server = Arc::new(Server::new(
        config.server.clone(),
        Arc::clone(&cache),
        Arc::clone(&metrics),
        cancel_token.clone(),
    ));

    if let Some(ref health) = health_server {
        health.set_ready(true);
        info!("Server is ready");
    }

    let cancel_for_signal = cancel_token.clone();
    let health_for_signal = health_server.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        cancel_for_signal.cancel();
        if let Some(health) = health_for_signal {
            health.set_ready(false);
            health.stop();
        }
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        cancel_token.cancel();
        if let Some(health) = health_server {
            health.stop();
        }
    }

    cache.shutdown().await;
    info!("ShardCache stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
