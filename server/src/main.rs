//! Read-model synchronizer process.
//!
//! Runs the consumer group that projects events into Postgres and the HTTP
//! read API in front of it, sharing one set of repositories.
//!
//! ```bash
//! docker compose up -d   # redpanda, postgres, redis
//! RUST_LOG=info,readmodels_redpanda=debug cargo run --bin readmodels
//! ```
//!
//! Ctrl+C or SIGTERM stops the HTTP listener, releases the partitions and
//! waits for in-flight records to finish.

mod config;
mod telemetry;

use anyhow::Context;
use config::{Config, LogFormat};
use readmodels_projections::{
    PageCache, PostgresAggregateStore, RedisCacheStore, Repositories, projection_router,
};
use readmodels_redpanda::{ConsumerGroupManager, KafkaGroupClient, KafkaGroupConfig};
use readmodels_web::AppState;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.server.log_format);

    tracing::info!(
        brokers = %config.kafka.brokers,
        group_id = %config.kafka.group_id,
        topics = ?config.kafka.topics,
        http = %config.server.http_addr,
        "Starting read-model synchronizer"
    );

    telemetry::install(config.server.metrics_addr).context("Failed to install metrics exporter")?;

    let store = PostgresAggregateStore::connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    store.migrate().await.context("Failed to run migrations")?;

    let cache = RedisCacheStore::new(&config.cache.url)
        .await
        .context("Failed to connect to Redis")?;

    let repositories = Repositories::new(
        Arc::new(store),
        PageCache::new(Arc::new(cache)).with_ttl(config.cache.ttl),
    );
    let router = Arc::new(projection_router(&repositories));

    let group_config = KafkaGroupConfig::new(
        config.kafka.brokers.clone(),
        config.kafka.group_id.clone(),
        config.kafka.topics.clone(),
    )
    .auto_offset_reset(config.kafka.auto_offset_reset.clone())
    .session_timeout(config.kafka.session_timeout);
    let client = KafkaGroupClient::connect(&group_config).context("Failed to create consumer")?;

    let (stop, shutdown) = watch::channel(false);
    let stop = Arc::new(stop);

    let manager = ConsumerGroupManager::new(Arc::new(client), router, shutdown.clone());
    let consumer = tokio::spawn({
        let stop = Arc::clone(&stop);
        async move {
            let result = manager.start().await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Consumer group stopped");
            }
            // A dead consumer takes the API down with it.
            stop.send_replace(true);
            result
        }
    });

    tokio::spawn({
        let stop = Arc::clone(&stop);
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown requested");
            stop.send_replace(true);
        }
    });

    let state = AppState::new(repositories).with_default_limit(config.server.default_page_limit);
    let listener = tokio::net::TcpListener::bind(config.server.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.http_addr))?;
    tracing::info!(addr = %config.server.http_addr, "Read API listening");

    axum::serve(listener, readmodels_web::router(state))
        .with_graceful_shutdown(stopped(shutdown))
        .await
        .context("HTTP server failed")?;

    consumer.await.context("Consumer task panicked")??;
    tracing::info!("Stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender also means shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
