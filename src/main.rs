use finalization_engine::api::{create_router, AppState};
use finalization_engine::cache::FinalizedOrderCache;
use finalization_engine::config::Settings;
use finalization_engine::events::{EventProducer, ProducerConfig};
use finalization_engine::gateway::{PaystackClient, PaystackConfig, WebhookVerifier};
use finalization_engine::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use finalization_engine::repositories::PostgresOrderStore;
use finalization_engine::services::{PipelineBuilder, ReconciliationJob};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_logging(&LogConfig::from(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;

    let store = PostgresOrderStore::new(pool.clone());
    store.migrate().await?;
    info!("Migrations applied successfully");

    let cache = if settings.cache.enabled {
        match redis::Client::open(settings.redis.url.as_str()) {
            Ok(client) => Some(Arc::new(FinalizedOrderCache::new(client, settings.cache.clone()))),
            Err(e) => {
                warn!("Redis unavailable, finalized-order cache disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    let producer = if settings.kafka.enabled {
        let mut producer = EventProducer::new(ProducerConfig::from(&settings.kafka));
        match producer.connect().await {
            Ok(()) => Some(Arc::new(producer)),
            Err(e) => {
                warn!("Kafka unavailable, domain events disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    if settings.gateway.effective_webhook_secret().is_empty() {
        warn!("No webhook secret configured; every webhook delivery will be rejected");
    }

    let gateway = Arc::new(PaystackClient::new(PaystackConfig {
        base_url: settings.gateway.base_url.clone(),
        secret_key: settings.gateway.secret_key.clone(),
    }));
    let verifier = WebhookVerifier::new(settings.gateway.effective_webhook_secret());

    let pipeline = PipelineBuilder::new(Arc::new(store), gateway, verifier, settings.gateway.timeout())
        .finalization_settings(settings.finalization.clone())
        .auditor_settings(settings.auditor.clone())
        .cache(cache.clone())
        .producer(producer.clone())
        .build();

    if settings.auditor.enabled {
        ReconciliationJob::new(pipeline.auditor.clone(), settings.auditor.interval_secs).start();
        info!(
            interval_secs = settings.auditor.interval_secs,
            "Reconciliation job started"
        );
    }

    let health_checker = Arc::new(
        HealthChecker::new(pool.clone())
            .with_cache(cache)
            .with_producer(producer)
            .with_auditor(pipeline.auditor.clone()),
    );
    let state = AppState::new(&pipeline)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
