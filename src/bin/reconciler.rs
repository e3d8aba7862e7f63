use pets_analysis::{
    config::AppConfig,
    db::{
        self,
        queries::{PgAnalysisStore, PgPetStore},
    },
    services::{
        consumer::ResultConsumer,
        queue::{QueueKeys, RedisQueue},
        reconciler::InboundReconciler,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting analysis result reconciler");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr = config
        .metrics_socket_addr()
        .expect("METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus metrics exporter");
    tracing::info!(%metrics_addr, "Serving Prometheus metrics");

    metrics::describe_counter!(
        "analysis_results_total",
        "Result messages reconciled, by outcome"
    );
    metrics::describe_counter!(
        "analysis_results_duplicate",
        "Results for analyses that were already finished"
    );
    metrics::describe_counter!(
        "analysis_results_rejected",
        "Result messages moved to the dead-letter list"
    );

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    let queue = RedisQueue::new(
        &config.redis_url,
        QueueKeys::new(&config.analysis_jobs_queue, &config.analysis_responses_queue),
    )
    .expect("Failed to initialize result queue");

    let reconciler = InboundReconciler::new(
        Arc::new(PgAnalysisStore::new(db_pool.clone())),
        Arc::new(PgPetStore::new(db_pool)),
    );

    let consumer = ResultConsumer::new(
        Arc::new(queue),
        Arc::new(reconciler),
        config.reconciler_concurrency,
        config.poll_interval(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing in-flight results");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!(
        queue = %config.analysis_responses_queue,
        concurrency = config.reconciler_concurrency,
        "Reconciler ready, consuming results"
    );

    consumer.run(shutdown_rx).await;
}
