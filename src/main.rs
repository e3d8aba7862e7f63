use axum::extract::DefaultBodyLimit;
use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pets_analysis::{
    app_state::AppState,
    config::AppConfig,
    db::{
        self,
        queries::{PgAnalysisStore, PgPetStore},
    },
    routes::{self, metrics::MetricsState},
    services::{
        authorization::RoleAuthorization,
        coordinator::AnalysisLifecycleCoordinator,
        dispatcher::OutboundDispatcher,
        queue::{QueueKeys, RedisQueue},
        storage::R2Client,
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing pets-analysis server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("analysis_requests_total", "Analyses created");
    metrics::describe_counter!(
        "analysis_dispatch_failed",
        "Analyses persisted whose job could not be published"
    );
    metrics::describe_counter!(
        "analysis_image_upload_failed",
        "Analyses created without an image because the upload failed"
    );
    metrics::describe_gauge!(
        "analysis_response_queue_depth",
        "Result messages waiting to be reconciled"
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing R2 storage client");
    let images = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
        &config.r2_public_url,
    )
    .expect("Failed to initialize R2 client");

    tracing::info!("Connecting to Redis job queue");
    let queue = Arc::new(
        RedisQueue::new(
            &config.redis_url,
            QueueKeys::new(&config.analysis_jobs_queue, &config.analysis_responses_queue),
        )
        .expect("Failed to initialize job queue"),
    );

    let coordinator = AnalysisLifecycleCoordinator::new(
        Arc::new(PgAnalysisStore::new(db_pool.clone())),
        Arc::new(PgPetStore::new(db_pool.clone())),
        Arc::new(images),
        Arc::new(RoleAuthorization::new(config.admin_role.clone())),
        OutboundDispatcher::new(queue.clone()),
    );

    let state = AppState::new(db_pool, queue.clone(), coordinator);
    let metrics_state = MetricsState {
        handle: prometheus_handle,
        queue,
    };

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/pets/{pet_id}/analyses",
            post(routes::analysis::create_analysis).get(routes::analysis::list_pet_analyses),
        )
        .route(
            "/api/v1/analyses/{analysis_id}",
            get(routes::analysis::get_analysis),
        )
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
