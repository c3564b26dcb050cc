pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod fit_decoder;
pub mod geo_math;
pub mod handlers;
pub mod ingest;
pub mod memory_store;
pub mod models;
pub mod repository;
pub mod telemetry;

use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::{
    config::Config,
    database::Database,
    handlers::{
        create_activities, get_activity, get_stats, health_check, list_activities,
        update_activity,
    },
    ingest::ActivityService,
};

pub fn create_router(service: ActivityService, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/activities", post(create_activities).get(list_activities))
        .route("/activities/stats", get(get_stats))
        .route("/activities/{id}", get(get_activity).patch(update_activity))
        .layer(Extension(service))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(pool: PgPool, config: Config) -> anyhow::Result<()> {
    let service = ActivityService::with_store(Database::new(pool), &config)?;
    let app = create_router(service, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!("Server running on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
