//! Seed script: generates a few weeks of rides for one rider and pushes
//! them through the ingest pipeline.
//!
//! Run with:
//! ```
//! cargo run -p test-data --bin seed
//! ```
//!
//! Environment:
//! - `DATABASE_URL`: target database (see `rides::config::Config`)
//! - `SEED_STORE=memory` (or `--memory`): ingest into an in-memory store
//! - `SEED_RIDES`: number of rides (default 12)
//! - `SEED_USER_ID`: rider id (default random)
//! - `SEED_OUT_DIR`: also write the generated `.fit` files here

use std::{env, path::PathBuf};

use anyhow::Context as _;
use rand::{SeedableRng, rngs::StdRng};
use rides::{
    config::Config, database::Database, ingest::ActivityService, memory_store::MemoryStore,
    models::RawFilePayload,
};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use test_data::{config::Region, generators::ride_series};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let ride_count: usize = match env::var("SEED_RIDES") {
        Ok(v) => v.parse().context("SEED_RIDES must be a number")?,
        Err(_) => 12,
    };
    let user_id = match env::var("SEED_USER_ID") {
        Ok(v) => v.parse().context("SEED_USER_ID must be a UUID")?,
        Err(_) => Uuid::new_v4(),
    };
    let in_memory = env::args().any(|arg| arg == "--memory")
        || env::var("SEED_STORE").is_ok_and(|v| v.eq_ignore_ascii_case("memory"));

    let mut rng = StdRng::seed_from_u64(12345); // reproducible rides
    let rides = ride_series(ride_count, Region::BOULDER, OffsetDateTime::now_utc(), &mut rng);
    tracing::info!(rides = rides.len(), %user_id, "Generated rides");

    let payloads: Vec<RawFilePayload> = rides
        .iter()
        .map(|ride| RawFilePayload::new(ride.file_name(), ride.to_fit_bytes()))
        .collect();

    if let Some(dir) = env::var_os("SEED_OUT_DIR").map(PathBuf::from) {
        tokio::fs::create_dir_all(&dir).await?;
        for payload in &payloads {
            tokio::fs::write(dir.join(&payload.filename), &payload.data).await?;
        }
        tracing::info!(dir = %dir.display(), "Wrote FIT files");
    }

    let service = if in_memory {
        ActivityService::with_store(MemoryStore::new(), &config)?
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        sqlx::migrate!("../rides/migrations").run(&pool).await?;
        tracing::info!("Connected to database");
        ActivityService::with_store(Database::new(pool), &config)?
    };

    let activities = service.create_activities(user_id, payloads).await?;
    let stats = service.activity_stats(user_id).await?;

    tracing::info!("Seed completed!");
    let summary = json!({
        "user_id": user_id,
        "activities": activities
            .iter()
            .map(|a| json!({
                "id": a.id,
                "name": a.name,
                "ride_type": a.ride_type,
                "distance_km": a.distance,
                "elapsed_time": a.elapsed_time,
                "records": a.records.len(),
            }))
            .collect::<Vec<_>>(),
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
