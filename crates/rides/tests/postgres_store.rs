//! Integration tests for the Postgres repositories.
//!
//! To run these tests, you need a PostgreSQL database with the PostGIS
//! extension available and `DATABASE_URL` set. Migrations are applied by the
//! tests themselves.
//!
//! Run with: `DATABASE_URL=postgres://... cargo nextest run -p rides postgres`
//!
//! Every test works under a fresh user id and removes its rows afterwards, so
//! they can safely run against a development database.

use std::env;

use rides::{
    database::Database,
    errors::AppError,
    models::{ActivitySummary, RideType, TelemetryRow},
    repository::{ActivityRepository, RecordRepository},
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// Get database pool, skipping tests if DATABASE_URL is not set.
async fn get_test_pool() -> Option<PgPool> {
    let database_url = match env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return None;
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping test: Failed to connect to database: {e}");
            return None;
        }
    };

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    Some(pool)
}

async fn cleanup_test_data(pool: &PgPool, user_id: Uuid) {
    // records go with their activity
    let _ = sqlx::query("DELETE FROM activities WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await;
}

fn summary() -> ActivitySummary {
    let started_at = OffsetDateTime::now_utc();
    ActivitySummary {
        distance_km: 42.195,
        average_speed_kmh: Some(27.5),
        max_speed_kmh: 55.1,
        elevation_gain_m: 612.0,
        total_elapsed_time: Duration::seconds(3_725),
        total_timer_time: Duration::seconds(3_600),
        started_at,
        local_started_at: PrimitiveDateTime::new(started_at.date(), started_at.time()),
    }
}

fn rows(activity_id: Uuid, count: usize) -> Vec<TelemetryRow> {
    (0..count)
        .map(|i| TelemetryRow {
            activity_id: Some(activity_id),
            sequence: i as i32,
            timestamp: Some(OffsetDateTime::now_utc()),
            position: Some(geo::Point::new(-105.27 + i as f64 * 1e-5, 40.01)),
            latitude: Some(40.01),
            longitude: Some(-105.27 + i as f64 * 1e-5),
            altitude: Some(1650.0),
            heart_rate: Some(140),
            cadence: Some(88),
            distance: Some(i as f64 * 1.2),
            speed: Some(7_500),
            temperature: Some(21),
            gps_accuracy: Some(3),
            enhanced_altitude: Some(1650.0),
            bearing: (i > 0).then_some(90.0),
        })
        .collect()
}

#[tokio::test]
async fn test_create_insert_and_read_back() {
    let Some(pool) = get_test_pool().await else {
        return;
    };
    let db = Database::new(pool.clone());
    let user_id = Uuid::new_v4();

    let id = db
        .create(user_id, &summary(), "Lunch loop", RideType::Road)
        .await
        .expect("Failed to create activity");
    let inserted = db.bulk_insert(&rows(id, 25)).await.expect("Failed to insert records");
    assert_eq!(inserted, 25);

    let view = db.get_with_records(id).await.expect("Failed to read activity");
    assert_eq!(view.user_id, user_id);
    assert_eq!(view.ride_type, RideType::Road);
    assert_eq!(view.elapsed_time_text, "01:00:00");
    assert_eq!(view.total_time_text, "01:02:05");
    assert_eq!(view.elapsed_time, Duration::seconds(3_600));
    assert_eq!(view.total_time, Duration::seconds(3_725));
    assert_eq!(view.avg_speed, Some(27.5));
    assert_eq!(view.elevation_gain, 612.0);
    assert_eq!(view.records.len(), 25);
    assert!(view.records.windows(2).all(|w| w[0].sequence < w[1].sequence));
    assert_eq!(view.records[0].bearing, None);

    cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
async fn test_bulk_insert_spans_multiple_statements() {
    let Some(pool) = get_test_pool().await else {
        return;
    };
    let db = Database::new(pool.clone());
    let user_id = Uuid::new_v4();

    let id = db
        .create(user_id, &summary(), "Long ride", RideType::Road)
        .await
        .expect("Failed to create activity");
    let inserted = db.bulk_insert(&rows(id, 9_000)).await.expect("Failed to insert records");
    assert_eq!(inserted, 9_000);

    cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
async fn test_update_is_owner_scoped() {
    let Some(pool) = get_test_pool().await else {
        return;
    };
    let db = Database::new(pool.clone());
    let user_id = Uuid::new_v4();
    let id = db
        .create(user_id, &summary(), "Before", RideType::Road)
        .await
        .expect("Failed to create activity");

    let foreign = db.update(id, Uuid::new_v4(), Some("Stolen"), None).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));

    let updated = db
        .update(id, user_id, None, Some(RideType::Gravel))
        .await
        .expect("Failed to update activity");
    assert_eq!(updated.name, "Before");
    assert_eq!(updated.ride_type, RideType::Gravel);

    let renamed = db
        .update(id, user_id, Some("After"), None)
        .await
        .expect("Failed to rename activity");
    assert_eq!(renamed.name, "After");
    assert_eq!(renamed.ride_type, RideType::Gravel);

    cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
async fn test_delete_cascades_to_records() {
    let Some(pool) = get_test_pool().await else {
        return;
    };
    let db = Database::new(pool.clone());
    let user_id = Uuid::new_v4();
    let id = db
        .create(user_id, &summary(), "Doomed", RideType::Road)
        .await
        .expect("Failed to create activity");
    db.bulk_insert(&rows(id, 3)).await.expect("Failed to insert records");

    db.delete(id).await.expect("Failed to delete activity");

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE activity_id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .expect("Failed to count records");
    assert_eq!(remaining, 0);
    assert!(matches!(db.get_with_records(id).await, Err(AppError::NotFound)));
    assert!(matches!(db.delete(id).await, Err(AppError::NotFound)));

    cleanup_test_data(&pool, user_id).await;
}

#[tokio::test]
async fn test_listing_and_stats() {
    let Some(pool) = get_test_pool().await else {
        return;
    };
    let db = Database::new(pool.clone());
    let user_id = Uuid::new_v4();

    let mut older = summary();
    older.started_at -= Duration::days(3);
    db.create(user_id, &older, "Older", RideType::Mtb)
        .await
        .expect("Failed to create activity");
    db.create(user_id, &summary(), "Newer", RideType::Tt)
        .await
        .expect("Failed to create activity");

    let listing = db.list_summaries(user_id).await.expect("Failed to list activities");
    let names: Vec<_> = listing.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Newer", "Older"]);
    assert_eq!(listing[0].elapsed_time, "01:00:00");
    assert_eq!(listing[0].total_seconds, 3_725.0);

    let stats = db.get_summary_stats(user_id).await.expect("Failed to get stats");
    assert_eq!(stats.total_for_current_month, 84.39);
    assert_eq!(stats.total_for_current_week, 84.39);
    assert_eq!(stats.total_for_last_month, 0.0);
    assert_eq!(stats.percentage_change_month, 0.0);

    let empty = db.get_summary_stats(Uuid::new_v4()).await.expect("Failed to get stats");
    assert_eq!(empty.total_for_current_month, 0.0);

    cleanup_test_data(&pool, user_id).await;
}
