use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{
        ActivityListing, ActivityStats, ActivitySummary, ActivityWithRecords, RideType,
        StoredRecord, TelemetryRow,
    },
    repository::{ActivityRepository, RecordRepository},
};

/// Postgres caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;
const RECORD_COLUMNS: usize = 15;
const RECORDS_PER_STATEMENT: usize = MAX_BIND_PARAMS / RECORD_COLUMNS;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn get_records(&self, activity_id: Uuid) -> Result<Vec<StoredRecord>, AppError> {
        let records = sqlx::query_as(
            r#"
            SELECT id, activity_id, sequence, recorded_at AS timestamp,
                   latitude, longitude, altitude, heart_rate, cadence,
                   distance, speed, temperature, gps_accuracy,
                   enhanced_altitude, bearing
            FROM records
            WHERE activity_id = $1
            ORDER BY sequence
            "#,
        )
        .bind(activity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    created_at: OffsetDateTime,
    date_of_activity: OffsetDateTime,
    activity_name: String,
    ride_type: RideType,
    distance: f64,
    avg_speed: Option<f64>,
    max_speed: f64,
    elevation_gain: f64,
    elapsed_time: f64,
    total_time: f64,
    elapsed_time_char: String,
    total_time_char: String,
}

impl ActivityRow {
    fn with_records(self, records: Vec<StoredRecord>) -> ActivityWithRecords {
        ActivityWithRecords {
            id: self.id,
            user_id: self.user_id,
            created_at: self.created_at,
            date_of_activity: self.date_of_activity,
            name: self.activity_name,
            ride_type: self.ride_type,
            distance: self.distance,
            avg_speed: self.avg_speed,
            max_speed: self.max_speed,
            elevation_gain: self.elevation_gain,
            elapsed_time: Duration::seconds_f64(self.elapsed_time),
            total_time: Duration::seconds_f64(self.total_time),
            elapsed_time_text: self.elapsed_time_char,
            total_time_text: self.total_time_char,
            records,
        }
    }
}

#[async_trait]
impl ActivityRepository for Database {
    async fn create(
        &self,
        user_id: Uuid,
        summary: &ActivitySummary,
        name: &str,
        ride_type: RideType,
    ) -> Result<Uuid, AppError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO activities (id, user_id, date_of_activity, local_started_at,
                                    activity_name, ride_type, distance, avg_speed,
                                    max_speed, elevation_gain, elapsed_time, total_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(summary.started_at)
        .bind(summary.local_started_at)
        .bind(name)
        .bind(ride_type)
        .bind(summary.distance_km)
        .bind(summary.average_speed_kmh)
        .bind(summary.max_speed_kmh)
        .bind(summary.elevation_gain_m)
        // elapsed_time is time spent riding, total_time the wall-clock span
        .bind(summary.total_timer_time.as_seconds_f64())
        .bind(summary.total_elapsed_time.as_seconds_f64())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_with_records(&self, id: Uuid) -> Result<ActivityWithRecords, AppError> {
        let row: ActivityRow = sqlx::query_as(
            r#"
            SELECT id, user_id, created_at, date_of_activity, activity_name, ride_type,
                   distance, avg_speed, max_speed, elevation_gain,
                   elapsed_time, total_time,
                   TO_CHAR(elapsed_time * INTERVAL '1 second', 'HH24:MI:SS') AS elapsed_time_char,
                   TO_CHAR(total_time * INTERVAL '1 second', 'HH24:MI:SS') AS total_time_char
            FROM activities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)?;

        let records = self.get_records(id).await?;
        Ok(row.with_records(records))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        name: Option<&str>,
        ride_type: Option<RideType>,
    ) -> Result<ActivityWithRecords, AppError> {
        let updated: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE activities
            SET activity_name = COALESCE($3, activity_name),
                ride_type = COALESCE($4, ride_type)
            WHERE id = $1 AND user_id = $2
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(ride_type)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.get_with_records(id).await,
            None => Err(AppError::NotFound),
        }
    }

    async fn get_summary_stats(&self, user_id: Uuid) -> Result<ActivityStats, AppError> {
        let stats = sqlx::query_as(
            r#"
            WITH periods AS (
                SELECT
                    DATE_TRUNC('month', NOW() AT TIME ZONE 'UTC') AS this_month,
                    DATE_TRUNC('month', NOW() AT TIME ZONE 'UTC') - INTERVAL '1 month' AS last_month,
                    DATE_TRUNC('week', NOW() AT TIME ZONE 'UTC') AS this_week,
                    DATE_TRUNC('week', NOW() AT TIME ZONE 'UTC') - INTERVAL '1 week' AS last_week
            ),
            totals AS (
                SELECT
                    COALESCE(SUM(a.distance) FILTER (
                        WHERE DATE_TRUNC('month', a.created_at AT TIME ZONE 'UTC') = p.this_month), 0) AS current_month,
                    COALESCE(SUM(a.distance) FILTER (
                        WHERE DATE_TRUNC('month', a.created_at AT TIME ZONE 'UTC') = p.last_month), 0) AS last_month,
                    COALESCE(SUM(a.distance) FILTER (
                        WHERE DATE_TRUNC('week', a.created_at AT TIME ZONE 'UTC') = p.this_week), 0) AS current_week,
                    COALESCE(SUM(a.distance) FILTER (
                        WHERE DATE_TRUNC('week', a.created_at AT TIME ZONE 'UTC') = p.last_week), 0) AS last_week
                FROM periods p
                LEFT JOIN activities a ON a.user_id = $1
            )
            SELECT
                ROUND(current_month::numeric, 2)::float8 AS total_for_current_month,
                ROUND(last_month::numeric, 2)::float8 AS total_for_last_month,
                ROUND(current_week::numeric, 2)::float8 AS total_for_current_week,
                ROUND(last_week::numeric, 2)::float8 AS total_for_last_week,
                ROUND(COALESCE((current_month - last_month) / NULLIF(last_month, 0) * 100, 0)::numeric, 2)::float8
                    AS percentage_change_month,
                ROUND(COALESCE((current_week - last_week) / NULLIF(last_week, 0) * 100, 0)::numeric, 2)::float8
                    AS percentage_change_week
            FROM totals
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn list_summaries(&self, user_id: Uuid) -> Result<Vec<ActivityListing>, AppError> {
        let listings = sqlx::query_as(
            r#"
            SELECT id, activity_name AS name, ride_type, distance, date_of_activity,
                   TO_CHAR(elapsed_time * INTERVAL '1 second', 'HH24:MI:SS') AS elapsed_time,
                   TO_CHAR(total_time * INTERVAL '1 second', 'HH24:MI:SS') AS total_time,
                   elapsed_time AS elapsed_seconds,
                   total_time AS total_seconds
            FROM activities
            WHERE user_id = $1
            ORDER BY date_of_activity DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(listings)
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for Database {
    async fn bulk_insert(&self, rows: &[TelemetryRow]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(RECORDS_PER_STATEMENT) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO records (activity_id, sequence, recorded_at, position, latitude, \
                 longitude, altitude, heart_rate, cadence, distance, speed, temperature, \
                 gps_accuracy, enhanced_altitude, bearing) ",
            );
            qb.push_values(chunk, |mut b, row| {
                let position = row.position.map(|p| format!("POINT({} {})", p.x(), p.y()));
                b.push_bind(row.activity_id)
                    .push_bind(row.sequence)
                    .push_bind(row.timestamp)
                    .push("ST_GeogFromText(")
                    .push_bind_unseparated(position)
                    .push_unseparated(")")
                    .push_bind(row.latitude)
                    .push_bind(row.longitude)
                    .push_bind(row.altitude)
                    .push_bind(row.heart_rate)
                    .push_bind(row.cadence)
                    .push_bind(row.distance)
                    .push_bind(row.speed)
                    .push_bind(row.temperature)
                    .push_bind(row.gps_accuracy)
                    .push_bind(row.enhanced_altitude)
                    .push_bind(row.bearing);
            });

            let result = qb.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
            debug!(rows = chunk.len(), "inserted record chunk");
        }

        tx.commit().await?;
        Ok(inserted)
    }
}
