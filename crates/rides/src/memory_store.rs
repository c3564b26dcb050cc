//! In-process implementation of the repository traits.
//!
//! Used by the unit tests and by `seed --memory`. Mirrors what the Postgres
//! adapter computes in SQL: formatted time columns, newest-first listings and
//! the month/week distance stats.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use time::{Date, Duration, Month, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    errors::AppError,
    geo_math::format_hms,
    models::{
        ActivityListing, ActivityStats, ActivitySummary, ActivityWithRecords, RideType,
        StoredRecord, TelemetryRow,
    },
    repository::{ActivityRepository, RecordRepository},
};

#[derive(Debug, Clone)]
struct ActivityRow {
    id: Uuid,
    user_id: Uuid,
    created_at: OffsetDateTime,
    date_of_activity: OffsetDateTime,
    name: String,
    ride_type: RideType,
    distance: f64,
    avg_speed: Option<f64>,
    max_speed: f64,
    elevation_gain: f64,
    elapsed_time: Duration,
    total_time: Duration,
}

#[derive(Debug, Default)]
struct Tables {
    activities: HashMap<Uuid, ActivityRow>,
    records: HashMap<Uuid, Vec<StoredRecord>>,
    next_record_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn activity_count(&self) -> usize {
        self.tables.read().await.activities.len()
    }

    pub async fn record_count(&self) -> usize {
        self.tables.read().await.records.values().map(Vec::len).sum()
    }

    /// Backdate an activity's upload time, for exercising the period stats.
    pub async fn set_created_at(&self, id: Uuid, created_at: OffsetDateTime) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        let row = tables.activities.get_mut(&id).ok_or(AppError::NotFound)?;
        row.created_at = created_at;
        Ok(())
    }

    fn compose(tables: &Tables, row: &ActivityRow) -> ActivityWithRecords {
        let mut records = tables.records.get(&row.id).cloned().unwrap_or_default();
        records.sort_by_key(|r| r.sequence);

        ActivityWithRecords {
            id: row.id,
            user_id: row.user_id,
            created_at: row.created_at,
            date_of_activity: row.date_of_activity,
            name: row.name.clone(),
            ride_type: row.ride_type,
            distance: row.distance,
            avg_speed: row.avg_speed,
            max_speed: row.max_speed,
            elevation_gain: row.elevation_gain,
            elapsed_time: row.elapsed_time,
            total_time: row.total_time,
            elapsed_time_text: format_hms(row.elapsed_time),
            total_time_text: format_hms(row.total_time),
            records,
        }
    }
}

#[async_trait]
impl ActivityRepository for MemoryStore {
    async fn create(
        &self,
        user_id: Uuid,
        summary: &ActivitySummary,
        name: &str,
        ride_type: RideType,
    ) -> Result<Uuid, AppError> {
        let row = ActivityRow {
            id: Uuid::new_v4(),
            user_id,
            created_at: OffsetDateTime::now_utc(),
            date_of_activity: summary.started_at,
            name: name.to_string(),
            ride_type,
            distance: summary.distance_km,
            avg_speed: summary.average_speed_kmh,
            max_speed: summary.max_speed_kmh,
            elevation_gain: summary.elevation_gain_m,
            // elapsed_time is time spent riding, total_time the wall-clock span
            elapsed_time: summary.total_timer_time,
            total_time: summary.total_elapsed_time,
        };
        let id = row.id;
        self.tables.write().await.activities.insert(id, row);
        Ok(id)
    }

    async fn get_with_records(&self, id: Uuid) -> Result<ActivityWithRecords, AppError> {
        let tables = self.tables.read().await;
        let row = tables.activities.get(&id).ok_or(AppError::NotFound)?;
        Ok(Self::compose(&tables, row))
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        name: Option<&str>,
        ride_type: Option<RideType>,
    ) -> Result<ActivityWithRecords, AppError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .activities
            .get_mut(&id)
            .filter(|row| row.user_id == user_id)
            .ok_or(AppError::NotFound)?;

        if let Some(name) = name {
            row.name = name.to_string();
        }
        if let Some(ride_type) = ride_type {
            row.ride_type = ride_type;
        }

        let row = row.clone();
        Ok(Self::compose(&tables, &row))
    }

    async fn get_summary_stats(&self, user_id: Uuid) -> Result<ActivityStats, AppError> {
        let tables = self.tables.read().await;
        let rides = tables
            .activities
            .values()
            .filter(|row| row.user_id == user_id)
            .map(|row| (row.created_at, row.distance));
        Ok(period_stats(OffsetDateTime::now_utc().date(), rides))
    }

    async fn list_summaries(&self, user_id: Uuid) -> Result<Vec<ActivityListing>, AppError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&ActivityRow> = tables
            .activities
            .values()
            .filter(|row| row.user_id == user_id)
            .collect();
        rows.sort_by(|a, b| {
            b.date_of_activity
                .cmp(&a.date_of_activity)
                .then(b.created_at.cmp(&a.created_at))
        });

        Ok(rows
            .into_iter()
            .map(|row| ActivityListing {
                id: row.id,
                name: row.name.clone(),
                ride_type: row.ride_type,
                distance: row.distance,
                date_of_activity: row.date_of_activity,
                elapsed_time: format_hms(row.elapsed_time),
                total_time: format_hms(row.total_time),
                elapsed_seconds: row.elapsed_time.as_seconds_f64(),
                total_seconds: row.total_time.as_seconds_f64(),
            })
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        tables.records.remove(&id);
        tables.activities.remove(&id).ok_or(AppError::NotFound)?;
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for MemoryStore {
    async fn bulk_insert(&self, rows: &[TelemetryRow]) -> Result<u64, AppError> {
        let mut tables = self.tables.write().await;

        // all-or-nothing, like the single transaction on the Postgres side
        for row in rows {
            match row.activity_id {
                Some(id) if tables.activities.contains_key(&id) => {}
                Some(id) => return Err(AppError::Internal(format!("record references unknown activity {id}"))),
                None => return Err(AppError::Internal("record without activity id".to_string())),
            }
        }

        for row in rows {
            tables.next_record_id += 1;
            let record = StoredRecord {
                id: tables.next_record_id,
                // checked above
                activity_id: row.activity_id.unwrap_or_default(),
                sequence: row.sequence,
                timestamp: row.timestamp,
                latitude: row.latitude,
                longitude: row.longitude,
                altitude: row.altitude,
                heart_rate: row.heart_rate,
                cadence: row.cadence,
                distance: row.distance,
                speed: row.speed,
                temperature: row.temperature,
                gps_accuracy: row.gps_accuracy,
                enhanced_altitude: row.enhanced_altitude,
                bearing: row.bearing,
            };
            tables.records.entry(record.activity_id).or_default().push(record);
        }

        Ok(rows.len() as u64)
    }
}

/// Month and ISO-week distance totals relative to `today`, keyed on upload time.
pub fn period_stats(
    today: Date,
    rides: impl IntoIterator<Item = (OffsetDateTime, f64)>,
) -> ActivityStats {
    let this_month = (today.year(), today.month());
    let last_month = previous_month(this_month);
    let this_week = week_start(today);
    let last_week = this_week - Duration::weeks(1);

    let mut totals = [0.0_f64; 4];
    for (created_at, distance) in rides {
        let date = created_at.to_offset(time::UtcOffset::UTC).date();
        let month = (date.year(), date.month());
        if month == this_month {
            totals[0] += distance;
        } else if month == last_month {
            totals[1] += distance;
        }
        let week = week_start(date);
        if week == this_week {
            totals[2] += distance;
        } else if week == last_week {
            totals[3] += distance;
        }
    }

    ActivityStats {
        total_for_current_month: round2(totals[0]),
        total_for_last_month: round2(totals[1]),
        total_for_current_week: round2(totals[2]),
        total_for_last_week: round2(totals[3]),
        percentage_change_month: percentage_change(totals[0], totals[1]),
        percentage_change_week: percentage_change(totals[2], totals[3]),
    }
}

fn previous_month((year, month): (i32, Month)) -> (i32, Month) {
    match month {
        Month::January => (year - 1, Month::December),
        m => (year, m.previous()),
    }
}

fn week_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
}

fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        0.0
    } else {
        round2((current - previous) / previous * 100.0)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn summary(distance_km: f64, started_at: OffsetDateTime) -> ActivitySummary {
        ActivitySummary {
            distance_km,
            average_speed_kmh: Some(25.0),
            max_speed_kmh: 48.0,
            elevation_gain_m: 310.0,
            total_elapsed_time: Duration::seconds(3_725),
            total_timer_time: Duration::seconds(3_600),
            started_at,
            local_started_at: time::PrimitiveDateTime::new(started_at.date(), started_at.time()),
        }
    }

    fn row(activity_id: Option<Uuid>, sequence: i32) -> TelemetryRow {
        TelemetryRow {
            activity_id,
            sequence,
            timestamp: None,
            position: None,
            latitude: Some(1.0),
            longitude: Some(2.0),
            altitude: None,
            heart_rate: Some(130),
            cadence: None,
            distance: None,
            speed: Some(4000),
            temperature: None,
            gps_accuracy: None,
            enhanced_altitude: None,
            bearing: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let id = store
            .create(user, &summary(42.0, datetime!(2024-06-01 07:30 UTC)), "Morning ride", RideType::Road)
            .await
            .unwrap();

        let rows: Vec<_> = (0..3).rev().map(|i| row(Some(id), i)).collect();
        assert_eq!(store.bulk_insert(&rows).await.unwrap(), 3);

        let view = store.get_with_records(id).await.unwrap();
        assert_eq!(view.user_id, user);
        assert_eq!(view.elapsed_time_text, "01:00:00");
        assert_eq!(view.total_time_text, "01:02:05");
        assert_eq!(view.elevation_gain, 310.0);
        assert_eq!(
            view.records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            [0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_bulk_insert_rejects_unstamped_rows() {
        let store = MemoryStore::new();
        let id = store
            .create(Uuid::new_v4(), &summary(1.0, OffsetDateTime::now_utc()), "x", RideType::Road)
            .await
            .unwrap();

        let result = store.bulk_insert(&[row(Some(id), 0), row(None, 1)]).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_is_owner_scoped() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let id = store
            .create(owner, &summary(1.0, OffsetDateTime::now_utc()), "before", RideType::Road)
            .await
            .unwrap();

        let result = store.update(id, Uuid::new_v4(), Some("after"), None).await;
        assert!(matches!(result, Err(AppError::NotFound)));

        let view = store
            .update(id, owner, None, Some(RideType::Mtb))
            .await
            .unwrap();
        assert_eq!(view.name, "before");
        assert_eq!(view.ride_type, RideType::Mtb);
    }

    #[tokio::test]
    async fn test_delete_removes_records() {
        let store = MemoryStore::new();
        let id = store
            .create(Uuid::new_v4(), &summary(1.0, OffsetDateTime::now_utc()), "x", RideType::Road)
            .await
            .unwrap();
        store.bulk_insert(&[row(Some(id), 0)]).await.unwrap();

        store.delete(id).await.unwrap();
        assert_eq!(store.activity_count().await, 0);
        assert_eq!(store.record_count().await, 0);
        assert!(matches!(store.get_with_records(id).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        for (name, started) in [
            ("old", datetime!(2024-01-01 08:00 UTC)),
            ("new", datetime!(2024-03-01 08:00 UTC)),
            ("mid", datetime!(2024-02-01 08:00 UTC)),
        ] {
            store.create(user, &summary(10.0, started), name, RideType::Road).await.unwrap();
        }
        store
            .create(Uuid::new_v4(), &summary(10.0, OffsetDateTime::now_utc()), "someone else", RideType::Road)
            .await
            .unwrap();

        let listing = store.list_summaries(user).await.unwrap();
        let names: Vec<_> = listing.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["new", "mid", "old"]);
        assert_eq!(listing[0].elapsed_time, "01:00:00");
        assert_eq!(listing[0].total_time, "01:02:05");
        assert_eq!(listing[0].elapsed_seconds, 3600.0);
        assert_eq!(listing[0].total_seconds, 3725.0);
    }

    #[test]
    fn test_period_stats() {
        // a Wednesday
        let today = date!(2024 - 05 - 15);
        let rides = [
            (datetime!(2024-05-13 09:00 UTC), 30.0), // this week, this month
            (datetime!(2024-05-08 09:00 UTC), 20.0), // last week, this month
            (datetime!(2024-04-20 09:00 UTC), 25.0), // last month
            (datetime!(2023-05-15 09:00 UTC), 99.0), // a year ago
        ];

        let stats = period_stats(today, rides);

        assert_eq!(stats.total_for_current_month, 50.0);
        assert_eq!(stats.total_for_last_month, 25.0);
        assert_eq!(stats.total_for_current_week, 30.0);
        assert_eq!(stats.total_for_last_week, 20.0);
        assert_eq!(stats.percentage_change_month, 100.0);
        assert_eq!(stats.percentage_change_week, 50.0);
    }

    #[test]
    fn test_period_stats_without_previous_period() {
        let stats = period_stats(date!(2024 - 01 - 03), [(datetime!(2024-01-02 12:00 UTC), 12.346)]);
        assert_eq!(stats.total_for_current_month, 12.35);
        assert_eq!(stats.total_for_current_week, 12.35);
        assert_eq!(stats.total_for_last_month, 0.0);
        assert_eq!(stats.percentage_change_month, 0.0);
        assert_eq!(stats.percentage_change_week, 0.0);
    }
}
