use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

use crate::geo_math::speed_to_kmh;

/// An uploaded activity file, exactly as the transport received it.
#[derive(Debug, Clone)]
pub struct RawFilePayload {
    pub filename: String,
    /// Informational; only logged. Files are always decoded as FIT.
    pub content_type: Option<String>,
    pub data: Bytes,
    /// Informational; only logged.
    pub last_modified: Option<OffsetDateTime>,
}

impl RawFilePayload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
            last_modified: None,
        }
    }
}

/// One telemetry point as emitted by the decoder.
///
/// Coordinates are degrees, altitudes and distance are metres, speed is the
/// raw device unit (mm/s).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodedSample {
    pub timestamp: Option<OffsetDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<u8>,
    pub cadence: Option<u8>,
    /// Cumulative distance reported by the device, metres.
    pub distance: Option<f64>,
    pub speed: Option<u32>,
    pub temperature: Option<i8>,
    pub gps_accuracy: Option<u8>,
    pub enhanced_altitude: Option<f64>,
}

impl DecodedSample {
    /// Both coordinates, if both are set.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    pub fn has_no_position(&self) -> bool {
        self.latitude.is_none() && self.longitude.is_none()
    }
}

/// Persistence-ready projection of a kept sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRow {
    /// Unset until the owning activity row exists.
    pub activity_id: Option<Uuid>,
    /// Position of the sample among the kept samples of its file.
    pub sequence: i32,
    pub timestamp: Option<OffsetDateTime>,
    /// x = longitude, y = latitude; only when both are known.
    pub position: Option<geo::Point<f64>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<i16>,
    pub cadence: Option<i16>,
    pub distance: Option<f64>,
    pub speed: Option<i64>,
    pub temperature: Option<i16>,
    pub gps_accuracy: Option<i16>,
    pub enhanced_altitude: Option<f64>,
    /// Degrees from the previous kept sample.
    pub bearing: Option<f64>,
}

impl TelemetryRow {
    pub fn from_sample(sequence: i32, sample: &DecodedSample) -> Self {
        Self {
            activity_id: None,
            sequence,
            timestamp: sample.timestamp,
            position: sample
                .position()
                .map(|(lat, lon)| geo::Point::new(lon, lat)),
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude: sample.altitude,
            heart_rate: sample.heart_rate.map(i16::from),
            cadence: sample.cadence.map(i16::from),
            distance: sample.distance,
            speed: sample.speed.map(i64::from),
            temperature: sample.temperature.map(i16::from),
            gps_accuracy: sample.gps_accuracy.map(i16::from),
            enhanced_altitude: sample.enhanced_altitude,
            bearing: None,
        }
    }
}

/// Aggregate output of one file's aggregation pass, combined with the
/// device session fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub distance_km: f64,
    /// `None` when no speed sample contributed.
    pub average_speed_kmh: Option<f64>,
    pub max_speed_kmh: f64,
    pub elevation_gain_m: f64,
    pub total_elapsed_time: Duration,
    pub total_timer_time: Duration,
    pub started_at: OffsetDateTime,
    /// Wall-clock start time at the recording location.
    pub local_started_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ride_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RideType {
    #[default]
    Road,
    Gravel,
    Mtb,
    Tt,
}

impl RideType {
    pub const ALL: [RideType; 4] = [RideType::Road, RideType::Gravel, RideType::Mtb, RideType::Tt];

    pub fn as_str(self) -> &'static str {
        match self {
            RideType::Road => "road",
            RideType::Gravel => "gravel",
            RideType::Mtb => "mtb",
            RideType::Tt => "tt",
        }
    }
}

impl fmt::Display for RideType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown ride type: {0:?} (expected one of road, gravel, mtb, tt)")]
pub struct UnknownRideType(pub String);

impl FromStr for RideType {
    type Err = UnknownRideType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        RideType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == normalized)
            .ok_or_else(|| UnknownRideType(s.to_string()))
    }
}

const ACTIVITY_NAMES: [&str; 24] = [
    "Midnight Pedal Mystery - For the night owls turning the pedals under the stars.",
    "The 1 AM Luna-See Ride - When the moon is your only street light.",
    "2 AM Gear Ghosts - For those who cycle with the spirits of the night.",
    "3 AM Crankset Crickets - Pedaling quietly alongside the sound of crickets.",
    "4 AM Wheel Whispers - When the world is silent, but your bike whispers through the streets.",
    "5 AM Dawn Drafters - Catching the first light with the front wheel.",
    "6 AM Sunrise Sprints - Racing the sun to the horizon.",
    "7 AM Breakfast Breakaway - Fast enough to earn your morning pancakes.",
    "8 AM Commuter Cup - Dodging traffic and racing pedestrians.",
    "9 AM Java Jolt Journey - Fueled by the first coffee of the day.",
    "10 AM Tailwind Tours - When the breeze decides to push you along.",
    "11 AM Brunch Bunch Buzz - Social spin before a mid-morning feast.",
    "Noon Nomad Navigate - Exploring unknown paths when the sun is high.",
    "1 PM Siesta Sprint - Dodging the urge to nap under a shady tree.",
    "2 PM Sweat & Swear Hour - For the heat that tests your will.",
    "3 PM Thirst-Quencher Quest - On a mission to find the coldest drink in town.",
    "4 PM Shadow Chasers - Racing your own shadow as the sun starts to dip.",
    "5 PM Rush Hour Rendezvous - Weaving through traffic with skill and a bit of luck.",
    "6 PM Sunset Serenade - A leisurely ride under the colors of the evening sky.",
    "7 PM Neon Night Riders - When your bike lights are the main show.",
    "8 PM Dine & Dash - Cycling from one food stop to another.",
    "9 PM Starlight Sprint - Racing under the canopy of the night sky.",
    "10 PM Moonlit Mountain Climbers - Taking on the hills with only the moon for guidance.",
    "11 PM Pajama Pedalers - For those too excited to sleep, opting for a ride in their PJs.",
];

pub const INVALID_HOUR_NAME: &str = "Invalid hour";

/// Activity name for the local start hour of a ride.
pub fn activity_name_for_hour(hour: u8) -> &'static str {
    ACTIVITY_NAMES
        .get(usize::from(hour))
        .copied()
        .unwrap_or(INVALID_HOUR_NAME)
}

/// Stored telemetry row as read back from the persistence boundary.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub activity_id: Uuid,
    pub sequence: i32,
    pub timestamp: Option<OffsetDateTime>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<i16>,
    pub cadence: Option<i16>,
    pub distance: Option<f64>,
    pub speed: Option<i64>,
    pub temperature: Option<i16>,
    pub gps_accuracy: Option<i16>,
    pub enhanced_altitude: Option<f64>,
    pub bearing: Option<f64>,
}

/// Composed activity + records view, including the formatted time columns
/// computed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityWithRecords {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: OffsetDateTime,
    pub date_of_activity: OffsetDateTime,
    pub name: String,
    pub ride_type: RideType,
    pub distance: f64,
    pub avg_speed: Option<f64>,
    pub max_speed: f64,
    pub elevation_gain: f64,
    pub elapsed_time: Duration,
    pub total_time: Duration,
    pub elapsed_time_text: String,
    pub total_time_text: String,
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: i64,
    pub coordinates: Option<Point>,
    /// km/h
    pub speed: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    pub distance: Option<f64>,
    pub altitude: Option<f64>,
    pub heart_rate: Option<i16>,
    pub cadence: Option<i16>,
    pub bearing: Option<f64>,
}

impl From<&StoredRecord> for Record {
    fn from(record: &StoredRecord) -> Self {
        Self {
            id: record.id,
            coordinates: record
                .longitude
                .zip(record.latitude)
                .map(|(x, y)| Point { x, y }),
            speed: record
                .speed
                .and_then(|s| u32::try_from(s).ok())
                .map(speed_to_kmh),
            timestamp: record.timestamp,
            distance: record.distance,
            altitude: record.altitude,
            heart_rate: record.heart_rate,
            cadence: record.cadence,
            bearing: record.bearing,
        }
    }
}

/// Activity as returned to callers of the ingestion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub date_of_activity: OffsetDateTime,
    pub name: String,
    pub ride_type: RideType,
    /// km
    pub distance: f64,
    /// km/h
    pub avg_speed: Option<f64>,
    pub max_speed: f64,
    /// metres
    pub elevation_gain: f64,
    pub elapsed_time: String,
    pub total_time: String,
    #[serde(skip)]
    pub elapsed_duration: Duration,
    #[serde(skip)]
    pub total_duration: Duration,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub avg_cadence: Option<f64>,
    pub max_cadence: Option<f64>,
    pub records: Vec<Record>,
}

impl From<ActivityWithRecords> for Activity {
    fn from(view: ActivityWithRecords) -> Self {
        let heart_rate = ValueStats::collect(view.records.iter().map(|r| r.heart_rate));
        let cadence = ValueStats::collect(view.records.iter().map(|r| r.cadence));

        Self {
            id: view.id,
            user_id: view.user_id,
            created_at: view.created_at,
            date_of_activity: view.date_of_activity,
            name: view.name,
            ride_type: view.ride_type,
            distance: view.distance,
            avg_speed: view.avg_speed,
            max_speed: view.max_speed,
            elevation_gain: view.elevation_gain,
            elapsed_time: view.elapsed_time_text,
            total_time: view.total_time_text,
            elapsed_duration: view.elapsed_time,
            total_duration: view.total_time,
            avg_heart_rate: heart_rate.average(),
            max_heart_rate: heart_rate.max,
            avg_cadence: cadence.average(),
            max_cadence: cadence.max,
            records: view.records.iter().map(Record::from).collect(),
        }
    }
}

/// Running sum/count/max over the rows that carry a value.
#[derive(Debug, Default)]
struct ValueStats {
    sum: f64,
    count: usize,
    max: Option<f64>,
}

impl ValueStats {
    fn collect(values: impl Iterator<Item = Option<i16>>) -> Self {
        let mut stats = Self::default();
        for value in values.flatten() {
            let value = f64::from(value);
            stats.sum += value;
            stats.count += 1;
            if stats.max.is_none_or(|max| value > max) {
                stats.max = Some(value);
            }
        }
        stats
    }

    fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// One entry of a user's activity list.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ActivityListing {
    pub id: Uuid,
    pub name: String,
    pub ride_type: RideType,
    pub distance: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub date_of_activity: OffsetDateTime,
    pub elapsed_time: String,
    pub total_time: String,
    pub elapsed_seconds: f64,
    pub total_seconds: f64,
}

/// Distance totals for a user, km.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct ActivityStats {
    pub total_for_current_month: f64,
    pub total_for_last_month: f64,
    pub total_for_current_week: f64,
    pub total_for_last_week: f64,
    pub percentage_change_month: f64,
    pub percentage_change_week: f64,
}
