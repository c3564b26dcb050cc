//! FIT activity file decoding.
//!
//! Turns raw FIT bytes into the ordered sample sequence and the session
//! fields the aggregator needs. Positions leave this module in degrees;
//! nothing downstream handles semicircles.

use fitparser::{FitDataField, FitDataRecord, Value, profile::field_types::MesgNum};
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::{geo_math::semicircles_to_degrees, models::DecodedSample};

/// Seconds between the unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
const FIT_EPOCH_OFFSET: i64 = 631_065_600;

/// Device-reported session fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub total_elapsed_time: Duration,
    pub total_timer_time: Duration,
    pub started_at: OffsetDateTime,
    /// Wall-clock start time at the recording location.
    pub local_started_at: PrimitiveDateTime,
}

/// Result of decoding one activity file.
#[derive(Debug, Clone)]
pub struct DecodedActivity {
    pub samples: Vec<DecodedSample>,
    pub session: SessionSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to parse FIT file: {0}")]
    Malformed(String),
    #[error("FIT file contains no activity session")]
    NoSession,
    #[error("FIT file has no start time")]
    MissingStartTime,
}

/// Binary telemetry decoder.
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedActivity, DecodeError>;
}

/// Returns true if the bytes carry the `.FIT` signature of a FIT file header.
pub fn has_fit_signature(bytes: &[u8]) -> bool {
    bytes.get(8..12) == Some(b".FIT".as_slice())
}

/// [`Decoder`] for Garmin FIT files, backed by `fitparser`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitDecoder;

impl Decoder for FitDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedActivity, DecodeError> {
        let messages =
            fitparser::from_bytes(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        decode_messages(&messages)
    }
}

fn decode_messages(messages: &[FitDataRecord]) -> Result<DecodedActivity, DecodeError> {
    let mut samples = Vec::new();
    let mut session: Option<SessionFields> = None;
    let mut activity = ActivityFields::default();

    for message in messages {
        match message.kind() {
            MesgNum::Record => samples.push(decode_record(message.fields())),
            // Multi-sport files carry one session per leg; the first one
            // describes the start of the recording.
            MesgNum::Session if session.is_none() => {
                session = Some(SessionFields::from_fields(message.fields()));
            }
            MesgNum::Activity => activity = ActivityFields::from_fields(message.fields()),
            _ => {}
        }
    }

    let session = session.ok_or(DecodeError::NoSession)?;

    let started_at = session
        .start_time
        .or_else(|| samples.iter().find_map(|s| s.timestamp))
        .or(activity.timestamp)
        .ok_or(DecodeError::MissingStartTime)?;

    let local_started_at = activity
        .local_timestamp
        .unwrap_or_else(|| PrimitiveDateTime::new(started_at.date(), started_at.time()));

    Ok(DecodedActivity {
        samples,
        session: SessionSummary {
            total_elapsed_time: session.total_elapsed_time,
            total_timer_time: session.total_timer_time,
            started_at,
            local_started_at,
        },
    })
}

fn decode_record(fields: &[FitDataField]) -> DecodedSample {
    let mut sample = DecodedSample::default();

    for field in fields {
        let value = field.value();
        match field.name() {
            "timestamp" => sample.timestamp = extract_fit_timestamp(value),
            "position_lat" => sample.latitude = extract_fit_position(value),
            "position_long" => sample.longitude = extract_fit_position(value),
            "altitude" => sample.altitude = extract_fit_f64(value),
            "enhanced_altitude" => sample.enhanced_altitude = extract_fit_f64(value),
            "heart_rate" => sample.heart_rate = extract_fit_i64(value).and_then(narrow),
            "cadence" => sample.cadence = extract_fit_i64(value).and_then(narrow),
            "distance" => sample.distance = extract_fit_f64(value),
            "speed" => sample.speed = extract_fit_f64(value).and_then(mps_to_raw_speed),
            "enhanced_speed" if sample.speed.is_none() => {
                sample.speed = extract_fit_f64(value).and_then(mps_to_raw_speed);
            }
            "temperature" => sample.temperature = extract_fit_i64(value).and_then(narrow),
            "gps_accuracy" => sample.gps_accuracy = extract_fit_i64(value).and_then(narrow),
            _ => {}
        }
    }

    sample
}

#[derive(Debug, Default)]
struct SessionFields {
    total_elapsed_time: Duration,
    total_timer_time: Duration,
    start_time: Option<OffsetDateTime>,
}

impl SessionFields {
    fn from_fields(fields: &[FitDataField]) -> Self {
        let mut session = Self::default();
        for field in fields {
            match field.name() {
                "total_elapsed_time" => {
                    session.total_elapsed_time = extract_fit_duration(field.value());
                }
                "total_timer_time" => {
                    session.total_timer_time = extract_fit_duration(field.value());
                }
                "start_time" => session.start_time = extract_fit_timestamp(field.value()),
                _ => {}
            }
        }
        session
    }
}

#[derive(Debug, Default)]
struct ActivityFields {
    timestamp: Option<OffsetDateTime>,
    local_timestamp: Option<PrimitiveDateTime>,
}

impl ActivityFields {
    fn from_fields(fields: &[FitDataField]) -> Self {
        let mut activity = Self::default();
        for field in fields {
            match field.name() {
                "timestamp" => activity.timestamp = extract_fit_timestamp(field.value()),
                "local_timestamp" => {
                    activity.local_timestamp = extract_fit_local_timestamp(field.value());
                }
                _ => {}
            }
        }
        activity
    }
}

/// Convert a decoded timestamp to `OffsetDateTime` in UTC.
fn chrono_to_offset_datetime<Tz: chrono::TimeZone>(
    dt: &chrono::DateTime<Tz>,
) -> Option<OffsetDateTime> {
    let ts = dt.timestamp();
    let ns = dt.timestamp_subsec_nanos();

    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .map(|odt| odt.replace_nanosecond(ns).unwrap_or(odt))
}

fn extract_fit_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::Timestamp(t) => chrono_to_offset_datetime(t),
        Value::UInt32(v) => OffsetDateTime::from_unix_timestamp(i64::from(*v) + FIT_EPOCH_OFFSET).ok(),
        _ => None,
    }
}

/// Local timestamps are seconds since the FIT epoch in the device's wall
/// clock. Read back through UTC they give the local date and hour directly.
fn extract_fit_local_timestamp(value: &Value) -> Option<PrimitiveDateTime> {
    let odt = match value {
        Value::Timestamp(t) => {
            let naive = t.naive_utc();
            OffsetDateTime::from_unix_timestamp(naive.and_utc().timestamp()).ok()?
        }
        Value::UInt32(v) => {
            OffsetDateTime::from_unix_timestamp(i64::from(*v) + FIT_EPOCH_OFFSET).ok()?
        }
        _ => return None,
    };
    Some(PrimitiveDateTime::new(odt.date(), odt.time()))
}

fn extract_fit_position(value: &Value) -> Option<f64> {
    match value {
        // i32::MAX is the FIT "invalid" marker for sint32
        Value::SInt32(v) if *v != i32::MAX => Some(semicircles_to_degrees(*v)),
        Value::Float64(v) if v.is_finite() => Some(*v),
        _ => None,
    }
}

fn extract_fit_duration(value: &Value) -> Duration {
    extract_fit_f64(value)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::seconds_f64)
        .unwrap_or(Duration::ZERO)
}

/// FIT speed is decoded as m/s; samples carry the raw mm/s unit.
fn mps_to_raw_speed(mps: f64) -> Option<u32> {
    let raw = (mps * 1000.0).round();
    (raw.is_finite() && raw >= 0.0 && raw <= f64::from(u32::MAX)).then_some(raw as u32)
}

fn narrow<T: TryFrom<i64>>(v: i64) -> Option<T> {
    T::try_from(v).ok()
}

/// Extract i64 from the integer FIT value types
fn extract_fit_i64(value: &Value) -> Option<i64> {
    match value {
        Value::SInt8(v) => Some(i64::from(*v)),
        Value::UInt8(v) => Some(i64::from(*v)),
        Value::SInt16(v) => Some(i64::from(*v)),
        Value::UInt16(v) => Some(i64::from(*v)),
        Value::SInt32(v) => Some(i64::from(*v)),
        Value::UInt32(v) => Some(i64::from(*v)),
        Value::Float64(v) if v.is_finite() => Some(v.round() as i64),
        _ => None,
    }
}

/// Extract f64 from various FIT value types
fn extract_fit_f64(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Float32(v) => Some(f64::from(*v)),
        Value::Float64(v) => Some(*v),
        Value::SInt8(v) => Some(f64::from(*v)),
        Value::UInt8(v) => Some(f64::from(*v)),
        Value::SInt16(v) => Some(f64::from(*v)),
        Value::UInt16(v) => Some(f64::from(*v)),
        Value::SInt32(v) => Some(f64::from(*v)),
        Value::UInt32(v) => Some(f64::from(*v)),
        _ => None,
    };
    v.filter(|v| v.is_finite())
}
