//! FIT activity file encoder.
//!
//! Writes the subset of the FIT protocol a bike computer produces for a
//! single-session ride: `file_id`, one `record` per sample, an optional
//! `session` and a closing `activity` message. Output is little endian with
//! no compressed timestamps, and both the header CRC and the trailing file
//! CRC are filled in.
//!
//! Only the fields a sample actually carries are written. Each distinct set
//! of present fields gets its own local definition, so a GPS dropout is a
//! record without position fields rather than one holding invalid markers.

use rides::models::DecodedSample;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Seconds between the unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
pub const FIT_EPOCH_OFFSET: i64 = 631_065_600;

const HEADER_SIZE: u8 = 14;
const PROTOCOL_VERSION: u8 = 0x20;
const PROFILE_VERSION: u16 = 2132;

const DEFINITION_FLAG: u8 = 0x40;

const MESG_FILE_ID: u16 = 0;
const MESG_SESSION: u16 = 18;
const MESG_RECORD: u16 = 20;
const MESG_ACTIVITY: u16 = 34;

const LOCAL_FILE_ID: u8 = 0;
const LOCAL_SESSION: u8 = 1;
const LOCAL_ACTIVITY: u8 = 2;
/// Local message types 3..=15 are handed out to record layouts.
const FIRST_RECORD_SLOT: u8 = 3;
const RECORD_SLOTS: usize = 13;

const FILE_TYPE_ACTIVITY: i64 = 4;
const MANUFACTURER_DEVELOPMENT: i64 = 255;
const SPORT_CYCLING: i64 = 2;
const EVENT_ACTIVITY: i64 = 26;
const EVENT_TYPE_STOP: i64 = 1;

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

/// Folds one byte into a running FIT CRC-16.
pub fn crc_step(crc: u16, byte: u8) -> u16 {
    let mut tmp = CRC_TABLE[usize::from(crc & 0xF)];
    let mut crc = (crc >> 4) & 0x0FFF;
    crc = crc ^ tmp ^ CRC_TABLE[usize::from(byte & 0xF)];

    tmp = CRC_TABLE[usize::from(crc & 0xF)];
    crc = (crc >> 4) & 0x0FFF;
    crc ^ tmp ^ CRC_TABLE[usize::from((byte >> 4) & 0xF)]
}

pub fn checksum(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0, |crc, byte| crc_step(crc, *byte))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseType {
    Enum,
    SInt8,
    UInt8,
    UInt16,
    SInt32,
    UInt32,
}

impl BaseType {
    fn id(self) -> u8 {
        match self {
            BaseType::Enum => 0x00,
            BaseType::SInt8 => 0x01,
            BaseType::UInt8 => 0x02,
            BaseType::UInt16 => 0x84,
            BaseType::SInt32 => 0x85,
            BaseType::UInt32 => 0x86,
        }
    }

    fn size(self) -> u8 {
        match self {
            BaseType::Enum | BaseType::SInt8 | BaseType::UInt8 => 1,
            BaseType::UInt16 => 2,
            BaseType::SInt32 | BaseType::UInt32 => 4,
        }
    }

    /// Largest valid value; the next one up is the invalid marker.
    fn max_valid(self) -> i64 {
        match self {
            BaseType::Enum | BaseType::UInt8 => 0xFE,
            BaseType::SInt8 => 0x7E,
            BaseType::UInt16 => 0xFFFE,
            BaseType::SInt32 => 0x7FFF_FFFE,
            BaseType::UInt32 => 0xFFFF_FFFE,
        }
    }

    fn min_valid(self) -> i64 {
        match self {
            BaseType::SInt8 => -0x7F,
            BaseType::SInt32 => -0x7FFF_FFFF,
            _ => 0,
        }
    }
}

/// One field of a message: definition number, base type and raw value.
#[derive(Debug, Clone, Copy)]
struct Field {
    num: u8,
    base: BaseType,
    value: i64,
}

impl Field {
    fn new(num: u8, base: BaseType, value: i64) -> Self {
        Self {
            num,
            base,
            value: value.clamp(base.min_valid(), base.max_valid()),
        }
    }

    fn timestamp(num: u8, at: OffsetDateTime) -> Self {
        Self::new(num, BaseType::UInt32, fit_seconds(at))
    }

    fn scaled(num: u8, base: BaseType, value: f64, scale: f64, offset: f64) -> Self {
        Self::new(num, base, ((value + offset) * scale).round() as i64)
    }
}

/// Seconds since the FIT epoch.
pub fn fit_seconds(at: OffsetDateTime) -> i64 {
    at.unix_timestamp() - FIT_EPOCH_OFFSET
}

pub fn degrees_to_semicircles(degrees: f64) -> i32 {
    (degrees * (2f64.powi(31) / 180.0)).round() as i32
}

/// Everything needed to write one activity file.
#[derive(Debug, Clone)]
pub struct FitActivity {
    pub samples: Vec<DecodedSample>,
    pub started_at: OffsetDateTime,
    /// Offset of the device's wall clock, used for the local start time.
    pub utc_offset: UtcOffset,
    pub total_elapsed_time: Duration,
    pub total_timer_time: Duration,
    /// Leave the session message out, as a truncated recording would.
    pub with_session: bool,
}

impl FitActivity {
    /// Activity whose elapsed and timer times span the sample timestamps.
    pub fn from_samples(samples: Vec<DecodedSample>, started_at: OffsetDateTime) -> Self {
        let last = samples
            .iter()
            .filter_map(|s| s.timestamp)
            .max()
            .unwrap_or(started_at);
        let elapsed = (last - started_at).max(Duration::ZERO);
        Self {
            samples,
            started_at,
            utc_offset: UtcOffset::UTC,
            total_elapsed_time: elapsed,
            total_timer_time: elapsed,
            with_session: true,
        }
    }

    pub fn with_utc_offset(mut self, offset: UtcOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    pub fn without_session(mut self) -> Self {
        self.with_session = false;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut encoder = FitEncoder::default();
        encoder.file_id(self.started_at);
        for sample in &self.samples {
            encoder.record(sample);
        }
        if self.with_session {
            encoder.session(self);
        }
        encoder.activity(self);
        encoder.finish()
    }
}

#[derive(Debug, Default)]
struct FitEncoder {
    body: Vec<u8>,
    /// Field-presence mask currently bound to each record slot.
    record_slots: Vec<u16>,
    next_victim: usize,
}

impl FitEncoder {
    fn define(&mut self, local: u8, global: u16, fields: &[Field]) {
        self.body.push(DEFINITION_FLAG | local);
        self.body.push(0); // reserved
        self.body.push(0); // little endian
        self.body.extend_from_slice(&global.to_le_bytes());
        self.body.push(fields.len() as u8);
        for field in fields {
            self.body
                .extend_from_slice(&[field.num, field.base.size(), field.base.id()]);
        }
    }

    fn data(&mut self, local: u8, fields: &[Field]) {
        self.body.push(local);
        for field in fields {
            let bytes = field.value.to_le_bytes();
            self.body
                .extend_from_slice(&bytes[..usize::from(field.base.size())]);
        }
    }

    fn message(&mut self, local: u8, global: u16, fields: &[Field]) {
        self.define(local, global, fields);
        self.data(local, fields);
    }

    fn file_id(&mut self, created: OffsetDateTime) {
        self.message(
            LOCAL_FILE_ID,
            MESG_FILE_ID,
            &[
                Field::new(0, BaseType::Enum, FILE_TYPE_ACTIVITY),
                Field::new(1, BaseType::UInt16, MANUFACTURER_DEVELOPMENT),
                Field::timestamp(4, created),
            ],
        );
    }

    fn record(&mut self, sample: &DecodedSample) {
        let fields = record_fields(sample);
        let mask = presence_mask(sample);

        let slot = match self.record_slots.iter().position(|m| *m == mask) {
            Some(slot) => slot,
            None => {
                let slot = if self.record_slots.len() < RECORD_SLOTS {
                    self.record_slots.push(mask);
                    self.record_slots.len() - 1
                } else {
                    let victim = self.next_victim;
                    self.next_victim = (victim + 1) % RECORD_SLOTS;
                    self.record_slots[victim] = mask;
                    victim
                };
                self.define(FIRST_RECORD_SLOT + slot as u8, MESG_RECORD, &fields);
                slot
            }
        };
        self.data(FIRST_RECORD_SLOT + slot as u8, &fields);
    }

    fn session(&mut self, activity: &FitActivity) {
        let end = activity.started_at + activity.total_elapsed_time;
        let total_distance = activity
            .samples
            .iter()
            .rev()
            .find_map(|s| s.distance)
            .unwrap_or(0.0);
        self.message(
            LOCAL_SESSION,
            MESG_SESSION,
            &[
                Field::timestamp(253, end),
                Field::timestamp(2, activity.started_at),
                Field::new(5, BaseType::Enum, SPORT_CYCLING),
                Field::scaled(
                    7,
                    BaseType::UInt32,
                    activity.total_elapsed_time.as_seconds_f64(),
                    1000.0,
                    0.0,
                ),
                Field::scaled(
                    8,
                    BaseType::UInt32,
                    activity.total_timer_time.as_seconds_f64(),
                    1000.0,
                    0.0,
                ),
                Field::scaled(9, BaseType::UInt32, total_distance, 100.0, 0.0),
            ],
        );
    }

    fn activity(&mut self, activity: &FitActivity) {
        let end = activity.started_at + activity.total_elapsed_time;
        // local_timestamp holds the wall-clock start, which is what ingestion
        // names the ride after
        let local_start =
            fit_seconds(activity.started_at) + i64::from(activity.utc_offset.whole_seconds());
        self.message(
            LOCAL_ACTIVITY,
            MESG_ACTIVITY,
            &[
                Field::timestamp(253, end),
                Field::scaled(
                    0,
                    BaseType::UInt32,
                    activity.total_timer_time.as_seconds_f64(),
                    1000.0,
                    0.0,
                ),
                Field::new(1, BaseType::UInt16, i64::from(activity.with_session)),
                Field::new(2, BaseType::Enum, 0),
                Field::new(3, BaseType::Enum, EVENT_ACTIVITY),
                Field::new(4, BaseType::Enum, EVENT_TYPE_STOP),
                Field::new(5, BaseType::UInt32, local_start),
            ],
        );
    }

    fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::from(HEADER_SIZE) + self.body.len() + 2);
        out.push(HEADER_SIZE);
        out.push(PROTOCOL_VERSION);
        out.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.body.len() as u32).to_le_bytes());
        out.extend_from_slice(b".FIT");
        let header_crc = checksum(&out);
        out.extend_from_slice(&header_crc.to_le_bytes());

        out.extend_from_slice(&self.body);
        let file_crc = checksum(&out);
        out.extend_from_slice(&file_crc.to_le_bytes());
        out
    }
}

/// One bit per record field the sample carries.
fn presence_mask(sample: &DecodedSample) -> u16 {
    [
        sample.timestamp.is_some(),
        sample.latitude.is_some(),
        sample.longitude.is_some(),
        sample.altitude.is_some(),
        sample.heart_rate.is_some(),
        sample.cadence.is_some(),
        sample.distance.is_some(),
        sample.speed.is_some(),
        sample.temperature.is_some(),
        sample.gps_accuracy.is_some(),
        sample.enhanced_altitude.is_some(),
    ]
    .into_iter()
    .enumerate()
    .fold(0, |mask, (i, present)| if present { mask | (1 << i) } else { mask })
}

fn record_fields(sample: &DecodedSample) -> Vec<Field> {
    let mut fields = Vec::with_capacity(11);
    if let Some(ts) = sample.timestamp {
        fields.push(Field::timestamp(253, ts));
    }
    if let Some(lat) = sample.latitude {
        fields.push(Field::new(0, BaseType::SInt32, i64::from(degrees_to_semicircles(lat))));
    }
    if let Some(lon) = sample.longitude {
        fields.push(Field::new(1, BaseType::SInt32, i64::from(degrees_to_semicircles(lon))));
    }
    if let Some(alt) = sample.altitude {
        fields.push(Field::scaled(2, BaseType::UInt16, alt, 5.0, 500.0));
    }
    if let Some(hr) = sample.heart_rate {
        fields.push(Field::new(3, BaseType::UInt8, i64::from(hr)));
    }
    if let Some(cadence) = sample.cadence {
        fields.push(Field::new(4, BaseType::UInt8, i64::from(cadence)));
    }
    if let Some(distance) = sample.distance {
        fields.push(Field::scaled(5, BaseType::UInt32, distance, 100.0, 0.0));
    }
    if let Some(speed) = sample.speed {
        fields.push(Field::new(6, BaseType::UInt16, i64::from(speed)));
    }
    if let Some(temperature) = sample.temperature {
        fields.push(Field::new(13, BaseType::SInt8, i64::from(temperature)));
    }
    if let Some(accuracy) = sample.gps_accuracy {
        fields.push(Field::new(31, BaseType::UInt8, i64::from(accuracy)));
    }
    if let Some(alt) = sample.enhanced_altitude {
        fields.push(Field::scaled(78, BaseType::UInt32, alt, 5.0, 500.0));
    }
    fields
}
