//! Configuration types for synthetic ride generation.

use rides::models::RideType;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset, macros::datetime};

/// Geographic bounding box defined by southwest and northeast corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub const fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Returns a random point within the bounding box as `(lat, lon)`.
    pub fn random_point(&self, rng: &mut impl rand::Rng) -> (f64, f64) {
        let lat = rng.gen_range(self.min_lat..self.max_lat);
        let lon = rng.gen_range(self.min_lon..self.max_lon);
        (lat, lon)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Pre-defined riding areas.
#[derive(Debug, Clone, Copy)]
pub struct Region;

impl Region {
    /// Boulder, CO foothills.
    pub const BOULDER: BoundingBox = BoundingBox::new(39.9, -105.5, 40.1, -105.2);

    /// Girona, Catalonia. Rolling roads near the coast.
    pub const GIRONA: BoundingBox = BoundingBox::new(41.85, 2.6, 42.1, 3.0);
}

/// Parameters for one generated ride.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideConfig {
    pub ride_type: RideType,
    pub region: BoundingBox,
    /// UTC start of the recording.
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    /// Offset of the rider's wall clock from UTC, in whole hours.
    pub utc_offset_hours: i8,
    pub duration_secs: u32,
    /// Seconds between samples.
    pub sample_interval_secs: u32,
    /// Probability that a sample loses its GPS fix.
    pub dropout_rate: f64,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            ride_type: RideType::Road,
            region: Region::BOULDER,
            start: datetime!(2024-06-01 13:30:00 UTC),
            utc_offset_hours: -6,
            duration_secs: 3_600,
            sample_interval_secs: 1,
            dropout_rate: 0.0,
        }
    }
}

impl RideConfig {
    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_is_contained() {
        let (lat, lon) = Region::GIRONA.center();
        assert!(Region::GIRONA.contains(lat, lon));
        assert!(!Region::GIRONA.contains(lat, lon + 10.0));
    }

    #[test]
    fn test_default_is_morning_in_boulder() {
        let config = RideConfig::default();
        let local = config.start.to_offset(config.utc_offset());
        assert_eq!(local.hour(), 7);
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_utc() {
        let config = RideConfig {
            utc_offset_hours: 99,
            ..RideConfig::default()
        };
        assert_eq!(config.utc_offset(), UtcOffset::UTC);
    }
}
