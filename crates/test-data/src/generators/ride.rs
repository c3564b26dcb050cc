//! Synthetic bike rides.
//!
//! The generator simulates a bike computer logging at a fixed interval. The
//! rider follows a random walk with momentum across the configured region.
//! Speed follows the terrain grade through the rider's profile, and each
//! sample carries the fields a real head unit would record.

use geo::{Destination, Haversine, Point};
use rand::Rng;
use rides::models::{DecodedSample, RideType};
use time::{Duration, OffsetDateTime};

use crate::{
    config::{BoundingBox, RideConfig},
    fit::FitActivity,
    profiles::{self, AthleteProfile, CyclistProfile},
    terrain::{ElevationGenerator, add_elevation_jitter},
};

/// Metres ahead of the rider used to estimate the grade.
const GRADE_LOOKAHEAD_M: f64 = 15.0;

/// One ride as the device recorded it.
#[derive(Debug, Clone)]
pub struct GeneratedRide {
    pub config: RideConfig,
    pub samples: Vec<DecodedSample>,
    /// Distance covered, metres.
    pub distance_m: f64,
}

impl GeneratedRide {
    pub fn ride_type(&self) -> RideType {
        self.config.ride_type
    }

    /// Samples that kept their GPS fix.
    pub fn positioned_samples(&self) -> usize {
        self.samples.iter().filter(|s| s.position().is_some()).count()
    }

    pub fn to_fit(&self) -> FitActivity {
        let elapsed = Duration::seconds(i64::from(self.config.duration_secs));
        FitActivity {
            samples: self.samples.clone(),
            started_at: self.config.start,
            utc_offset: self.config.utc_offset(),
            total_elapsed_time: elapsed,
            total_timer_time: elapsed,
            with_session: true,
        }
    }

    pub fn to_fit_bytes(&self) -> Vec<u8> {
        self.to_fit().encode()
    }

    /// File name a device would give this ride.
    pub fn file_name(&self) -> String {
        let local = self.config.start.to_offset(self.config.utc_offset());
        format!(
            "{:04}-{:02}-{:02}-{:02}-{:02}-{:02}.fit",
            local.year(),
            u8::from(local.month()),
            local.day(),
            local.hour(),
            local.minute(),
            local.second()
        )
    }
}

/// Generates rides for a [`RideConfig`].
pub struct RideGenerator {
    config: RideConfig,
    profile: Box<dyn AthleteProfile>,
    elevation: ElevationGenerator,
}

impl RideGenerator {
    pub fn new(config: RideConfig, seed: u32) -> Self {
        let profile = Box::new(CyclistProfile::for_ride_type(config.ride_type));
        let elevation = ElevationGenerator::for_region(&config.region, seed);
        Self {
            config,
            profile,
            elevation,
        }
    }

    pub fn with_profile(mut self, profile: impl AthleteProfile + 'static) -> Self {
        self.profile = Box::new(profile);
        self
    }

    pub fn with_elevation(mut self, elevation: ElevationGenerator) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn generate(&self, rng: &mut impl Rng) -> GeneratedRide {
        let config = &self.config;
        let interval = config.sample_interval_secs.max(1);
        let steps = config.duration_secs / interval + 1;

        let (lat, lon) = config.region.random_point(rng);
        let mut position = Point::new(lon, lat);
        let mut heading: f64 = rng.gen_range(0.0..360.0);
        let day_factor = profiles::sample_variance(self.profile.as_ref(), rng);
        let base_temperature: f64 = rng.gen_range(8.0..28.0);

        let mut samples = Vec::with_capacity(steps as usize);
        let mut distance_m = 0.0;

        for step in 0..steps {
            let elapsed = i64::from(step * interval);
            let here = self.elevation.elevation_at(position.y(), position.x());
            let ahead = Haversine.destination(position, heading, GRADE_LOOKAHEAD_M);
            let grade = (self.elevation.elevation_at(ahead.y(), ahead.x()) - here)
                / GRADE_LOOKAHEAD_M;

            let surge: f64 = rng.gen_range(0.95..1.05);
            let speed = profiles::speed_at_grade(self.profile.as_ref(), grade, day_factor) * surge;
            let effort = (0.55 + grade * 6.0).clamp(0.2, 1.0);
            let altitude = add_elevation_jitter(here, rng, 0.5);

            let has_fix = rng.r#gen::<f64>() >= config.dropout_rate;
            samples.push(DecodedSample {
                timestamp: Some(config.start + Duration::seconds(elapsed)),
                latitude: has_fix.then_some(position.y()),
                longitude: has_fix.then_some(position.x()),
                altitude: Some(altitude),
                heart_rate: Some(profiles::heart_rate_for_effort(self.profile.as_ref(), effort)),
                cadence: Some(self.profile.cadence_at_grade(grade)),
                distance: Some(distance_m),
                speed: Some((speed * 1000.0).round() as u32),
                temperature: Some((base_temperature + elapsed as f64 / 1800.0).round() as i8),
                gps_accuracy: has_fix.then(|| rng.gen_range(2..8)),
                enhanced_altitude: None,
            });

            let step_m = speed * f64::from(interval);
            heading = self.steer(position, heading + rng.gen_range(-12.0..12.0), step_m);
            position = Haversine.destination(position, heading, step_m);
            distance_m += step_m;
        }

        GeneratedRide {
            config: config.clone(),
            samples,
            distance_m,
        }
    }

    /// Turn back toward the middle of the region when the next step would
    /// leave it.
    fn steer(&self, position: Point, heading: f64, step_m: f64) -> f64 {
        let next = Haversine.destination(position, heading, step_m);
        if self.config.region.contains(next.y(), next.x()) {
            return heading.rem_euclid(360.0);
        }
        let (lat, lon) = self.config.region.center();
        let d_lat = lat - position.y();
        let d_lon = (lon - position.x()) * position.y().to_radians().cos();
        d_lon.atan2(d_lat).to_degrees().rem_euclid(360.0)
    }
}

/// A training history: `count` rides of mixed types spread over the 45
/// days before `until`, starting at varied local hours.
pub fn ride_series(
    count: usize,
    region: BoundingBox,
    until: OffsetDateTime,
    rng: &mut impl Rng,
) -> Vec<GeneratedRide> {
    let defaults = RideConfig::default();
    (0..count)
        .map(|i| {
            let ride_type = RideType::ALL[rng.gen_range(0..RideType::ALL.len())];
            let days_back = rng.gen_range(0..45);
            let local_hour = rng.gen_range(5..21);
            let start = (until - Duration::days(days_back))
                .replace_time(time::Time::MIDNIGHT)
                + Duration::hours(local_hour - i64::from(defaults.utc_offset_hours))
                + Duration::minutes(rng.gen_range(0..60));
            let config = RideConfig {
                ride_type,
                region,
                start: start.min(until),
                duration_secs: rng.gen_range(1_800..10_800),
                dropout_rate: 0.01,
                ..defaults.clone()
            };
            RideGenerator::new(config, i as u32).generate(&mut *rng)
        })
        .collect()
}
