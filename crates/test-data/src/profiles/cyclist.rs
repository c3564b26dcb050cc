//! Cyclist profile.

use rides::models::RideType;

use super::AthleteProfile;

/// Rider on a given kind of bike.
///
/// Climbing costs roughly a quarter of flat speed per percent of grade;
/// descending gains about 15% per percent until the bike tops out.
#[derive(Debug, Clone)]
pub struct CyclistProfile {
    /// Flat-ground speed in m/s.
    base_speed: f64,
    variance: f64,
    resting_heart_rate: u8,
    max_heart_rate: u8,
    /// Cadence on flat ground, rpm.
    cadence: u8,
    /// Descent speed cap as a multiple of the flat speed.
    max_descent_factor: f64,
}

impl Default for CyclistProfile {
    fn default() -> Self {
        Self::for_ride_type(RideType::Road)
    }
}

impl CyclistProfile {
    pub fn for_ride_type(ride_type: RideType) -> Self {
        match ride_type {
            RideType::Road => Self {
                base_speed: 8.0, // ~28.8 km/h
                variance: 0.10,
                resting_heart_rate: 58,
                max_heart_rate: 185,
                cadence: 88,
                max_descent_factor: 2.5,
            },
            RideType::Gravel => Self {
                base_speed: 6.5,
                variance: 0.12,
                resting_heart_rate: 58,
                max_heart_rate: 185,
                cadence: 82,
                max_descent_factor: 2.0,
            },
            RideType::Mtb => Self {
                base_speed: 5.0,
                variance: 0.15,
                resting_heart_rate: 60,
                max_heart_rate: 188,
                cadence: 75,
                max_descent_factor: 1.6,
            },
            RideType::Tt => Self {
                base_speed: 11.0, // ~40 km/h
                variance: 0.05,
                resting_heart_rate: 50,
                max_heart_rate: 190,
                cadence: 95,
                max_descent_factor: 2.2,
            },
        }
    }

    /// Road profile with a different flat speed.
    pub fn with_speed(speed_kmh: f64) -> Self {
        Self {
            base_speed: speed_kmh / 3.6,
            ..Self::default()
        }
    }
}

impl AthleteProfile for CyclistProfile {
    fn base_speed_mps(&self) -> f64 {
        self.base_speed
    }

    fn grade_factor(&self, grade: f64) -> f64 {
        if grade >= 0.0 {
            (1.0 - grade * 25.0).max(0.15)
        } else {
            (1.0 - grade * 15.0).min(self.max_descent_factor)
        }
    }

    fn variance(&self) -> f64 {
        self.variance
    }

    fn resting_heart_rate(&self) -> u8 {
        self.resting_heart_rate
    }

    fn max_heart_rate(&self) -> u8 {
        self.max_heart_rate
    }

    fn cadence_at_grade(&self, grade: f64) -> u8 {
        if grade < -0.04 {
            // freewheeling down anything steeper than 4%
            return 0;
        }
        let drop = (grade.max(0.0) * 150.0).min(25.0);
        (f64::from(self.cadence) - drop).round() as u8
    }
}
