//! Rider performance profiles.
//!
//! A profile turns terrain grade into speed, heart rate and cadence so the
//! ride generator can emit plausible device samples.

mod cyclist;

pub use cyclist::CyclistProfile;

/// Performance model used by the ride generator.
pub trait AthleteProfile: Send + Sync {
    /// Speed on flat ground in metres per second.
    fn base_speed_mps(&self) -> f64;

    /// Speed multiplier for a grade given as a fraction (0.05 = 5%).
    fn grade_factor(&self, grade: f64) -> f64;

    /// Day-to-day variation as a coefficient of variation.
    fn variance(&self) -> f64;

    fn resting_heart_rate(&self) -> u8;

    fn max_heart_rate(&self) -> u8;

    /// Pedalling cadence in rpm for a grade; 0 when coasting.
    fn cadence_at_grade(&self, grade: f64) -> u8;
}

/// Target speed for a grade, scaled by a sampled day factor. Never below
/// walking pace so timestamps keep advancing.
pub fn speed_at_grade(profile: &dyn AthleteProfile, grade: f64, variance_factor: f64) -> f64 {
    let target = profile.base_speed_mps() * profile.grade_factor(grade);
    (target * variance_factor).max(1.0)
}

/// Samples a day factor around 1.0 from the profile's variance.
pub fn sample_variance(profile: &dyn AthleteProfile, rng: &mut impl rand::Rng) -> f64 {
    use rand_distr::{Distribution, Normal};

    match Normal::new(1.0, profile.variance()) {
        Ok(normal) if profile.variance() > 0.0 => normal.sample(rng).clamp(0.7, 1.4),
        _ => 1.0,
    }
}

/// Heart rate for an effort level in `[0, 1]`, interpolated between resting
/// and maximum.
pub fn heart_rate_for_effort(profile: &dyn AthleteProfile, effort: f64) -> u8 {
    let rest = f64::from(profile.resting_heart_rate());
    let max = f64::from(profile.max_heart_rate());
    (rest + (max - rest) * effort.clamp(0.0, 1.0)).round() as u8
}
