//! Single-pass reduction of decoded samples into telemetry rows and totals.
//!
//! The aggregator owns the position filter and row emission; the totals are
//! produced by small [`SampleMetric`] accumulators that each see every kept
//! sample together with the one kept before it.

use crate::{
    fit_decoder::SessionSummary,
    geo_math,
    models::{ActivitySummary, DecodedSample, TelemetryRow},
};

pub trait SampleMetric {
    type Output;
    /// `previous` is the previous kept sample, `None` for the first one.
    fn next_sample(&mut self, previous: Option<&DecodedSample>, sample: &DecodedSample);
    fn finish(&self) -> Self::Output;
}

/// Totals derived from the kept samples of one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryTotals {
    pub kept_samples: usize,
    pub distance_km: f64,
    pub average_speed_kmh: Option<f64>,
    pub max_speed_kmh: f64,
    pub elevation_gain_m: f64,
}

impl TelemetryTotals {
    pub fn into_summary(self, session: &SessionSummary) -> ActivitySummary {
        ActivitySummary {
            distance_km: self.distance_km,
            average_speed_kmh: self.average_speed_kmh,
            max_speed_kmh: self.max_speed_kmh,
            elevation_gain_m: self.elevation_gain_m,
            total_elapsed_time: session.total_elapsed_time,
            total_timer_time: session.total_timer_time,
            started_at: session.started_at,
            local_started_at: session.local_started_at,
        }
    }
}

/// Run the aggregator over a whole sample sequence.
pub fn aggregate(samples: &[DecodedSample]) -> (Vec<TelemetryRow>, TelemetryTotals) {
    let mut aggregator = TelemetryAggregator::with_capacity(samples.len());
    for sample in samples {
        aggregator.push(sample);
    }
    aggregator.finish()
}

#[derive(Debug, Default)]
pub struct TelemetryAggregator {
    rows: Vec<TelemetryRow>,
    previous: Option<DecodedSample>,
    distance: DistanceMetric,
    speed: SpeedMetric,
    elevation_gain: ElevationGainMetric,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Feed the next sample. Returns `false` when the sample was discarded.
    pub fn push(&mut self, sample: &DecodedSample) -> bool {
        // a single known coordinate is enough to keep the sample
        if sample.has_no_position() {
            return false;
        }

        let previous = self.previous.as_ref();
        let sequence = i32::try_from(self.rows.len()).unwrap_or(i32::MAX);
        let mut row = TelemetryRow::from_sample(sequence, sample);
        row.bearing = previous
            .and_then(DecodedSample::position)
            .zip(sample.position())
            .map(|((lat1, lon1), (lat2, lon2))| geo_math::bearing(lat1, lon1, lat2, lon2));

        self.distance.next_sample(previous, sample);
        self.speed.next_sample(previous, sample);
        self.elevation_gain.next_sample(previous, sample);

        self.rows.push(row);
        self.previous = Some(*sample);
        true
    }

    pub fn finish(self) -> (Vec<TelemetryRow>, TelemetryTotals) {
        let speed = self.speed.finish();
        let totals = TelemetryTotals {
            kept_samples: self.rows.len(),
            distance_km: self.distance.finish(),
            average_speed_kmh: speed.average_kmh,
            max_speed_kmh: speed.max_kmh,
            elevation_gain_m: self.elevation_gain.finish(),
        };
        (self.rows, totals)
    }
}

#[derive(Debug, Clone, Default)]
struct DistanceMetric {
    total_km: f64,
}

impl SampleMetric for DistanceMetric {
    type Output = f64;

    fn next_sample(&mut self, previous: Option<&DecodedSample>, sample: &DecodedSample) {
        let leg = previous.and_then(DecodedSample::position).zip(sample.position());
        if let Some(((lat1, lon1), (lat2, lon2))) = leg {
            let km = geo_math::distance(lat1, lon1, lat2, lon2);
            if km.is_finite() {
                self.total_km += km;
            }
        }
    }

    fn finish(&self) -> f64 {
        self.total_km
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SpeedStats {
    average_kmh: Option<f64>,
    max_kmh: f64,
}

/// Speed readings of every kept sample except the first.
#[derive(Debug, Clone, Default)]
struct SpeedMetric {
    count: u64,
    sum: u64,
    max: Option<u32>,
}

impl SampleMetric for SpeedMetric {
    type Output = SpeedStats;

    fn next_sample(&mut self, previous: Option<&DecodedSample>, sample: &DecodedSample) {
        if previous.is_none() {
            return;
        }
        if let Some(speed) = sample.speed {
            self.count += 1;
            self.sum += u64::from(speed);
            if self.max.is_none_or(|max| speed > max) {
                self.max = Some(speed);
            }
        }
    }

    fn finish(&self) -> SpeedStats {
        let average_kmh =
            (self.count > 0).then(|| geo_math::speed_to_kmh(self.sum as f64 / self.count as f64));
        SpeedStats {
            average_kmh,
            max_kmh: self.max.map_or(0.0, geo_math::speed_to_kmh),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct ElevationGainMetric {
    total_gain: f64,
    last_elevation: Option<f64>,
}

impl SampleMetric for ElevationGainMetric {
    type Output = f64;

    fn next_sample(&mut self, _previous: Option<&DecodedSample>, sample: &DecodedSample) {
        if let Some(elevation) = sample.altitude.or(sample.enhanced_altitude) {
            if let Some(last) = self.last_elevation {
                let gain = elevation - last;
                if gain > 0.0 {
                    self.total_gain += gain;
                }
            }
            self.last_elevation = Some(elevation);
        }
    }

    fn finish(&self) -> f64 {
        self.total_gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(lat: f64, lon: f64) -> DecodedSample {
        DecodedSample {
            latitude: Some(lat),
            longitude: Some(lon),
            ..Default::default()
        }
    }

    fn with_speed(mut s: DecodedSample, speed: u32) -> DecodedSample {
        s.speed = Some(speed);
        s
    }

    fn with_altitude(mut s: DecodedSample, altitude: f64) -> DecodedSample {
        s.altitude = Some(altitude);
        s
    }

    #[test]
    fn test_three_point_equator_ride() {
        let samples = [
            with_altitude(with_speed(sample(0.0, 0.0), 5000), 100.0),
            with_altitude(with_speed(sample(0.0, 1.0), 6000), 150.0),
            with_altitude(with_speed(sample(0.0, 2.0), 7000), 120.0),
        ];

        let (rows, totals) = aggregate(&samples);

        assert_eq!(rows.len(), 3);
        assert_eq!(totals.kept_samples, 3);
        assert!((totals.distance_km - 2.0 * 111.194_926_6).abs() < 1e-3);
        assert!((totals.elevation_gain_m - 50.0).abs() < 1e-9);
        // first sample's 5000 is excluded
        assert!((totals.average_speed_kmh.unwrap() - 23.4).abs() < 1e-9);
        assert!((totals.max_speed_kmh - 25.2).abs() < 1e-9);

        assert_eq!(rows[0].bearing, None);
        assert!((rows[1].bearing.unwrap() - 90.0).abs() < 1e-9);
        assert!((rows[2].bearing.unwrap() - 90.0).abs() < 1e-9);
        assert!(rows.iter().all(|r| r.activity_id.is_none()));
        assert_eq!(rows.iter().map(|r| r.sequence).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn test_no_samples() {
        let (rows, totals) = aggregate(&[]);
        assert!(rows.is_empty());
        assert_eq!(totals.distance_km, 0.0);
        assert_eq!(totals.elevation_gain_m, 0.0);
        assert_eq!(totals.average_speed_kmh, None);
        assert_eq!(totals.max_speed_kmh, 0.0);
    }

    #[test]
    fn test_single_sample() {
        let (rows, totals) = aggregate(&[with_altitude(with_speed(sample(45.0, 7.0), 9000), 300.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(totals.distance_km, 0.0);
        assert_eq!(totals.elevation_gain_m, 0.0);
        assert_eq!(totals.average_speed_kmh, None);
        assert_eq!(totals.max_speed_kmh, 0.0);
    }

    #[test]
    fn test_samples_without_position_are_discarded() {
        let samples = [
            DecodedSample {
                speed: Some(99_000),
                ..Default::default()
            },
            sample(0.0, 0.0),
            DecodedSample::default(),
            sample(0.0, 1.0),
        ];

        let (rows, totals) = aggregate(&samples);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].sequence, 1);
        assert_eq!(totals.average_speed_kmh, None);
        assert!((totals.distance_km - 111.194_926_6).abs() < 1e-3);
    }

    #[test]
    fn test_sample_with_one_coordinate_is_kept() {
        let samples = [
            sample(0.0, 0.0),
            with_speed(
                DecodedSample {
                    latitude: Some(0.5),
                    ..Default::default()
                },
                4000,
            ),
            sample(0.0, 1.0),
        ];

        let (rows, totals) = aggregate(&samples);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].position, None);
        assert_eq!(rows[1].bearing, None);
        // no leg can be measured across the half-known sample
        assert_eq!(rows[2].bearing, None);
        assert_eq!(totals.distance_km, 0.0);
        assert!((totals.max_speed_kmh - 14.4).abs() < 1e-9);
    }

    #[test]
    fn test_descending_ride_has_no_gain() {
        let samples: Vec<_> = (0..10)
            .map(|i| with_altitude(sample(0.0, f64::from(i) * 0.01), 500.0 - f64::from(i) * 10.0))
            .collect();
        let (_, totals) = aggregate(&samples);
        assert_eq!(totals.elevation_gain_m, 0.0);
    }

    #[test]
    fn test_gain_counts_only_positive_deltas() {
        let altitudes = [100.0, 110.0, 105.0, 120.0, 90.0, 95.0];
        let samples: Vec<_> = altitudes
            .iter()
            .enumerate()
            .map(|(i, alt)| with_altitude(sample(0.0, i as f64 * 0.001), *alt))
            .collect();
        let (_, totals) = aggregate(&samples);
        assert!((totals.elevation_gain_m - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_enhanced_altitude_used_when_altitude_missing() {
        let mut high = sample(0.0, 0.001);
        high.enhanced_altitude = Some(215.0);
        let samples = [with_altitude(sample(0.0, 0.0), 200.0), high];
        let (_, totals) = aggregate(&samples);
        assert!((totals.elevation_gain_m - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_speed_is_true_maximum_of_non_first_samples() {
        let speeds = [20_000, 3000, 8000, 12_500, 12_500, 4000];
        let samples: Vec<_> = speeds
            .iter()
            .enumerate()
            .map(|(i, s)| with_speed(sample(0.0, i as f64 * 0.001), *s))
            .collect();

        let (_, totals) = aggregate(&samples);

        assert!((totals.max_speed_kmh - geo_math::speed_to_kmh(12_500u32)).abs() < 1e-9);
        let expected_avg = geo_math::speed_to_kmh((3000 + 8000 + 12_500 + 12_500 + 4000) as f64 / 5.0);
        assert!((totals.average_speed_kmh.unwrap() - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn test_distance_is_sum_of_kept_legs() {
        let coords = [
            (40.0150, -105.2705),
            (40.0161, -105.2690),
            (40.0175, -105.2671),
            (40.0190, -105.2655),
            (40.0202, -105.2641),
        ];
        let mut samples: Vec<_> = coords.iter().map(|(lat, lon)| sample(*lat, *lon)).collect();
        samples.insert(2, DecodedSample::default());

        let (rows, totals) = aggregate(&samples);

        let expected: f64 = coords
            .windows(2)
            .map(|w| geo_math::distance(w[0].0, w[0].1, w[1].0, w[1].1))
            .sum();
        assert_eq!(rows.len(), coords.len());
        assert!((totals.distance_km - expected).abs() < 1e-12);
    }

    #[test]
    fn test_push_reports_discarded_samples() {
        let mut aggregator = TelemetryAggregator::new();
        assert!(!aggregator.push(&DecodedSample::default()));
        assert!(aggregator.push(&sample(1.0, 1.0)));
        let (rows, _) = aggregator.finish();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, 0);
    }
}
