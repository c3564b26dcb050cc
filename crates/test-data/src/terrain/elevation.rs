//! Perlin noise elevation.

use noise::{NoiseFn, Perlin};
use rand::Rng;

use crate::config::{BoundingBox, Region};

/// Elevation field built from several octaves of Perlin noise.
#[derive(Debug, Clone)]
pub struct ElevationGenerator {
    perlin: Perlin,
    /// Metres at the middle of the noise range.
    base_elevation: f64,
    /// Metres of swing either side of the base.
    height_scale: f64,
    /// Noise cycles per degree.
    frequency: f64,
    octaves: u32,
}

impl ElevationGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_elevation: 500.0,
            height_scale: 150.0,
            frequency: 40.0,
            octaves: 4,
        }
    }

    /// Foothills around Boulder, CO.
    pub fn boulder(seed: u32) -> Self {
        Self {
            base_elevation: 1_650.0,
            height_scale: 250.0,
            ..Self::new(seed)
        }
    }

    /// Near-flat coastal roads.
    pub fn flat(seed: u32) -> Self {
        Self {
            base_elevation: 20.0,
            height_scale: 10.0,
            octaves: 2,
            ..Self::new(seed)
        }
    }

    /// Preset matching a riding region, falling back to the generic one.
    pub fn for_region(region: &BoundingBox, seed: u32) -> Self {
        if *region == Region::BOULDER {
            Self::boulder(seed)
        } else {
            Self::new(seed)
        }
    }

    pub fn with_height_scale(mut self, scale: f64) -> Self {
        self.height_scale = scale;
        self
    }

    /// Elevation at a coordinate, using fractal Brownian motion.
    pub fn elevation_at(&self, lat: f64, lon: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.frequency;
        let mut max_amplitude = 0.0;

        for _ in 0..self.octaves {
            total += self.perlin.get([lat * frequency, lon * frequency]) * amplitude;
            max_amplitude += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        // clamp in case the noise overshoots [-1, 1]
        let normalized = (total / max_amplitude).clamp(-1.0, 1.0);
        (self.base_elevation + normalized * self.height_scale).max(0.0)
    }
}

/// Adds barometric noise to an elevation reading.
pub fn add_elevation_jitter(elevation: f64, rng: &mut impl Rng, std_dev: f64) -> f64 {
    use rand_distr::{Distribution, Normal};

    match Normal::new(0.0, std_dev) {
        Ok(normal) => elevation + normal.sample(rng),
        Err(_) => elevation,
    }
}
