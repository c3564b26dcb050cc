//! Terrain generation.
//!
//! Elevation comes from layered Perlin noise, so a given coordinate always
//! maps to the same altitude for a given seed.

mod elevation;

pub use elevation::{ElevationGenerator, add_elevation_jitter};
