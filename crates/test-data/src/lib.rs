//! Test data generation for the rides service.
//!
//! Produces synthetic bike rides and encodes them as real FIT files, so the
//! ingest pipeline can be exercised end to end without recorded activities.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let mut rng = rand::thread_rng();
//! let ride = RideGenerator::new(RideConfig::default(), 42).generate(&mut rng);
//! let payload = RawFilePayload::new(ride.file_name(), ride.to_fit_bytes());
//! ```

pub mod config;
pub mod fit;
pub mod generators;
pub mod profiles;
pub mod terrain;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use rides::models::{DecodedSample, RawFilePayload, RideType};

    pub use crate::config::{BoundingBox, Region, RideConfig};
    pub use crate::fit::FitActivity;
    pub use crate::generators::{GeneratedRide, RideGenerator, ride_series};
    pub use crate::profiles::{AthleteProfile, CyclistProfile};
    pub use crate::terrain::ElevationGenerator;
}
