//! Ride generators.
//!
//! [`RideGenerator`] simulates a single recording; [`ride_series`] builds a
//! few weeks of history for seeding.

mod ride;

pub use ride::{GeneratedRide, RideGenerator, ride_series};
