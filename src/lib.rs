//! Explicit mass-spring simulation.
//!
//! A [`MassSpringSystem`] holds point masses joined by damped springs. A
//! [`SimulationDriver`] advances it with semi-implicit Euler substeps under
//! gravity and collisions against static [`Obstacle`]s, handing every finished
//! frame to a [`SnapshotSink`] such as the `.poly` file [`PolyWriter`].

pub mod datatypes;
pub mod error;
pub mod geometry;
pub mod mass_spring;
pub mod mesher;
pub mod post_processor;
pub mod solver;

pub use datatypes::{SimulationParameters, Vector};
pub use error::SimulationError;
pub use geometry::{Obstacle, Plane, Sphere};
pub use mass_spring::MassSpringSystem;
pub use post_processor::{PolyWriter, SnapshotRecorder, SnapshotSink};
pub use solver::{DriverState, SimulationDriver};
