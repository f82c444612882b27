//! Leader/follower formation planning over an artificial potential field.
//!
//! Each tick moves the obstacles, rebuilds the combined attractive/repulsive
//! field, steps the leader along the smoothed descent direction and places
//! two followers in a triangle behind it.

pub mod edt;
pub mod error;
pub mod field;
pub mod formation;
pub mod grid;
pub mod obstacles;
pub mod params;
pub mod planner;
pub mod render;
pub mod simulation;

pub use error::{Error, Result};
pub use field::{FieldSettings, PotentialField};
pub use formation::{Formation, FormationSettings};
pub use grid::{GridIndex, GridSpec};
pub use obstacles::{Obstacle, ObstacleField, Wall};
pub use params::Parameters;
pub use planner::{PlannerSettings, Step};
pub use simulation::{Simulation, SimulationState, Snapshot, Status};
