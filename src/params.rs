use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::grid::GridSpec;
use crate::obstacles::Wall;

/// Tunables for one run. Every field may be omitted from a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub grid: GridSpec,
    pub start: Point2<f32>,
    pub goal: Point2<f32>,
    pub max_iterations: usize,
    pub obstacle_radius: f32,
    pub swarm_radius: f32,
    /// `xi`
    pub attractive_gain: f32,
    /// `nu`
    pub repulsive_gain: f32,
    /// `d0`, compared against the rescaled distance `d / cells_per_meter + 1`.
    pub influence_radius: f32,
    pub formation_scale_min: f32,
    pub formation_scale_max: f32,
    pub moving_obstacles: bool,
    pub random_map: bool,
    pub num_random_obstacles: usize,
    /// Per-tick displacement of a moving obstacle along each axis.
    pub obstacle_step: f32,
    pub goal_tolerance: f32,
    /// Physical distance the leader covers per tick.
    pub step_length: f32,
    /// Side of the square window the gradient is averaged over, in cells.
    pub smoothing_window: usize,
    pub seed: Option<u64>,
    /// Used when `random_map` is false.
    pub obstacles: Vec<Point2<f32>>,
    pub walls: Vec<Wall>,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            grid: GridSpec::default(),
            start: Point2::new(-2.0, 2.0),
            goal: Point2::new(2.0, -2.0),
            max_iterations: 100,
            obstacle_radius: 0.1,
            swarm_radius: 0.2,
            attractive_gain: 1.0 / 1000.0,
            repulsive_gain: 200.0,
            influence_radius: 2.0,
            formation_scale_min: 0.6,
            formation_scale_max: 1.5,
            moving_obstacles: true,
            random_map: true,
            num_random_obstacles: 7,
            obstacle_step: 0.01,
            goal_tolerance: 0.1,
            step_length: 0.1,
            smoothing_window: 80,
            seed: None,
            obstacles: vec![
                Point2::new(-2.0, 1.0),
                Point2::new(1.5, 0.5),
                Point2::new(0.0, 0.0),
                Point2::new(-1.8, -1.8),
            ],
            walls: vec![
                Wall::new(Point2::new(-1.2, 1.0), Point2::new(-1.0, 2.5)),
                Wall::new(Point2::new(-2.5, -1.2), Point2::new(0.5, -1.0)),
            ],
        }
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfiguration(msg.into())
}

impl Parameters {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("loading parameters from {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        let params: Parameters = serde_json::from_reader(reader)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let grid = &self.grid;
        if grid.rows == 0 || grid.cols == 0 {
            return Err(invalid(format!(
                "grid must have at least one cell, got {}x{}",
                grid.rows, grid.cols
            )));
        }
        if !(grid.cells_per_meter.is_finite() && grid.cells_per_meter > 0.0) {
            return Err(invalid(format!(
                "cells_per_meter must be positive, got {}",
                grid.cells_per_meter
            )));
        }
        for (name, p) in [("start", self.start), ("goal", self.goal)] {
            if !(p.x.is_finite() && p.y.is_finite()) {
                return Err(invalid(format!("{name} must be finite, got {p:?}")));
            }
        }
        for (name, r) in [
            ("obstacle_radius", self.obstacle_radius),
            ("swarm_radius", self.swarm_radius),
            ("obstacle_step", self.obstacle_step),
        ] {
            if !(r.is_finite() && r >= 0.0) {
                return Err(invalid(format!("{name} must be non-negative, got {r}")));
            }
        }
        for (name, v) in [
            ("attractive_gain", self.attractive_gain),
            ("repulsive_gain", self.repulsive_gain),
            ("influence_radius", self.influence_radius),
            ("goal_tolerance", self.goal_tolerance),
            ("step_length", self.step_length),
            ("formation_scale_min", self.formation_scale_min),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(invalid(format!("{name} must be positive, got {v}")));
            }
        }
        if !self.formation_scale_max.is_finite()
            || self.formation_scale_min > self.formation_scale_max
        {
            return Err(invalid(format!(
                "formation scale band [{}, {}] is empty",
                self.formation_scale_min, self.formation_scale_max
            )));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations must be at least 1"));
        }
        if self.smoothing_window == 0 {
            return Err(invalid("smoothing_window must be at least 1 cell"));
        }
        if let Some(wall) = self.walls.iter().find(|w| !w.is_well_formed()) {
            return Err(invalid(format!("wall corners out of order: {wall:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn rejects_inverted_scale_band() {
        let params = Parameters {
            formation_scale_min: 2.0,
            formation_scale_max: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_bad_resolution_and_radii() {
        let mut params = Parameters::default();
        params.grid.cells_per_meter = 0.0;
        assert!(params.validate().is_err());

        let params = Parameters {
            obstacle_radius: -0.1,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = Parameters {
            swarm_radius: f32::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_inverted_wall() {
        let params = Parameters {
            walls: vec![Wall::new(Point2::new(1.0, 1.0), Point2::new(0.0, 2.0))],
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let params: Parameters =
            serde_json::from_str(r#"{"max_iterations": 250, "random_map": false, "walls": []}"#)
                .unwrap();
        assert_eq!(params.max_iterations, 250);
        assert!(!params.random_map);
        assert!(params.walls.is_empty());
        assert_eq!(params.grid, GridSpec::default());
        assert_eq!(params.obstacles.len(), 4);
    }

    #[test]
    fn json_file_is_validated() {
        let path = std::env::temp_dir().join(format!("potential_swarm_bad_params_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"formation_scale_min": 3.0}"#).unwrap();
        let err = Parameters::from_json_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        std::fs::remove_file(&path).unwrap();
    }
}
