use std::ops::Range;

use nalgebra::{Point2, Vector2};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::grid::GridSpec;

/// Direction pattern for the first four obstacles; any further obstacle is static.
const VELOCITY_PATTERN: [(f32, f32); 4] = [(1.0, -1.0), (-1.0, -1.0), (-1.0, -1.0), (1.0, 1.0)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub position: Point2<f32>,
    pub velocity: Vector2<f32>,
}

impl Obstacle {
    pub fn new(position: Point2<f32>, velocity: Vector2<f32>) -> Self {
        Obstacle { position, velocity }
    }
}

/// Static axis-aligned rectangle, in meters. Covers `[min, max)` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub min: Point2<f32>,
    pub max: Point2<f32>,
}

impl Wall {
    pub fn new(min: Point2<f32>, max: Point2<f32>) -> Self {
        Wall { min, max }
    }

    pub fn is_well_formed(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// Row and column ranges covered by the wall, clipped to the grid.
    pub fn cells(&self, grid: &GridSpec) -> (Range<usize>, Range<usize>) {
        let lo = grid.to_grid(self.min);
        let hi = grid.to_grid(self.max);
        let clip = |v: i64, n: usize| v.clamp(0, n as i64) as usize;
        (
            clip(lo.row, grid.rows)..clip(hi.row, grid.rows),
            clip(lo.col, grid.cols)..clip(hi.col, grid.cols),
        )
    }
}

/// The moving circular obstacles, in a fixed order for the whole run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObstacleField {
    obstacles: Vec<Obstacle>,
}

impl ObstacleField {
    /// Assigns the reference velocity pattern by list position.
    pub fn fixed(positions: &[Point2<f32>], step: f32, moving: bool) -> Self {
        let obstacles = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let velocity = match VELOCITY_PATTERN.get(i) {
                    Some(&(dx, dy)) if moving => Vector2::new(dx, dy) * step,
                    _ => Vector2::zeros(),
                };
                Obstacle::new(position, velocity)
            })
            .collect();
        ObstacleField { obstacles }
    }

    /// Samples `count` positions uniformly over the field extent.
    pub fn random<R: Rng>(
        count: usize,
        grid: &GridSpec,
        step: f32,
        moving: bool,
        rng: &mut R,
    ) -> Self {
        let (min, max) = grid.extent();
        let positions: Vec<Point2<f32>> = (0..count)
            .map(|_| {
                Point2::new(
                    rng.random_range(min.x..max.x),
                    rng.random_range(min.y..max.y),
                )
            })
            .collect();
        Self::fixed(&positions, step, moving)
    }

    /// Moves every obstacle by its velocity. No bounds and no obstacle-obstacle checks.
    pub fn advance(&mut self) {
        for obstacle in &mut self.obstacles {
            obstacle.position += obstacle.velocity;
        }
    }

    pub fn positions(&self) -> Vec<Point2<f32>> {
        self.obstacles.iter().map(|o| o.position).collect()
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}
