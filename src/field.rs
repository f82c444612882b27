//! Combined attractive + repulsive potential on the planning grid.
//!
//! Rebuilt from scratch every tick. Values are stored row-major, rows along
//! world `y` and columns along world `x`; the attractive term is measured in
//! cells, the repulsive term in meters.

use nalgebra::{Point2, Vector2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::edt::distance_transform;
use crate::grid::GridSpec;
use crate::obstacles::Wall;
use crate::params::Parameters;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSettings {
    pub grid: GridSpec,
    pub obstacle_radius: f32,
    pub attractive_gain: f32,
    pub repulsive_gain: f32,
    pub influence_radius: f32,
    pub walls: Vec<Wall>,
}

impl From<&Parameters> for FieldSettings {
    fn from(params: &Parameters) -> Self {
        FieldSettings {
            grid: params.grid,
            obstacle_radius: params.obstacle_radius,
            attractive_gain: params.attractive_gain,
            repulsive_gain: params.repulsive_gain,
            influence_radius: params.influence_radius,
            walls: params.walls.clone(),
        }
    }
}

impl FieldSettings {
    /// Repulsive term for a distance to the nearest occupied cell, in cells.
    pub fn repulsive(&self, distance: f32) -> f32 {
        let d2 = distance / self.grid.cells_per_meter + 1.0;
        if d2 > self.influence_radius {
            return 0.0;
        }
        let t = 1.0 / d2 - 1.0 / self.influence_radius;
        self.repulsive_gain * t * t
    }

    /// Attractive term for a cell offset from the goal cell.
    pub fn attractive(&self, d_row: f32, d_col: f32) -> f32 {
        self.attractive_gain * (d_row * d_row + d_col * d_col)
    }

    /// Marks cylindrical obstacle footprints and wall rectangles.
    pub fn occupancy(&self, obstacles: &[Point2<f32>]) -> Vec<bool> {
        let grid = &self.grid;
        let radius = grid.cells(self.obstacle_radius);
        let radius_sq = radius * radius;
        let centers: Vec<(f32, f32)> = obstacles
            .iter()
            .map(|&p| {
                let g = grid.to_grid(p);
                (g.row as f32, g.col as f32)
            })
            .collect();

        let mut occupied = vec![false; grid.len()];
        occupied
            .par_chunks_mut(grid.cols)
            .enumerate()
            .for_each(|(row, cells)| {
                let r = row as f32;
                for &(r0, c0) in &centers {
                    let dr = r - r0;
                    let rest = radius_sq - dr * dr;
                    if rest <= 0.0 {
                        continue;
                    }
                    let half = rest.sqrt();
                    let lo = (c0 - half).floor().max(0.0) as usize;
                    let hi = ((c0 + half).ceil().max(0.0) as usize).min(cells.len().saturating_sub(1));
                    for (col, cell) in cells.iter_mut().enumerate().take(hi + 1).skip(lo) {
                        let dc = col as f32 - c0;
                        if dr * dr + dc * dc < radius_sq {
                            *cell = true;
                        }
                    }
                }
            });

        for wall in &self.walls {
            let (rows, cols) = wall.cells(grid);
            for row in rows {
                occupied[row * grid.cols + cols.start..row * grid.cols + cols.end].fill(true);
            }
        }
        occupied
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PotentialField {
    grid: GridSpec,
    values: Vec<f32>,
}

impl PotentialField {
    pub fn build(settings: &FieldSettings, obstacles: &[Point2<f32>], goal: Point2<f32>) -> Self {
        let grid = settings.grid;
        let occupied = settings.occupancy(obstacles);
        let distance = distance_transform(&occupied, grid.rows, grid.cols);
        let g = grid.to_grid(goal);
        let (goal_row, goal_col) = (g.row as f32, g.col as f32);

        let mut values = vec![0.0f32; grid.len()];
        values
            .par_chunks_mut(grid.cols)
            .zip(distance.par_chunks(grid.cols))
            .enumerate()
            .for_each(|(row, (out, dist))| {
                let d_row = row as f32 - goal_row;
                for (col, (v, &d)) in out.iter_mut().zip(dist).enumerate() {
                    *v = settings.attractive(d_row, col as f32 - goal_col) + settings.repulsive(d);
                }
            });
        trace!(
            obstacles = obstacles.len(),
            occupied = occupied.iter().filter(|&&o| o).count(),
            "potential field rebuilt"
        );
        PotentialField { grid, values }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.grid.cols + col]
    }

    /// Gradient of the negated field at a cell, as `(d/dcol, d/drow)`.
    ///
    /// Central differences inside the grid, one-sided differences on its border.
    pub fn gradient_at(&self, row: usize, col: usize) -> Vector2<f32> {
        let diff = |lo: f32, hi: f32, span: f32| -(hi - lo) / span;
        let axis = |i: usize, n: usize, at: &dyn Fn(usize) -> f32| -> f32 {
            if n < 2 {
                0.0
            } else if i == 0 {
                diff(at(0), at(1), 1.0)
            } else if i == n - 1 {
                diff(at(n - 2), at(n - 1), 1.0)
            } else {
                diff(at(i - 1), at(i + 1), 2.0)
            }
        };
        let gx = axis(col, self.grid.cols, &|c| self.get(row, c));
        let gy = axis(row, self.grid.rows, &|r| self.get(r, col));
        Vector2::new(gx, gy)
    }

    /// Full gradient grid of the negated field, row-major.
    pub fn gradient(&self) -> Vec<Vector2<f32>> {
        let cols = self.grid.cols;
        (0..self.grid.len())
            .into_par_iter()
            .map(|i| self.gradient_at(i / cols, i % cols))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridIndex;

    fn open_settings() -> FieldSettings {
        FieldSettings {
            walls: Vec::new(),
            ..FieldSettings::from(&Parameters::default())
        }
    }

    #[test]
    fn attractive_minimum_sits_on_goal_cell() {
        let settings = open_settings();
        let goal = Point2::new(1.0, -0.5);
        let field = PotentialField::build(&settings, &[], goal);
        let (min_index, _) = field
            .values()
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap();
        let cols = settings.grid.cols;
        let expected = settings.grid.checked(settings.grid.to_grid(goal)).unwrap();
        assert_eq!((min_index / cols, min_index % cols), expected);
        assert_eq!(field.get(expected.0, expected.1), 0.0);
    }

    #[test]
    fn attractive_grows_with_distance() {
        let settings = open_settings();
        let field = PotentialField::build(&settings, &[], Point2::new(0.0, 0.0));
        let mut last = -1.0;
        for step in 0..200 {
            let v = field.get(250, 250 + step);
            assert!(v > last);
            last = v;
        }
        // equal distance, equal potential
        assert_eq!(field.get(250 + 30, 250 + 40), field.get(250 - 50, 250));
    }

    #[test]
    fn repulsive_profile() {
        let settings = open_settings();
        // d2 > d0 beyond one meter of clearance
        assert_eq!(settings.repulsive(101.0), 0.0);
        assert_eq!(settings.repulsive(f32::INFINITY), 0.0);
        let mut last = f32::INFINITY;
        for d in 1..100 {
            let v = settings.repulsive(d as f32);
            assert!(v > 0.0 && v < last, "d = {d}");
            last = v;
        }
        assert!(settings.repulsive(0.0).is_finite());
    }

    #[test]
    fn footprint_is_cylindrical() {
        let settings = open_settings();
        let occupied = settings.occupancy(&[Point2::new(0.0, 0.0)]);
        let cols = settings.grid.cols;
        let at = |r: usize, c: usize| occupied[r * cols + c];
        assert!(at(250, 250));
        assert!(at(250, 259) && at(259, 250));
        assert!(!at(250, 260) && !at(240, 250));
        assert!(!at(258, 258));
        // 10-cell radius disc, boundary excluded
        assert_eq!(occupied.iter().filter(|&&o| o).count(), 305);
    }

    #[test]
    fn walls_are_baked_in() {
        let settings = FieldSettings::from(&Parameters::default());
        let occupied = settings.occupancy(&[]);
        let cols = settings.grid.cols;
        assert!(occupied[400 * cols + 140]);
        assert!(occupied[140 * cols]);
        assert!(!occupied[140 * cols + 300]);
        assert_eq!(occupied.iter().filter(|&&o| o).count(), 150 * 20 + 20 * 300);
    }

    #[test]
    fn obstacle_off_the_grid_is_ignored() {
        let settings = open_settings();
        let occupied = settings.occupancy(&[Point2::new(4.0, -4.0)]);
        assert!(occupied.iter().all(|&o| !o));
    }

    #[test]
    fn repulsion_pushes_away_from_obstacle() {
        let settings = FieldSettings {
            attractive_gain: 1e-9,
            ..open_settings()
        };
        let field = PotentialField::build(&settings, &[Point2::new(0.0, 0.0)], Point2::new(0.0, 0.0));
        let g = settings.grid.to_grid(Point2::new(0.3, 0.0));
        let GridIndex { row, col } = g;
        let grad = field.gradient_at(row as usize, col as usize);
        assert!(grad.x > 0.0);
        assert!(grad.y.abs() < grad.x * 1e-3);
    }

    #[test]
    fn gradient_matches_numpy_edges() {
        let grid = GridSpec {
            rows: 3,
            cols: 4,
            cells_per_meter: 1.0,
        };
        let field = PotentialField {
            grid,
            values: vec![
                0.0, 1.0, 4.0, 9.0, //
                1.0, 2.0, 5.0, 10.0, //
                3.0, 4.0, 7.0, 12.0,
            ],
        };
        assert_eq!(field.gradient_at(0, 0), Vector2::new(-1.0, -1.0));
        assert_eq!(field.gradient_at(1, 1), Vector2::new(-2.0, -1.5));
        assert_eq!(field.gradient_at(2, 3), Vector2::new(-5.0, -2.0));
        let all = field.gradient();
        assert_eq!(all.len(), 12);
        assert_eq!(all[5], field.gradient_at(1, 1));
    }
}
