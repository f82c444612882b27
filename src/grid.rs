//! Conversion between world meters and cells of the potential field.
//!
//! The field origin sits at the grid center: with the default 500x500 grid at
//! 100 cells per meter, `(0, 0)` m is cell `(250, 250)` and the grid covers
//! `[-2.5, 2.5)` m on both axes. Columns follow world `x`, rows follow world `y`.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Signed so that positions outside the field can still be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndex {
    pub row: i64,
    pub col: i64,
}

impl GridIndex {
    pub fn new(row: i64, col: i64) -> Self {
        GridIndex { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub rows: usize,
    pub cols: usize,
    pub cells_per_meter: f32,
}

impl Default for GridSpec {
    fn default() -> Self {
        GridSpec {
            rows: 500,
            cols: 500,
            cells_per_meter: 100.0,
        }
    }
}

impl GridSpec {
    fn offset(&self) -> Vector2<f32> {
        Vector2::new(self.cols as f32 / 2.0, self.rows as f32 / 2.0)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_grid(&self, p: Point2<f32>) -> GridIndex {
        let g = p.coords * self.cells_per_meter + self.offset();
        GridIndex {
            row: g.y.round() as i64,
            col: g.x.round() as i64,
        }
    }

    pub fn to_world(&self, g: GridIndex) -> Point2<f32> {
        let g = Vector2::new(g.col as f32, g.row as f32);
        Point2::from((g - self.offset()) / self.cells_per_meter)
    }

    /// Returns `(row, col)` when the index lies inside the field.
    pub fn checked(&self, g: GridIndex) -> Option<(usize, usize)> {
        let row = usize::try_from(g.row).ok().filter(|&r| r < self.rows)?;
        let col = usize::try_from(g.col).ok().filter(|&c| c < self.cols)?;
        Some((row, col))
    }

    /// World-space extent of the field as `(min, max)` corners.
    pub fn extent(&self) -> (Point2<f32>, Point2<f32>) {
        let half = self.offset() / self.cells_per_meter;
        (Point2::from(-half), Point2::from(half))
    }

    /// Converts a length in meters to a length in cells.
    pub fn cells(&self, meters: f32) -> f32 {
        meters * self.cells_per_meter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn origin_maps_to_center() {
        let spec = GridSpec::default();
        assert_eq!(spec.to_grid(Point2::new(0.0, 0.0)), GridIndex::new(250, 250));
        assert_eq!(spec.to_grid(Point2::new(1.0, 0.0)), GridIndex::new(250, 350));
        assert_eq!(spec.to_grid(Point2::new(0.0, -1.0)), GridIndex::new(150, 250));
    }

    #[test]
    fn world_round_trip_within_one_cell() {
        let spec = GridSpec::default();
        let cell = 1.0 / spec.cells_per_meter;
        for i in 0..50 {
            for j in 0..50 {
                let p = Point2::new(-2.5 + i as f32 * 0.0997, -2.5 + j as f32 * 0.0993);
                let back = spec.to_world(spec.to_grid(p));
                assert!((back - p).norm() <= cell, "{p:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn grid_round_trip_is_exact() {
        let spec = GridSpec::default();
        for g in [GridIndex::new(0, 0), GridIndex::new(499, 17), GridIndex::new(250, 250)] {
            assert_eq!(spec.to_grid(spec.to_world(g)), g);
        }
        let p = spec.to_world(GridIndex::new(130, 300));
        assert_abs_diff_eq!(p.x, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(p.y, -1.2, epsilon = 1e-6);
    }

    #[test]
    fn outside_positions_are_not_checked_in() {
        let spec = GridSpec::default();
        assert!(spec.checked(spec.to_grid(Point2::new(3.0, 0.0))).is_none());
        assert!(spec.checked(spec.to_grid(Point2::new(0.0, -2.6))).is_none());
        assert_eq!(spec.checked(GridIndex::new(499, 0)), Some((499, 0)));
        assert_eq!(spec.checked(GridIndex::new(500, 0)), None);
    }
}
