use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::field::PotentialField;

/// Below this the averaged gradient carries no usable direction.
pub const MIN_VELOCITY: f32 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    pub step_length: f32,
    pub smoothing_window: usize,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        PlannerSettings {
            step_length: 0.1,
            smoothing_window: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub next: Point2<f32>,
    /// Window-averaged gradient of the negated field, in field units per cell.
    pub velocity: Vector2<f32>,
}

/// Averages the descent direction over a square window around `current`.
///
/// The window covers `[i - w/2, i - w/2 + w)` on both axes, clipped to the grid.
pub fn smoothed_velocity(
    field: &PotentialField,
    current: Point2<f32>,
    window: usize,
) -> Result<Vector2<f32>> {
    let grid = field.grid();
    let index = grid.to_grid(current);
    let half = (window / 2) as i64;
    let span = |center: i64, n: usize| {
        let start = center - half;
        let lo = start.clamp(0, n as i64) as usize;
        let hi = (start + window as i64).clamp(0, n as i64) as usize;
        lo..hi
    };
    let rows = span(index.row, grid.rows);
    let cols = span(index.col, grid.cols);
    if rows.is_empty() || cols.is_empty() {
        return Err(Error::OutOfBoundsPosition {
            x: current.x,
            y: current.y,
            index,
            rows: grid.rows,
            cols: grid.cols,
        });
    }

    let count = (rows.len() * cols.len()) as f64;
    let mut sum = Vector2::<f64>::zeros();
    for row in rows {
        for col in cols.clone() {
            sum += field.gradient_at(row, col).cast::<f64>();
        }
    }
    Ok((sum / count).cast::<f32>())
}

/// Proposes the next leader position a fixed distance along the smoothed descent direction.
pub fn plan(field: &PotentialField, current: Point2<f32>, settings: &PlannerSettings) -> Result<Step> {
    let velocity = smoothed_velocity(field, current, settings.smoothing_window)?;
    let speed = velocity.norm();
    if !(speed > MIN_VELOCITY) {
        return Err(Error::DegenerateGradient {
            x: current.x,
            y: current.y,
            magnitude: speed,
        });
    }
    let dt = settings.step_length / speed;
    let next = current + velocity * dt;
    if !(next.x.is_finite() && next.y.is_finite()) {
        return Err(Error::NonFinitePosition);
    }
    debug!(?current, ?next, speed, "planned leader step");
    Ok(Step { next, velocity })
}
