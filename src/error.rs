use thiserror::Error;

use crate::grid::GridIndex;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("degenerate gradient at ({x:.3}, {y:.3}): |V| = {magnitude:e}")]
    DegenerateGradient { x: f32, y: f32, magnitude: f32 },
    #[error("position ({x:.3}, {y:.3}) maps to {index:?}, outside the {rows}x{cols} field")]
    OutOfBoundsPosition {
        x: f32,
        y: f32,
        index: GridIndex,
        rows: usize,
        cols: usize,
    },
    #[error("planner produced a non-finite position")]
    NonFinitePosition,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;
