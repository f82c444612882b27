//! Frame sinks for snapshots. Nothing in here feeds back into planning.

use std::fs;
use std::path::{Path, PathBuf};

use colors_transform::{Color, Hsl};
use image::{Rgb, RgbImage};
use nalgebra::{Point2, Vector2};
use tracing::{debug, info};

use crate::error::Result;
use crate::grid::{GridIndex, GridSpec};
use crate::obstacles::Wall;
use crate::params::Parameters;
use crate::simulation::Snapshot;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const RED: Rgb<u8> = Rgb([220, 30, 30]);
const GREEN: Rgb<u8> = Rgb([30, 200, 60]);
const YELLOW: Rgb<u8> = Rgb([250, 220, 40]);
const GREY: Rgb<u8> = Rgb([110, 110, 110]);
const SKY: Rgb<u8> = Rgb([150, 210, 255]);
const MAGENTA: Rgb<u8> = Rgb([235, 60, 235]);

/// Cells between quiver arrows, along both axes.
const QUIVER_STRIDE: usize = 10;
/// Quiver arrow length in meters.
const QUIVER_LENGTH: f32 = 0.07;

pub trait FrameSink {
    fn write_frame(&mut self, snapshot: &Snapshot) -> Result<()>;

    /// Flushes the sink and returns the number of frames written.
    fn finish(&mut self) -> Result<usize>;
}

/// Discards frames, only counting them.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: usize,
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, _snapshot: &Snapshot) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<usize> {
        Ok(self.frames)
    }
}

/// Runs `body` with `sink` and always finishes the sink afterwards.
///
/// An error from `body` wins over an error from `finish`.
pub fn with_sink<S, T, F>(mut sink: S, body: F) -> Result<(T, usize)>
where
    S: FrameSink,
    F: FnOnce(&mut S) -> Result<T>,
{
    let out = body(&mut sink);
    let finished = sink.finish();
    let out = out?;
    Ok((out, finished?))
}

/// Static scene geometry drawn under every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub grid: GridSpec,
    pub walls: Vec<Wall>,
    pub obstacle_radius: f32,
    pub start: Point2<f32>,
    pub goal: Point2<f32>,
}

impl From<&Parameters> for Scene {
    fn from(params: &Parameters) -> Self {
        Scene {
            grid: params.grid,
            walls: params.walls.clone(),
            obstacle_radius: params.obstacle_radius,
            start: params.start,
            goal: params.goal,
        }
    }
}

/// Writes one PNG per frame into a directory.
pub struct PngSink {
    dir: PathBuf,
    scene: Scene,
    frame: usize,
}

impl PngSink {
    pub fn create<P: AsRef<Path>>(dir: P, scene: Scene) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("writing frames to {}", dir.display());
        Ok(PngSink {
            dir,
            scene,
            frame: 0,
        })
    }

    pub fn frame_path(&self, frame: usize) -> PathBuf {
        self.dir.join(format!("frame_{:0>8}.png", frame))
    }
}

impl FrameSink for PngSink {
    fn write_frame(&mut self, snapshot: &Snapshot) -> Result<()> {
        let img = draw(&self.scene, snapshot);
        let path = self.frame_path(self.frame);
        img.save(&path)?;
        debug!("wrote {}", path.display());
        self.frame += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<usize> {
        info!(frames = self.frame, "frame sink closed");
        Ok(self.frame)
    }
}

fn heat(t: f32) -> Rgb<u8> {
    let rgb = Hsl::from(240.0 * (1.0 - t.clamp(0.0, 1.0)), 80.0, 35.0).to_rgb();
    Rgb([
        rgb.get_red() as u8,
        rgb.get_green() as u8,
        rgb.get_blue() as u8,
    ])
}

struct Canvas<'a> {
    img: RgbImage,
    grid: &'a GridSpec,
}

impl Canvas<'_> {
    /// World point to pixel; rows grow downwards in the image, `y` grows upwards.
    fn pixel(&self, p: Point2<f32>) -> Option<(u32, u32)> {
        let (row, col) = self.grid.checked(self.grid.to_grid(p))?;
        Some((col as u32, (self.grid.rows - 1 - row) as u32))
    }

    fn dot(&mut self, p: Point2<f32>, radius: f32, colour: Rgb<u8>) {
        let r = self.grid.cells(radius).max(1.0);
        let steps = r.ceil() as i32;
        let Some((cx, cy)) = self.pixel(p) else {
            return;
        };
        for dy in -steps..=steps {
            for dx in -steps..=steps {
                if ((dx * dx + dy * dy) as f32) >= r * r {
                    continue;
                }
                let (x, y) = (cx as i32 + dx, cy as i32 + dy);
                if x >= 0 && y >= 0 && (x as u32) < self.img.width() && (y as u32) < self.img.height() {
                    self.img.put_pixel(x as u32, y as u32, colour);
                }
            }
        }
    }

    fn line(&mut self, a: Point2<f32>, b: Point2<f32>, colour: Rgb<u8>) {
        let samples = (self.grid.cells((b - a).norm()) * 2.0).ceil().max(1.0) as usize;
        for i in 0..=samples {
            let p = a + (b - a) * (i as f32 / samples as f32);
            if let Some((x, y)) = self.pixel(p) {
                self.img.put_pixel(x, y, colour);
            }
        }
    }

    /// Line from `from` along `v`, with a short head at its tip.
    fn arrow(&mut self, from: Point2<f32>, v: Vector2<f32>, colour: Rgb<u8>) {
        let tip = from + v;
        self.line(from, tip, colour);
        let head = v * 0.25;
        let side = Vector2::new(-head.y, head.x) * 0.5;
        self.line(tip, tip - head + side, colour);
        self.line(tip, tip - head - side, colour);
    }

    fn polyline(&mut self, points: &[Point2<f32>], colour: Rgb<u8>) {
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], colour);
        }
    }
}

/// Renders one snapshot: field heatmap with its descent quiver, walls,
/// obstacles, routes, the current formation and the leader heading.
pub fn draw(scene: &Scene, snapshot: &Snapshot) -> RgbImage {
    let grid = &scene.grid;
    let mut canvas = Canvas {
        img: RgbImage::from_pixel(grid.cols as u32, grid.rows as u32, BLACK),
        grid,
    };

    if let Some(field) = &snapshot.field {
        let values = field.values();
        let (rows, cols) = (field.grid().rows, field.grid().cols);
        let max = values.iter().copied().fold(0.0f32, f32::max);
        let norm = (1.0 + max).ln().max(f32::EPSILON);
        for row in 0..rows.min(grid.rows) {
            for col in 0..cols.min(grid.cols) {
                let t = (1.0 + values[row * cols + col].max(0.0)).ln() / norm;
                canvas
                    .img
                    .put_pixel(col as u32, (grid.rows - 1 - row) as u32, heat(t));
            }
        }

        let gradient = field.gradient();
        for row in (0..rows).step_by(QUIVER_STRIDE) {
            for col in (0..cols).step_by(QUIVER_STRIDE) {
                let Some(dir) = gradient[row * cols + col].try_normalize(f32::EPSILON) else {
                    continue;
                };
                let at = field.grid().to_world(GridIndex {
                    row: row as i64,
                    col: col as i64,
                });
                canvas.line(at, at + dir * QUIVER_LENGTH, SKY);
            }
        }
    }

    for wall in &scene.walls {
        let (rows, cols) = wall.cells(grid);
        for row in rows {
            for col in cols.clone() {
                canvas
                    .img
                    .put_pixel(col as u32, (grid.rows - 1 - row) as u32, GREY);
            }
        }
    }
    for &p in &snapshot.obstacle_positions {
        canvas.dot(p, scene.obstacle_radius, YELLOW);
    }

    canvas.polyline(&snapshot.follower_a_route, WHITE);
    canvas.polyline(&snapshot.follower_b_route, WHITE);
    canvas.polyline(&snapshot.leader_route, RED);

    if let (Some(&l), Some(&a), Some(&b)) = (
        snapshot.leader_route.last(),
        snapshot.follower_a_route.last(),
        snapshot.follower_b_route.last(),
    ) {
        canvas.line(l, a, GREEN);
        canvas.line(a, b, GREEN);
        canvas.line(b, l, GREEN);
    }
    if let Some(&l) = snapshot.leader_route.last() {
        if snapshot.velocity.norm() > 0.0 {
            canvas.arrow(l, snapshot.velocity, MAGENTA);
        }
    }

    canvas.dot(scene.start, 0.05, RED);
    canvas.dot(scene.goal, 0.05, GREEN);
    canvas.img
}
