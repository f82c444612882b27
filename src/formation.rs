//! Rigid triangle formation: leader at the apex, two followers trailing it.
//!
//! Follower offsets are `-v * R * sqrt(3)/2 +/- u * R/2`, where `v` is the
//! leader heading and `u` its left perpendicular. With a unit heading the
//! triangle is equilateral with side `R`; the heading magnitude is clamped to
//! a band so the triangle neither collapses nor balloons.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormationSettings {
    pub swarm_radius: f32,
    pub scale_min: f32,
    pub scale_max: f32,
}

impl Default for FormationSettings {
    fn default() -> Self {
        FormationSettings {
            swarm_radius: 0.2,
            scale_min: 0.6,
            scale_max: 1.5,
        }
    }
}

impl FormationSettings {
    /// Magnitude the heading is clamped to for a given leader speed.
    ///
    /// An inverted band resolves to `scale_max`.
    pub fn scale(&self, speed: f32) -> f32 {
        speed.max(self.scale_min).min(self.scale_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    pub leader: Point2<f32>,
    pub follower_a: Point2<f32>,
    pub follower_b: Point2<f32>,
}

/// `v` rotated by +90 degrees.
pub fn perpendicular(v: &Vector2<f32>) -> Vector2<f32> {
    Vector2::new(-v.y, v.x)
}

fn place(leader: Point2<f32>, v: Vector2<f32>, radius: f32) -> Formation {
    let u = perpendicular(&v);
    let back = v * (radius * 3f32.sqrt() / 2.0);
    let side = u * (radius / 2.0);
    Formation {
        leader,
        follower_a: leader - back + side,
        follower_b: leader - back - side,
    }
}

impl Formation {
    /// Formation before any planning step, facing straight from start to goal.
    pub fn initial(start: Point2<f32>, goal: Point2<f32>, radius: f32) -> Self {
        let heading = (goal - start)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| Vector2::new(1.0, 0.0));
        place(start, heading, radius)
    }

    /// Followers for the leader's next point given its velocity estimate `velocity`.
    ///
    /// A zero velocity keeps the unclamped zero heading, collapsing the
    /// followers onto the leader; callers are expected to reject it first.
    pub fn follow(leader: Point2<f32>, velocity: Vector2<f32>, settings: &FormationSettings) -> Self {
        let speed = velocity.norm();
        let v = if speed < settings.scale_min || speed > settings.scale_max {
            match velocity.try_normalize(0.0) {
                Some(unit) => unit * settings.scale(speed),
                None => velocity,
            }
        } else {
            velocity
        };
        place(leader, v, settings.swarm_radius)
    }
}
