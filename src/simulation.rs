use std::sync::atomic::{AtomicBool, Ordering};

use nalgebra::{Point2, Vector2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::field::{FieldSettings, PotentialField};
use crate::formation::{Formation, FormationSettings};
use crate::obstacles::ObstacleField;
use crate::params::Parameters;
use crate::planner::{self, PlannerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Running,
    GoalReached,
    MaxIterationsReached,
    /// The smoothed gradient vanished; the leader holds its last position.
    Stalled,
    /// The leader left the field; it holds its last position.
    OutOfBounds,
    Cancelled,
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Status::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::GoalReached)
    }
}

/// Per-agent trajectory history, one point per agent per planning step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Routes {
    pub leader: Vec<Point2<f32>>,
    pub follower_a: Vec<Point2<f32>>,
    pub follower_b: Vec<Point2<f32>>,
}

impl Routes {
    pub fn push(&mut self, formation: &Formation) {
        self.leader.push(formation.leader);
        self.follower_a.push(formation.follower_a);
        self.follower_b.push(formation.follower_b);
    }

    pub fn len(&self) -> usize {
        self.leader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leader.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub start: Point2<f32>,
    pub goal: Point2<f32>,
    pub current: Point2<f32>,
    pub velocity: Vector2<f32>,
    pub iteration: usize,
    pub status: Status,
}

impl SimulationState {
    pub fn new(start: Point2<f32>, goal: Point2<f32>) -> Self {
        SimulationState {
            start,
            goal,
            current: start,
            velocity: Vector2::zeros(),
            iteration: 0,
            status: Status::Running,
        }
    }

    pub fn distance_to_goal(&self) -> f32 {
        (self.current - self.goal).norm()
    }
}

/// Everything a tick needs besides the state and the freshly built field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSettings {
    pub planner: PlannerSettings,
    pub formation: FormationSettings,
    pub goal_tolerance: f32,
    pub max_iterations: usize,
}

impl From<&Parameters> for TickSettings {
    fn from(params: &Parameters) -> Self {
        TickSettings {
            planner: PlannerSettings {
                step_length: params.step_length,
                smoothing_window: params.smoothing_window,
            },
            formation: FormationSettings {
                swarm_radius: params.swarm_radius,
                scale_min: params.formation_scale_min,
                scale_max: params.formation_scale_max,
            },
            goal_tolerance: params.goal_tolerance,
            max_iterations: params.max_iterations,
        }
    }
}

/// Moves `state` one step over `field`; yields the formation to append, if any.
pub fn transition(
    state: SimulationState,
    field: &PotentialField,
    settings: &TickSettings,
) -> Result<(SimulationState, Option<Formation>)> {
    if state.status.is_terminal() {
        return Ok((state, None));
    }
    if state.distance_to_goal() < settings.goal_tolerance {
        return Ok((
            SimulationState {
                status: Status::GoalReached,
                ..state
            },
            None,
        ));
    }

    let step = match planner::plan(field, state.current, &settings.planner) {
        Ok(step) => step,
        Err(Error::DegenerateGradient { magnitude, .. }) => {
            warn!(
                iteration = state.iteration,
                x = state.current.x,
                y = state.current.y,
                magnitude,
                "gradient vanished, leader stalled"
            );
            return Ok((
                SimulationState {
                    status: Status::Stalled,
                    ..state
                },
                None,
            ));
        }
        Err(Error::OutOfBoundsPosition { index, .. }) => {
            warn!(
                iteration = state.iteration,
                x = state.current.x,
                y = state.current.y,
                row = index.row,
                col = index.col,
                "leader left the field"
            );
            return Ok((
                SimulationState {
                    status: Status::OutOfBounds,
                    ..state
                },
                None,
            ));
        }
        Err(e) => return Err(e),
    };

    let formation = Formation::follow(step.next, step.velocity, &settings.formation);
    let iteration = state.iteration + 1;
    let status = if iteration >= settings.max_iterations {
        Status::MaxIterationsReached
    } else {
        Status::Running
    };
    let next = SimulationState {
        current: step.next,
        velocity: step.velocity,
        iteration,
        status,
        ..state
    };
    Ok((next, Some(formation)))
}

/// Plain data handed to renderers after each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub leader_route: Vec<Point2<f32>>,
    pub follower_a_route: Vec<Point2<f32>>,
    pub follower_b_route: Vec<Point2<f32>>,
    pub obstacle_positions: Vec<Point2<f32>>,
    pub iteration: usize,
    pub status: Status,
    pub velocity: Vector2<f32>,
    /// Field built by the last tick, when requested.
    pub field: Option<PotentialField>,
}

pub struct Simulation {
    params: Parameters,
    field_settings: FieldSettings,
    tick_settings: TickSettings,
    obstacles: ObstacleField,
    state: SimulationState,
    routes: Routes,
    field: Option<PotentialField>,
}

impl Simulation {
    pub fn new(params: Parameters) -> Result<Self> {
        params.validate()?;
        let obstacles = if params.random_map {
            let mut rng = match params.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            ObstacleField::random(
                params.num_random_obstacles,
                &params.grid,
                params.obstacle_step,
                params.moving_obstacles,
                &mut rng,
            )
        } else {
            ObstacleField::fixed(&params.obstacles, params.obstacle_step, params.moving_obstacles)
        };
        Self::with_obstacles(params, obstacles)
    }

    /// Uses an explicit obstacle set instead of the one `params` describes.
    pub fn with_obstacles(params: Parameters, obstacles: ObstacleField) -> Result<Self> {
        params.validate()?;
        let mut routes = Routes::default();
        routes.push(&Formation::initial(
            params.start,
            params.goal,
            params.swarm_radius,
        ));
        info!(
            start = ?params.start,
            goal = ?params.goal,
            obstacles = obstacles.len(),
            moving = params.moving_obstacles,
            "simulation initialised"
        );
        Ok(Simulation {
            field_settings: FieldSettings::from(&params),
            tick_settings: TickSettings::from(&params),
            state: SimulationState::new(params.start, params.goal),
            params,
            obstacles,
            routes,
            field: None,
        })
    }

    /// Runs one tick: move obstacles, rebuild the field, plan, place followers.
    ///
    /// On error the leader state is left untouched.
    pub fn tick(&mut self) -> Result<Status> {
        if self.state.status.is_terminal() {
            return Ok(self.state.status);
        }
        if self.params.moving_obstacles {
            self.obstacles.advance();
        }
        let field = PotentialField::build(
            &self.field_settings,
            &self.obstacles.positions(),
            self.state.goal,
        );
        let (state, formation) = transition(self.state, &field, &self.tick_settings)?;
        if let Some(formation) = formation {
            self.routes.push(&formation);
        }
        self.field = Some(field);
        self.state = state;
        debug!(
            iteration = state.iteration,
            distance = state.distance_to_goal(),
            status = ?state.status,
            "tick"
        );
        if state.status.is_terminal() {
            info!(
                iteration = state.iteration,
                status = ?state.status,
                "simulation finished"
            );
        }
        Ok(state.status)
    }

    pub fn run(&mut self) -> Result<Status> {
        self.run_with(None, |_| {})
    }

    /// Ticks until a terminal status, checking `cancel` before each tick and
    /// calling `observer` after each one.
    pub fn run_with<F>(&mut self, cancel: Option<&AtomicBool>, mut observer: F) -> Result<Status>
    where
        F: FnMut(&Simulation),
    {
        while !self.state.status.is_terminal() {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                info!(iteration = self.state.iteration, "simulation cancelled");
                self.state.status = Status::Cancelled;
                break;
            }
            self.tick()?;
            observer(self);
        }
        Ok(self.state.status)
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn obstacles(&self) -> &ObstacleField {
        &self.obstacles
    }

    /// Field built by the most recent tick.
    pub fn field(&self) -> Option<&PotentialField> {
        self.field.as_ref()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn snapshot(&self, include_field: bool) -> Snapshot {
        let field = if include_field {
            self.field.clone()
        } else {
            None
        };
        Snapshot {
            leader_route: self.routes.leader.clone(),
            follower_a_route: self.routes.follower_a.clone(),
            follower_b_route: self.routes.follower_b.clone(),
            obstacle_positions: self.obstacles.positions(),
            iteration: self.state.iteration,
            status: self.state.status,
            velocity: self.state.velocity,
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn open_params() -> Parameters {
        Parameters {
            random_map: false,
            moving_obstacles: false,
            obstacles: Vec::new(),
            walls: Vec::new(),
            ..Default::default()
        }
    }

    #[test]
    fn reaches_goal_in_open_field() {
        let mut sim = Simulation::new(open_params()).unwrap();
        let status = sim.run().unwrap();
        assert_eq!(status, Status::GoalReached);
        assert!(sim.state().iteration < 100);
        assert!(sim.state().distance_to_goal() < 0.1);
    }

    #[test]
    fn routes_grow_one_point_per_step() {
        let mut sim = Simulation::new(open_params()).unwrap();
        assert_eq!(sim.routes().len(), 1);
        for i in 1..=5 {
            assert_eq!(sim.tick().unwrap(), Status::Running);
            assert_eq!(sim.routes().len(), i + 1);
            assert_eq!(sim.routes().follower_a.len(), i + 1);
            assert_eq!(sim.routes().follower_b.len(), i + 1);
            assert_eq!(sim.state().iteration, i);
        }
        let leader = &sim.routes().leader;
        for pair in leader.windows(2) {
            assert_abs_diff_eq!((pair[1] - pair[0]).norm(), 0.1, epsilon = 1e-4);
        }
    }

    #[test]
    fn iteration_budget_is_terminal() {
        let params = Parameters {
            max_iterations: 3,
            ..open_params()
        };
        let mut sim = Simulation::new(params).unwrap();
        assert_eq!(sim.run().unwrap(), Status::MaxIterationsReached);
        assert_eq!(sim.state().iteration, 3);
        assert_eq!(sim.routes().len(), 4);
        // further ticks are no-ops
        assert_eq!(sim.tick().unwrap(), Status::MaxIterationsReached);
        assert_eq!(sim.routes().len(), 4);
    }

    #[test]
    fn goal_check_precedes_planning() {
        let params = Parameters {
            start: Point2::new(1.95, -1.95),
            ..open_params()
        };
        let mut sim = Simulation::new(params).unwrap();
        assert_eq!(sim.tick().unwrap(), Status::GoalReached);
        assert_eq!(sim.state().iteration, 0);
        assert_eq!(sim.routes().len(), 1);
    }

    #[test]
    fn flat_field_stalls_instead_of_dividing_by_zero() {
        let params = Parameters {
            attractive_gain: f32::MIN_POSITIVE,
            ..open_params()
        };
        let mut sim = Simulation::new(params).unwrap();
        assert_eq!(sim.run().unwrap(), Status::Stalled);
        assert_eq!(sim.state().current, Point2::new(-2.0, 2.0));
        assert_eq!(sim.routes().len(), 1);
    }

    #[test]
    fn leader_outside_the_field_ends_the_run() {
        let params = Parameters {
            start: Point2::new(-3.0, 2.0),
            ..open_params()
        };
        let mut sim = Simulation::new(params).unwrap();
        assert_eq!(sim.tick().unwrap(), Status::OutOfBounds);
        assert!(sim.status().is_terminal());
        assert!(!sim.status().is_success());
        assert_eq!(sim.state().current, Point2::new(-3.0, 2.0));
        assert_eq!(sim.routes().len(), 1);
        assert_eq!(sim.run().unwrap(), Status::OutOfBounds);
    }

    #[test]
    fn seeded_default_map_always_ends_in_a_terminal_status() {
        // seed 12 drifts the leader past the right edge of the field
        for seed in [12, 15] {
            let params = Parameters {
                seed: Some(seed),
                ..Default::default()
            };
            let mut sim = Simulation::new(params).unwrap();
            let status = sim.run().unwrap();
            assert!(status.is_terminal(), "seed {seed}: {status:?}");
            assert_eq!(sim.snapshot(false).status, status);
            assert_eq!(sim.tick().unwrap(), status);
        }
    }

    #[test]
    fn explicit_obstacles_are_validated_too() {
        let params = Parameters {
            formation_scale_min: 2.0,
            formation_scale_max: 1.0,
            ..open_params()
        };
        assert!(matches!(
            Simulation::with_obstacles(params, ObstacleField::default()),
            Err(Error::InvalidConfiguration(_))
        ));

        let mut params = open_params();
        params.grid.rows = 0;
        params.grid.cols = 0;
        assert!(matches!(
            Simulation::with_obstacles(params, ObstacleField::default()),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn cancel_flag_stops_the_loop() {
        let mut sim = Simulation::new(open_params()).unwrap();
        let cancel = AtomicBool::new(false);
        let mut ticks = 0;
        let status = sim
            .run_with(Some(&cancel), |sim| {
                ticks += 1;
                if sim.state().iteration == 4 {
                    cancel.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();
        assert_eq!(status, Status::Cancelled);
        assert_eq!(ticks, 4);
    }

    #[test]
    fn invalid_parameters_are_rejected_up_front() {
        let params = Parameters {
            formation_scale_min: 2.0,
            formation_scale_max: 1.0,
            ..open_params()
        };
        assert!(matches!(
            Simulation::new(params),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn snapshot_carries_field_on_request() {
        let mut sim = Simulation::new(open_params()).unwrap();
        assert!(sim.snapshot(true).field.is_none());
        sim.tick().unwrap();
        let snapshot = sim.snapshot(true);
        let field = snapshot.field.unwrap();
        assert_eq!((field.grid().rows, field.grid().cols), (500, 500));
        assert_eq!(field.values().len(), 500 * 500);
        assert_eq!(snapshot.leader_route.len(), 2);
        assert!(sim.snapshot(false).field.is_none());
    }
}
