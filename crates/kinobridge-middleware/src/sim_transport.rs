//! In-process simulator double for headless tests.
//!
//! [`SimTransport`] implements [`Transport`] against an in-memory world
//! instead of a simulator process.  It answers every request the bridge
//! issues, records each request and command, counts ticks, and decodes
//! `submitState(...)` with the same literal parser the client uses, so a full
//! session can run in CI without a simulator.
//!
//! # Stub behaviour
//!
//! | Request | Stub behaviour |
//! |---|---|
//! | `getControlDescription()` | Reports the channels registered with the builder. |
//! | `getRigidBodiesBounds()` | Reports the body count and the configured position bounds. |
//! | `extractState()` | Encodes the current world. |
//! | `submitState(...)` | Replaces the world; rejects a wrong body count. |
//! | `nextTick()` | Advances every body by `linear_velocity / tick_rate`. |
//! | `getGoalCriteria()` | Reports the configured criteria as `(body, (position, orientation))`. |
//! | `endSimulation()` | Marks the simulation ended; further requests fail. |
//!
//! # Example
//!
//! ```rust
//! use kinobridge_middleware::rpc::RpcClient;
//! use kinobridge_middleware::sim_transport::SimTransport;
//! use kinobridge_types::{Quaternion, RigidBodyState, Vec3};
//!
//! let sim = SimTransport::builder()
//!     .with_body(RigidBodyState::at_rest(Vec3::zero(), Quaternion::identity()))
//!     .with_channel("robot.motion", "set_speed", 2)
//!     .build();
//!
//! let mut rpc = RpcClient::new(sim);
//! rpc.call("nextTick()").unwrap();
//! assert_eq!(rpc.transport().tick_count(), 1);
//! ```

use std::collections::HashMap;

use kinobridge_types::{ControlChannel, GoalCriterion, RigidBodyState, SimError, WorldState};

use crate::literal::{self, Literal};
use crate::rpc::{requests, RESET_COMMAND};
use crate::state_codec::{decode_world_state, encode_world_state};
use crate::transport::Transport;

/// In-memory simulator speaking the bridge's text protocol.
pub struct SimTransport {
    world: WorldState,
    initial_world: WorldState,
    channels: Vec<ControlChannel>,
    position_bounds: [(f64, f64); 3],
    goal: Vec<GoalCriterion>,
    tick_rate_hz: f64,
    overrides: HashMap<String, String>,
    fail_after: Option<usize>,
    requests: Vec<String>,
    commands: Vec<String>,
    ticks: u64,
    resets: usize,
    ended: bool,
}

impl SimTransport {
    pub fn builder() -> SimTransportBuilder {
        SimTransportBuilder::default()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    /// Every command received, in order, including the reset command.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Commands addressed to control channels (everything except resets).
    pub fn channel_commands(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(|c| c.trim_end())
            .filter(|c| *c != RESET_COMMAND)
            .collect()
    }

    /// Number of `nextTick()` requests served.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn set_world(&mut self, world: WorldState) {
        self.world = world;
    }

    /// Forget recorded requests and commands (state and counters are kept).
    pub fn clear_log(&mut self) {
        self.requests.clear();
        self.commands.clear();
    }

    /// Reply to `request` with `raw` verbatim from now on.
    pub fn override_reply(&mut self, request: impl Into<String>, raw: impl Into<String>) {
        self.overrides.insert(request.into(), raw.into());
    }

    /// Break the connection once `n` more requests have been served.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(self.requests.len() + n);
    }

    fn closed() -> SimError {
        SimError::TransportFailure("simulator closed the connection".to_string())
    }

    fn handle(&mut self, request: &str) -> Result<Literal, SimError> {
        match request {
            requests::GET_CONTROL_DESCRIPTION => {
                let dimension: usize = self.channels.iter().map(|c| c.dimension).sum();
                let mut items = vec![Literal::Int(dimension as i64)];
                items.extend(self.channels.iter().map(|c| {
                    Literal::Seq(vec![
                        Literal::Str(c.name.clone()),
                        Literal::Str(c.template.clone()),
                        Literal::Int(c.dimension as i64),
                    ])
                }));
                Ok(Literal::Seq(items))
            }
            requests::GET_RIGID_BODIES_BOUNDS => {
                let flat = self
                    .position_bounds
                    .iter()
                    .flat_map(|&(lo, hi)| [Literal::Float(lo), Literal::Float(hi)])
                    .collect();
                Ok(Literal::Seq(vec![
                    Literal::Int(self.world.body_count() as i64),
                    Literal::Seq(flat),
                ]))
            }
            requests::EXTRACT_STATE => literal::parse(&encode_world_state(&self.world))
                .map_err(|e| SimError::TransportFailure(e.to_string())),
            requests::NEXT_TICK => {
                let dt = 1.0 / self.tick_rate_hz;
                for body in &mut self.world.bodies {
                    body.position.x += body.linear_velocity.x * dt;
                    body.position.y += body.linear_velocity.y * dt;
                    body.position.z += body.linear_velocity.z * dt;
                }
                self.ticks += 1;
                Ok(Literal::None)
            }
            requests::GET_GOAL_CRITERIA => Ok(Literal::Seq(
                self.goal
                    .iter()
                    .map(|c| {
                        let floats = |v: &[f64]| {
                            Literal::Seq(v.iter().map(|x| Literal::Float(*x)).collect())
                        };
                        Literal::Seq(vec![
                            Literal::Int(c.body as i64),
                            Literal::Seq(vec![
                                floats(&c.target.position.to_array()),
                                floats(&c.target.orientation.to_array()),
                            ]),
                        ])
                    })
                    .collect(),
            )),
            requests::END_SIMULATION => {
                self.ended = true;
                Ok(Literal::None)
            }
            other => {
                let Some(arg) = other
                    .strip_prefix("submitState(")
                    .and_then(|s| s.strip_suffix(')'))
                else {
                    return Err(SimError::TransportFailure(format!(
                        "simulator does not understand '{other}'"
                    )));
                };
                let raw = literal::parse(arg)
                    .map_err(|e| SimError::TransportFailure(format!("submitState: {e}")))?;
                let world = decode_world_state(&raw, self.world.body_count())
                    .map_err(|e| SimError::TransportFailure(format!("submitState: {e}")))?;
                self.world = world;
                Ok(Literal::None)
            }
        }
    }
}

impl Transport for SimTransport {
    fn request(&mut self, payload: &str) -> Result<String, SimError> {
        if self.ended || self.fail_after.is_some_and(|n| self.requests.len() >= n) {
            return Err(Self::closed());
        }
        self.requests.push(payload.to_string());
        if let Some(raw) = self.overrides.get(payload) {
            return Ok(raw.clone());
        }
        self.handle(payload).map(|reply| reply.to_string())
    }

    fn send_command(&mut self, command: &str) -> Result<(), SimError> {
        if self.ended {
            return Err(Self::closed());
        }
        if command.trim_end() == RESET_COMMAND {
            self.world = self.initial_world.clone();
            self.resets += 1;
        }
        self.commands.push(command.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimTransport`].
pub struct SimTransportBuilder {
    bodies: Vec<RigidBodyState>,
    channels: Vec<ControlChannel>,
    position_bounds: [(f64, f64); 3],
    goal: Vec<GoalCriterion>,
    tick_rate_hz: f64,
}

impl Default for SimTransportBuilder {
    fn default() -> Self {
        Self {
            bodies: Vec::new(),
            channels: Vec::new(),
            position_bounds: [(-100.0, 100.0); 3],
            goal: Vec::new(),
            tick_rate_hz: 60.0,
        }
    }
}

impl SimTransportBuilder {
    /// Append a body; bodies keep the order they are added in.
    pub fn with_body(mut self, body: RigidBodyState) -> Self {
        self.bodies.push(body);
        self
    }

    pub fn with_channel(
        mut self,
        name: impl Into<String>,
        template: impl Into<String>,
        dimension: usize,
    ) -> Self {
        self.channels.push(ControlChannel {
            name: name.into(),
            template: template.into(),
            dimension,
        });
        self
    }

    /// Position bounds shared by all bodies, as `(low, high)` for x, y, z.
    pub fn with_position_bounds(mut self, bounds: [(f64, f64); 3]) -> Self {
        self.position_bounds = bounds;
        self
    }

    pub fn with_goal(mut self, criterion: GoalCriterion) -> Self {
        self.goal.push(criterion);
        self
    }

    pub fn with_tick_rate(mut self, hz: f64) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn build(self) -> SimTransport {
        let world = WorldState::new(self.bodies);
        SimTransport {
            initial_world: world.clone(),
            world,
            channels: self.channels,
            position_bounds: self.position_bounds,
            goal: self.goal,
            tick_rate_hz: self.tick_rate_hz,
            overrides: HashMap::new(),
            fail_after: None,
            requests: Vec::new(),
            commands: Vec::new(),
            ticks: 0,
            resets: 0,
            ended: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
