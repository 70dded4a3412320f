//! Planning session – one simulator connection, fully wired for a planner.
//!
//! [`PlanningSession`] owns the [`SimEnvironment`] together with the
//! [`GoalEvaluator`] and [`RobotPlanarProjection`] built from the scene the
//! simulator reports.  Everything it logs is nested under a
//! `planning_session` span carrying a random session id, so interleaved
//! sessions stay distinguishable in aggregated logs and traces.
//!
//! # Example
//!
//! ```rust,no_run
//! use kinobridge_runtime::{BridgeConfig, PlanningSession};
//!
//! let config = BridgeConfig::load("kinobridge.toml")?;
//! let mut session = PlanningSession::open(&config)?;
//! let eval = session.evaluate_current()?;
//! println!("distance to goal: {}", eval.distance);
//! session.end()?;
//! # Ok::<(), kinobridge_types::SimError>(())
//! ```

use kinobridge_hal::{PlannerEnvironment, SimEnvironment};
use kinobridge_middleware::{RpcClient, TcpTransport, Transport};
use kinobridge_perception::{GoalEvaluation, GoalEvaluator, RobotPlanarProjection};
use kinobridge_types::{SessionBounds, SimError, WorldState};
use tracing::{Span, debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::BridgeConfig;

/// A connected simulator plus the goal and projection of its scene.
pub struct PlanningSession<T: Transport> {
    id: Uuid,
    span: Span,
    env: SimEnvironment<T>,
    goal: GoalEvaluator,
    projection: RobotPlanarProjection,
}

impl PlanningSession<TcpTransport> {
    /// Connect to the simulator described by `config.simulator` and run the
    /// session handshake.
    ///
    /// # Errors
    ///
    /// [`SimError::Config`] for invalid configuration,
    /// [`SimError::TransportFailure`] when the simulator is unreachable, and
    /// any error [`PlanningSession::from_transport`] reports.
    pub fn open(config: &BridgeConfig) -> Result<Self, SimError> {
        config.validate()?;
        let sim = &config.simulator;
        let transport = TcpTransport::connect(
            &sim.host,
            sim.request_port,
            sim.command_port,
            sim.rpc_timeout(),
            sim.framing,
        )?;
        Self::from_transport(transport, config)
    }
}

impl<T: Transport> PlanningSession<T> {
    /// Run the handshake over an already-open transport, then fetch the goal
    /// criteria and build the goal and projection.
    ///
    /// # Errors
    ///
    /// * [`SimError::Config`] for invalid configuration or a robot body the
    ///   scene does not have;
    /// * [`SimError::MalformedState`] when a goal criterion names a missing
    ///   body;
    /// * anything [`SimEnvironment::connect`] reports.
    pub fn from_transport(transport: T, config: &BridgeConfig) -> Result<Self, SimError> {
        config.validate()?;
        let id = Uuid::new_v4();
        let span = info_span!("planning_session", session_id = %id);

        let (env, goal, projection) = span.in_scope(|| {
            let mut env = SimEnvironment::connect(
                RpcClient::new(transport),
                config.to_environment_options(),
            )?;
            let criteria = env.goal_criteria()?;
            let body_count = env.bounds().body_count;
            let goal = GoalEvaluator::new(criteria, body_count, config.session.goal_tolerance)?;
            let projection = RobotPlanarProjection::new(config.session.robot_body, env.bounds())?
                .with_cell_sizes(config.session.cell_sizes);
            info!(
                criteria = goal.criteria().len(),
                robot_body = projection.robot_body(),
                "planning session ready"
            );
            Ok::<_, SimError>((env, goal, projection))
        })?;

        Ok(Self {
            id,
            span,
            env,
            goal,
            projection,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.env.is_running()
    }

    pub fn bounds(&self) -> &SessionBounds {
        self.env.bounds()
    }

    pub fn environment(&self) -> &SimEnvironment<T> {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut SimEnvironment<T> {
        &mut self.env
    }

    pub fn goal(&self) -> &GoalEvaluator {
        &self.goal
    }

    pub fn projection(&self) -> &RobotPlanarProjection {
        &self.projection
    }

    /// One planner propagation: place the world in `start`, hold `control`
    /// for `duration` seconds and return the resulting world.
    ///
    /// # Errors
    ///
    /// The first error of the write, apply, step and read sequence.  A
    /// transport failure ends the session.
    pub fn propagate(
        &mut self,
        start: &WorldState,
        control: &[f64],
        duration: f64,
    ) -> Result<WorldState, SimError> {
        let span = self.span.clone();
        let _entered = span.enter();
        let result = self.propagate_inner(start, control, duration);
        match &result {
            Ok(_) => debug!(duration, "propagated"),
            Err(e) => warn!(error = %e, "propagation failed"),
        }
        result
    }

    fn propagate_inner(
        &mut self,
        start: &WorldState,
        control: &[f64],
        duration: f64,
    ) -> Result<WorldState, SimError> {
        self.env.write_state(start)?;
        self.env.apply_control(control)?;
        self.env.world_step(duration)?;
        self.env.read_state()
    }

    /// Read the simulator's world and evaluate it against the goal.
    pub fn evaluate_current(&mut self) -> Result<GoalEvaluation, SimError> {
        let _entered = self.span.enter();
        let state = self.env.read_state()?;
        self.goal.evaluate(&state)
    }

    /// End the simulation.  Safe to call more than once.
    pub fn end(&mut self) -> Result<(), SimError> {
        let _entered = self.span.enter();
        self.env.end_simulation()
    }
}
