//! The planner-facing environment.
//!
//! A kinodynamic planner never talks to the simulator directly: it is handed
//! something implementing [`PlannerEnvironment`] and treats it as a
//! state-transition oracle.  [`SimEnvironment`] is the implementation backed
//! by a live simulator session.
//!
//! # Session handshake
//!
//! [`SimEnvironment::connect`] runs, in order:
//!
//! 1. `getControlDescription()` – control dimension and actuator channels;
//! 2. `getRigidBodiesBounds()` – body count and position bounds;
//! 3. `id simulation reset_objects` on the command channel, because the
//!    simulator keeps running while the planner initialises.

use kinobridge_middleware::descriptor::{decode_body_bounds, decode_control_description};
use kinobridge_middleware::rpc::{requests, RpcClient, RESET_COMMAND};
use kinobridge_middleware::state_codec::{
    decode_goal_criteria, decode_world_state, encode_world_state,
};
use kinobridge_middleware::transport::Transport;
use kinobridge_types::{
    GoalCriterion, PropagationParams, RealVectorBounds, SessionBounds, SimError, WorldState,
};
use tracing::{debug, info};

use crate::control::ControlApplier;
use crate::stepper::{WorldStepper, DEFAULT_TICK_RATE_HZ};

/// Operations a sampling-based planner needs from its environment.
///
/// Every call is synchronous.  Implementations are used from a single
/// planning thread; parallel planners hold one environment per worker.
pub trait PlannerEnvironment {
    /// Bounds of the state and control spaces.
    fn bounds(&self) -> &SessionBounds;

    fn propagation(&self) -> PropagationParams;

    fn control_dimension(&self) -> usize;

    /// Read the simulator's current world.
    fn read_state(&mut self) -> Result<WorldState, SimError>;

    /// Overwrite the simulator's world with `state`.
    fn write_state(&mut self, state: &WorldState) -> Result<(), SimError>;

    /// Apply `control` until it is changed.
    fn apply_control(&mut self, control: &[f64]) -> Result<(), SimError>;

    /// Advance simulated time by `duration` seconds.
    fn world_step(&mut self, duration: f64) -> Result<(), SimError>;

    /// The goal this scene defines.
    fn goal_criteria(&mut self) -> Result<Vec<GoalCriterion>, SimError>;
}

/// Session options not reported by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentOptions {
    /// `(low, high)` per control dimension.
    pub control_bounds: Vec<(f64, f64)>,
    pub tick_rate_hz: f64,
    pub propagation: PropagationParams,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            control_bounds: vec![(-10.0, 10.0), (-1.0, 1.0)],
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            propagation: PropagationParams::default(),
        }
    }
}

/// [`PlannerEnvironment`] backed by a simulator session.
pub struct SimEnvironment<T: Transport> {
    rpc: RpcClient<T>,
    applier: ControlApplier,
    stepper: WorldStepper,
    bounds: SessionBounds,
    propagation: PropagationParams,
}

impl<T: Transport> SimEnvironment<T> {
    /// Run the session handshake over `rpc`.
    ///
    /// # Errors
    ///
    /// * [`SimError::TransportFailure`] if any handshake call fails;
    /// * [`SimError::InvalidDescriptor`] / [`SimError::MalformedState`] for
    ///   inconsistent handshake replies;
    /// * [`SimError::Config`] when `options.control_bounds` does not match the
    ///   control dimension or has inverted bounds.
    pub fn connect(mut rpc: RpcClient<T>, options: EnvironmentOptions) -> Result<Self, SimError> {
        let descriptor = decode_control_description(&rpc.call(requests::GET_CONTROL_DESCRIPTION)?)?;
        let body_bounds = decode_body_bounds(&rpc.call(requests::GET_RIGID_BODIES_BOUNDS)?)?;

        let control = RealVectorBounds::from_pairs(&options.control_bounds);
        if control.dimension() != descriptor.dimension() {
            return Err(SimError::Config(format!(
                "{} control bounds configured for a {}-dimensional control space",
                control.dimension(),
                descriptor.dimension()
            )));
        }
        if !control.is_valid() {
            return Err(SimError::Config(
                "control bounds have a lower bound above its upper bound".to_string(),
            ));
        }

        let bounds = SessionBounds {
            body_count: body_bounds.body_count,
            position: body_bounds.position,
            linear_velocity: RealVectorBounds::unbounded(3),
            angular_velocity: RealVectorBounds::unbounded(3),
            control,
        };

        rpc.send(RESET_COMMAND)?;
        info!(
            bodies = bounds.body_count,
            control_dimension = descriptor.dimension(),
            channels = descriptor.channels().len(),
            "simulator session initialised"
        );

        Ok(Self {
            rpc,
            applier: ControlApplier::new(descriptor),
            stepper: WorldStepper::new(options.tick_rate_hz),
            bounds,
            propagation: options.propagation,
        })
    }

    pub fn is_running(&self) -> bool {
        self.rpc.is_running()
    }

    pub fn rpc(&self) -> &RpcClient<T> {
        &self.rpc
    }

    pub fn rpc_mut(&mut self) -> &mut RpcClient<T> {
        &mut self.rpc
    }

    pub fn applier(&self) -> &ControlApplier {
        &self.applier
    }

    /// Tell the simulator to shut down.  A no-op once the session has stopped.
    pub fn end_simulation(&mut self) -> Result<(), SimError> {
        self.rpc.shutdown()
    }
}

impl<T: Transport> PlannerEnvironment for SimEnvironment<T> {
    fn bounds(&self) -> &SessionBounds {
        &self.bounds
    }

    fn propagation(&self) -> PropagationParams {
        self.propagation
    }

    fn control_dimension(&self) -> usize {
        self.applier.descriptor().dimension()
    }

    fn read_state(&mut self) -> Result<WorldState, SimError> {
        let raw = self.rpc.call(requests::EXTRACT_STATE)?;
        decode_world_state(&raw, self.bounds.body_count)
    }

    fn write_state(&mut self, state: &WorldState) -> Result<(), SimError> {
        if state.body_count() != self.bounds.body_count {
            return Err(SimError::MalformedState(format!(
                "cannot submit {} bodies to a {}-body session",
                state.body_count(),
                self.bounds.body_count
            )));
        }
        self.rpc
            .call(&requests::submit_state(&encode_world_state(state)))?;
        debug!(bodies = state.body_count(), "state submitted");
        Ok(())
    }

    fn apply_control(&mut self, control: &[f64]) -> Result<(), SimError> {
        self.applier.apply(&mut self.rpc, control).map(|_| ())
    }

    fn world_step(&mut self, duration: f64) -> Result<(), SimError> {
        self.stepper.step(&mut self.rpc, duration).map(|_| ())
    }

    fn goal_criteria(&mut self) -> Result<Vec<GoalCriterion>, SimError> {
        let raw = self.rpc.call(requests::GET_GOAL_CRITERIA)?;
        decode_goal_criteria(&raw)
    }
}
