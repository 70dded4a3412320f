//! `kinobridge-hal` – the simulator as the planner sees it.
//!
//! # Modules
//!
//! - [`control`] – [`ControlApplier`]: slices control vectors into actuator
//!   commands and suppresses repeats.
//! - [`stepper`] – [`WorldStepper`]: advances simulated time in whole ticks.
//! - [`environment`] – [`PlannerEnvironment`] trait and [`SimEnvironment`],
//!   the simulator-backed implementation with its session handshake.

pub mod control;
pub mod environment;
pub mod stepper;

pub use control::ControlApplier;
pub use environment::{EnvironmentOptions, PlannerEnvironment, SimEnvironment};
pub use stepper::WorldStepper;
