//! `kinobridge-perception` – how the planner judges simulator states.
//!
//! # Modules
//!
//! - [`goal`] – [`GoalEvaluator`][goal::GoalEvaluator]: pose distance between
//!   bodies and their targets, and the tolerance test that decides when a
//!   state reaches the goal.
//! - [`projection`] – [`RobotPlanarProjection`][projection::RobotPlanarProjection]:
//!   maps a world state to the robot's (x, y) position for grid-based
//!   exploration.

pub mod goal;
pub mod projection;

pub use goal::{GoalEvaluation, GoalEvaluator, PlannerGoal, pose_distance};
pub use projection::{PlannerProjection, RobotPlanarProjection};
