//! Planar projection of the robot body for grid-based exploration.
//!
//! Sampling planners discretise states by projecting them into a small
//! Euclidean space.  [`RobotPlanarProjection`] maps a world state to the x and
//! y coordinates of the robot body's position, on a grid with
//! [`DEFAULT_CELL_SIZES`] cells.

use kinobridge_types::{
    RealVectorBounds, SessionBounds, SimError, StateBlock, WorldState, subspace_index,
};
use tracing::debug;

/// The projection always lands in the horizontal plane.
pub const PROJECTION_DIMENSION: usize = 2;

pub const DEFAULT_CELL_SIZES: [f64; PROJECTION_DIMENSION] = [2.0, 2.0];

/// Projection interface a planner discretises states with.
pub trait PlannerProjection {
    fn dimension(&self) -> usize;

    fn cell_sizes(&self) -> &[f64];

    /// Extent of the projected space.
    fn bounds(&self) -> &RealVectorBounds;

    /// Write the projection of `state` into `out`.
    ///
    /// # Errors
    ///
    /// [`SimError::DimensionMismatch`] when `out` is not [`dimension`] long,
    /// [`SimError::MalformedState`] when `state` lacks the projected body.
    ///
    /// [`dimension`]: PlannerProjection::dimension
    fn project(&self, state: &WorldState, out: &mut [f64]) -> Result<(), SimError>;
}

/// Projects onto the (x, y) position of one body, the robot.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotPlanarProjection {
    robot_body: usize,
    cell_sizes: [f64; PROJECTION_DIMENSION],
    bounds: RealVectorBounds,
}

impl RobotPlanarProjection {
    /// # Errors
    ///
    /// [`SimError::Config`] when `robot_body` is not a body of the session or
    /// the position bounds have fewer than two dimensions.
    pub fn new(robot_body: usize, bounds: &SessionBounds) -> Result<Self, SimError> {
        if robot_body >= bounds.body_count {
            return Err(SimError::Config(format!(
                "robot body {robot_body} out of range for {} bodies",
                bounds.body_count
            )));
        }
        let (Some(low), Some(high)) = (
            bounds.position.low.get(..PROJECTION_DIMENSION),
            bounds.position.high.get(..PROJECTION_DIMENSION),
        ) else {
            return Err(SimError::Config(format!(
                "position bounds have {} dimensions, projection needs {PROJECTION_DIMENSION}",
                bounds.position.dimension()
            )));
        };
        let planar = RealVectorBounds {
            low: low.to_vec(),
            high: high.to_vec(),
        };
        debug!(
            robot_body,
            subspace = subspace_index(robot_body, StateBlock::Position),
            "planar projection ready"
        );
        Ok(Self {
            robot_body,
            cell_sizes: DEFAULT_CELL_SIZES,
            bounds: planar,
        })
    }

    pub fn with_cell_sizes(mut self, cell_sizes: [f64; PROJECTION_DIMENSION]) -> Self {
        self.cell_sizes = cell_sizes;
        self
    }

    pub fn robot_body(&self) -> usize {
        self.robot_body
    }

    /// Index of the projected position block in the compound state space.
    pub fn subspace_index(&self) -> usize {
        subspace_index(self.robot_body, StateBlock::Position)
    }

    /// The robot's (x, y) position in `state`.
    pub fn project_xy(&self, state: &WorldState) -> Result<[f64; PROJECTION_DIMENSION], SimError> {
        let body = state.body(self.robot_body).ok_or_else(|| {
            SimError::MalformedState(format!(
                "state has {} bodies, projection needs body {}",
                state.body_count(),
                self.robot_body
            ))
        })?;
        Ok([body.position.x, body.position.y])
    }
}

impl PlannerProjection for RobotPlanarProjection {
    fn dimension(&self) -> usize {
        PROJECTION_DIMENSION
    }

    fn cell_sizes(&self) -> &[f64] {
        &self.cell_sizes
    }

    fn bounds(&self) -> &RealVectorBounds {
        &self.bounds
    }

    fn project(&self, state: &WorldState, out: &mut [f64]) -> Result<(), SimError> {
        if out.len() != PROJECTION_DIMENSION {
            return Err(SimError::DimensionMismatch {
                expected: PROJECTION_DIMENSION,
                actual: out.len(),
            });
        }
        out.copy_from_slice(&self.project_xy(state)?);
        Ok(())
    }
}
