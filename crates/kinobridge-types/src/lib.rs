//! `kinobridge-types` – shared vocabulary of the planner/simulator bridge.
//!
//! Every other crate in the workspace speaks in these types: rigid-body and
//! world states in the planner's fixed layout, the simulator's control
//! description, goal criteria, bounds, and the single [`SimError`] taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (position or velocity).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// An orientation quaternion in `(w, x, y, z)` order, the order the simulator
/// uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Four-dimensional inner product.
    pub fn dot(self, rhs: Self) -> f64 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// `-q`, which encodes the same rotation as `q`.
    pub fn negated(self) -> Self {
        Self::new(-self.w, -self.x, -self.y, -self.z)
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.w, self.x, self.y, self.z]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 4]> for Quaternion {
    fn from(q: [f64; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State layout
// ────────────────────────────────────────────────────────────────────────────

/// Number of sub-blocks each body occupies in the planner's state vector.
pub const BLOCKS_PER_BODY: usize = 4;

/// Number of scalars each body occupies in the flat state vector.
pub const SCALARS_PER_BODY: usize = 13;

/// One of the four sub-blocks of a body in the planner's state layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateBlock {
    Position = 0,
    LinearVelocity = 1,
    AngularVelocity = 2,
    Orientation = 3,
}

/// Index of `block` of body `body` among the planner's state subspaces.
///
/// ```
/// use kinobridge_types::{subspace_index, StateBlock};
///
/// assert_eq!(subspace_index(1, StateBlock::Position), 4);
/// assert_eq!(subspace_index(2, StateBlock::Orientation), 11);
/// ```
pub fn subspace_index(body: usize, block: StateBlock) -> usize {
    body * BLOCKS_PER_BODY + block as usize
}

/// Kinematic state of one simulated rigid body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RigidBodyState {
    pub position: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub orientation: Quaternion,
}

impl RigidBodyState {
    /// A body at rest at `position` with the given orientation.
    pub fn at_rest(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            linear_velocity: Vec3::zero(),
            angular_velocity: Vec3::zero(),
            orientation,
        }
    }

    /// Position and orientation of this body.
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
        }
    }
}

/// State of every body in the session, in the simulator's stable body order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldState {
    pub bodies: Vec<RigidBodyState>,
}

impl WorldState {
    pub fn new(bodies: Vec<RigidBodyState>) -> Self {
        Self { bodies }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn body(&self, index: usize) -> Option<&RigidBodyState> {
        self.bodies.get(index)
    }

    /// Flatten into the planner's state vector: for every body, position,
    /// linear velocity, angular velocity, then `w, x, y, z`.
    pub fn to_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.bodies.len() * SCALARS_PER_BODY);
        for body in &self.bodies {
            flat.extend_from_slice(&body.position.to_array());
            flat.extend_from_slice(&body.linear_velocity.to_array());
            flat.extend_from_slice(&body.angular_velocity.to_array());
            flat.extend_from_slice(&body.orientation.to_array());
        }
        flat
    }

    /// Inverse of [`to_flat`][Self::to_flat].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::MalformedState`] when `flat` is not a whole number
    /// of bodies.
    pub fn from_flat(flat: &[f64]) -> Result<Self, SimError> {
        if flat.len() % SCALARS_PER_BODY != 0 {
            return Err(SimError::MalformedState(format!(
                "flat state has {} scalars, not a multiple of {SCALARS_PER_BODY}",
                flat.len()
            )));
        }
        let bodies = flat
            .chunks_exact(SCALARS_PER_BODY)
            .map(|c| RigidBodyState {
                position: Vec3::new(c[0], c[1], c[2]),
                linear_velocity: Vec3::new(c[3], c[4], c[5]),
                angular_velocity: Vec3::new(c[6], c[7], c[8]),
                orientation: Quaternion::new(c[9], c[10], c[11], c[12]),
            })
            .collect();
        Ok(Self { bodies })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goal
// ────────────────────────────────────────────────────────────────────────────

/// Target position and orientation of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

/// One component of the goal: body `body` should reach `target`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalCriterion {
    pub body: usize,
    pub target: Pose,
}

// ────────────────────────────────────────────────────────────────────────────
// Controls
// ────────────────────────────────────────────────────────────────────────────

/// A named actuator input consuming `dimension` consecutive control values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChannel {
    /// Simulator-side component name, e.g. `"robot.motion"`.
    pub name: String,
    /// Service invoked on the component, e.g. `"set_speed"`.
    pub template: String,
    pub dimension: usize,
}

/// Actuator layout of the control vector, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlDescriptor {
    dimension: usize,
    channels: Vec<ControlChannel>,
}

impl ControlDescriptor {
    /// Build a descriptor, checking that the channels cover exactly
    /// `dimension` control values.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidDescriptor`] when the channel
    /// dimensionalities do not sum to `dimension`.
    pub fn new(dimension: usize, channels: Vec<ControlChannel>) -> Result<Self, SimError> {
        let covered: usize = channels.iter().map(|c| c.dimension).sum();
        if covered != dimension {
            return Err(SimError::InvalidDescriptor(format!(
                "channels consume {covered} control values but the control space has {dimension}"
            )));
        }
        Ok(Self {
            dimension,
            channels,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn channels(&self) -> &[ControlChannel] {
        &self.channels
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Bounds
// ────────────────────────────────────────────────────────────────────────────

/// Per-dimension lower/upper bounds of a real vector subspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealVectorBounds {
    pub low: Vec<f64>,
    pub high: Vec<f64>,
}

impl RealVectorBounds {
    /// Bounds from `(low, high)` pairs, one per dimension.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self {
            low: pairs.iter().map(|p| p.0).collect(),
            high: pairs.iter().map(|p| p.1).collect(),
        }
    }

    /// `dimension` dimensions of `(-inf, inf)`.
    pub fn unbounded(dimension: usize) -> Self {
        Self {
            low: vec![f64::NEG_INFINITY; dimension],
            high: vec![f64::INFINITY; dimension],
        }
    }

    pub fn dimension(&self) -> usize {
        self.low.len()
    }

    /// `true` when every `low[i] <= high[i]` and both vectors agree in length.
    pub fn is_valid(&self) -> bool {
        self.low.len() == self.high.len()
            && self.low.iter().zip(&self.high).all(|(lo, hi)| lo <= hi)
    }
}

/// Every bound the planner's state and control spaces are built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBounds {
    pub body_count: usize,
    /// Shared by all bodies.
    pub position: RealVectorBounds,
    pub linear_velocity: RealVectorBounds,
    pub angular_velocity: RealVectorBounds,
    pub control: RealVectorBounds,
}

/// Propagation parameters handed to the planner with the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationParams {
    /// Seconds per propagation step.
    pub step_size: f64,
    /// Minimum number of steps a control is applied for.
    pub min_control_duration: u32,
    /// Maximum number of steps a control is applied for.
    pub max_control_duration: u32,
}

impl Default for PropagationParams {
    fn default() -> Self {
        Self {
            step_size: 0.1,
            min_control_duration: 5,
            max_control_duration: 30,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type spanning the transport, the simulator's replies, and caller
/// mistakes.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimError {
    /// The RPC channel is broken or returned an undecodable reply.  Fatal for
    /// the session.
    #[error("Transport Failure: {0}")]
    TransportFailure(String),

    #[error("Malformed State: {0}")]
    MalformedState(String),

    #[error("Dimension Mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid Control Description: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid Duration: {0} is not a finite number of seconds")]
    InvalidDuration(f64),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(seed: f64) -> RigidBodyState {
        RigidBodyState {
            position: Vec3::new(seed, seed + 1.0, seed + 2.0),
            linear_velocity: Vec3::new(0.1, 0.2, 0.3),
            angular_velocity: Vec3::new(-0.1, -0.2, -0.3),
            orientation: Quaternion::new(0.5, 0.5, 0.5, 0.5),
        }
    }

    #[test]
    fn flat_layout_is_four_blocks_per_body() {
        let world = WorldState::new(vec![body(0.0), body(10.0)]);
        let flat = world.to_flat();
        assert_eq!(flat.len(), 2 * SCALARS_PER_BODY);
        // Second body's position starts after the first body's 13 scalars.
        assert_eq!(&flat[13..16], &[10.0, 11.0, 12.0]);
        // Orientation is stored w first.
        assert_eq!(&flat[9..13], &[0.5, 0.5, 0.5, 0.5]);

        let back = WorldState::from_flat(&flat).unwrap();
        assert_eq!(back, world);
    }

    #[test]
    fn from_flat_rejects_partial_body() {
        let result = WorldState::from_flat(&[0.0; 14]);
        assert!(matches!(result, Err(SimError::MalformedState(_))));
    }

    #[test]
    fn descriptor_requires_channels_to_cover_dimension() {
        let channels = vec![
            ControlChannel {
                name: "robot.motion".to_string(),
                template: "set_speed".to_string(),
                dimension: 2,
            },
            ControlChannel {
                name: "robot.arm".to_string(),
                template: "set_rotation".to_string(),
                dimension: 1,
            },
        ];
        assert!(ControlDescriptor::new(3, channels.clone()).is_ok());
        assert!(matches!(
            ControlDescriptor::new(4, channels),
            Err(SimError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn quaternion_negation_preserves_dot_magnitude() {
        let q = Quaternion::new(0.5, 0.5, 0.5, 0.5);
        assert!((q.dot(q) - 1.0).abs() < 1e-12);
        assert!((q.dot(q.negated()) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_validity() {
        assert!(RealVectorBounds::from_pairs(&[(-10.0, 10.0), (-1.0, 1.0)]).is_valid());
        assert!(RealVectorBounds::unbounded(3).is_valid());
        assert!(!RealVectorBounds::from_pairs(&[(1.0, -1.0)]).is_valid());
    }

    #[test]
    fn world_state_serialization_roundtrip() {
        let world = WorldState::new(vec![body(1.0)]);
        let json = serde_json::to_string(&world).unwrap();
        let back: WorldState = serde_json::from_str(&json).unwrap();
        assert_eq!(world, back);
    }

    #[test]
    fn sim_error_display() {
        let err = SimError::DimensionMismatch {
            expected: 2,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 2"));

        let err2 = SimError::TransportFailure("connection closed".to_string());
        assert!(err2.to_string().contains("Transport Failure"));
    }
}
