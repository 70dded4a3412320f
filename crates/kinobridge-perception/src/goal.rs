//! Goal distance and satisfaction.
//!
//! The goal is an ordered list of [`GoalCriterion`]s, each asking one body to
//! reach a target pose.  The per-criterion distance is
//!
//! ```text
//! |p_c - p_t|²  +  (1 - (q_c · q_t)²)
//! ```
//!
//! The orientation term is 0 for identical rotations, including `q` against
//! `-q` (both encode the same rotation), and stays within `[0, 1]` for unit
//! quaternions.  A state satisfies the goal when the summed distance over all
//! criteria is at most `tolerance * criteria_count`.
//!
//! # Example
//!
//! ```rust
//! use kinobridge_perception::goal::{GoalEvaluator, DEFAULT_GOAL_TOLERANCE};
//! use kinobridge_types::{GoalCriterion, Pose, Quaternion, RigidBodyState, Vec3, WorldState};
//!
//! let goal = GoalEvaluator::new(
//!     vec![GoalCriterion {
//!         body: 0,
//!         target: Pose { position: Vec3::new(1.0, 0.0, 0.0), orientation: Quaternion::identity() },
//!     }],
//!     1,
//!     DEFAULT_GOAL_TOLERANCE,
//! )
//! .unwrap();
//!
//! let state = WorldState::new(vec![RigidBodyState::at_rest(
//!     Vec3::new(1.2, 0.0, 0.0),
//!     Quaternion::identity(),
//! )]);
//! let eval = goal.evaluate(&state).unwrap();
//! assert!(eval.satisfied);
//! ```

use kinobridge_types::{GoalCriterion, Pose, SimError, WorldState};
use tracing::debug;

/// Default per-criterion distance allowance.
pub const DEFAULT_GOAL_TOLERANCE: f64 = 0.1;

/// Goal queries a planner makes against candidate states.
pub trait PlannerGoal {
    /// Summed distance of `state` from the goal.
    fn distance(&self, state: &WorldState) -> Result<f64, SimError>;

    /// `true` when `state` is close enough to count as reaching the goal.
    fn is_satisfied(&self, state: &WorldState) -> Result<bool, SimError>;
}

/// Distance between a body's pose and a target pose.
pub fn pose_distance(candidate: &Pose, target: &Pose) -> f64 {
    let dot = candidate.orientation.dot(target.orientation);
    // Rounding can push |dot| a hair past 1 for unit quaternions.
    let orientation = (1.0 - dot * dot).max(0.0);
    candidate.position.distance_squared(target.position) + orientation
}

/// Result of one goal evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalEvaluation {
    pub distance: f64,
    pub satisfied: bool,
}

/// Evaluates states against a fixed list of goal criteria.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalEvaluator {
    criteria: Vec<GoalCriterion>,
    tolerance: f64,
}

impl GoalEvaluator {
    /// Build an evaluator for a session with `body_count` bodies.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::MalformedState`] when a criterion names a body the
    /// session does not have.
    pub fn new(
        criteria: Vec<GoalCriterion>,
        body_count: usize,
        tolerance: f64,
    ) -> Result<Self, SimError> {
        if let Some(bad) = criteria.iter().find(|c| c.body >= body_count) {
            return Err(SimError::MalformedState(format!(
                "goal criterion targets body {} but the session has {body_count} bodies",
                bad.body
            )));
        }
        debug!(criteria = criteria.len(), tolerance, "goal evaluator ready");
        Ok(Self {
            criteria,
            tolerance,
        })
    }

    pub fn criteria(&self) -> &[GoalCriterion] {
        &self.criteria
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Largest summed distance that still satisfies the goal.
    pub fn threshold(&self) -> f64 {
        self.tolerance * self.criteria.len() as f64
    }

    /// Summed distance and satisfaction for `state`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::MalformedState`] when `state` lacks a body named by
    /// a criterion.
    pub fn evaluate(&self, state: &WorldState) -> Result<GoalEvaluation, SimError> {
        let mut distance = 0.0;
        for criterion in &self.criteria {
            let body = state.body(criterion.body).ok_or_else(|| {
                SimError::MalformedState(format!(
                    "state has {} bodies, goal needs body {}",
                    state.body_count(),
                    criterion.body
                ))
            })?;
            distance += pose_distance(&body.pose(), &criterion.target);
        }
        Ok(GoalEvaluation {
            distance,
            satisfied: distance <= self.threshold(),
        })
    }
}

impl PlannerGoal for GoalEvaluator {
    fn distance(&self, state: &WorldState) -> Result<f64, SimError> {
        self.evaluate(state).map(|e| e.distance)
    }

    fn is_satisfied(&self, state: &WorldState) -> Result<bool, SimError> {
        self.evaluate(state).map(|e| e.satisfied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinobridge_types::{Quaternion, RigidBodyState, Vec3};

    fn pose(x: f64, y: f64, z: f64, q: Quaternion) -> Pose {
        Pose {
            position: Vec3::new(x, y, z),
            orientation: q,
        }
    }

    /// Unit quaternion for a rotation of `angle` about the unit `axis`.
    fn axis_angle(axis: [f64; 3], angle: f64) -> Quaternion {
        let (s, c) = (angle / 2.0).sin_cos();
        Quaternion::new(c, axis[0] * s, axis[1] * s, axis[2] * s)
    }

    fn criterion(body: usize, target: Pose) -> GoalCriterion {
        GoalCriterion { body, target }
    }

    fn world(poses: &[Pose]) -> WorldState {
        WorldState::new(
            poses
                .iter()
                .map(|p| RigidBodyState::at_rest(p.position, p.orientation))
                .collect(),
        )
    }

    #[test]
    fn identical_poses_have_zero_distance() {
        let q = axis_angle([0.0, 0.0, 1.0], 0.7);
        let p = pose(3.0, -1.0, 2.0, q);
        assert!(pose_distance(&p, &p).abs() < 1e-12);
    }

    #[test]
    fn negated_quaternion_is_the_same_orientation() {
        let q = axis_angle([0.0, 1.0, 0.0], 1.1);
        let a = pose(0.0, 0.0, 0.0, q);
        let b = pose(0.0, 0.0, 0.0, q.negated());
        assert!(pose_distance(&a, &b).abs() < 1e-12);
        assert!((pose_distance(&a, &b) - pose_distance(&a, &a)).abs() < 1e-12);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = pose(1.0, 2.0, 3.0, axis_angle([1.0, 0.0, 0.0], 0.3));
        let b = pose(-2.0, 0.5, 1.0, axis_angle([0.0, 0.0, 1.0], 2.0));
        assert_eq!(pose_distance(&a, &b), pose_distance(&b, &a));
    }

    #[test]
    fn position_term_is_squared_euclidean() {
        let a = pose(0.0, 0.0, 0.0, Quaternion::identity());
        let b = pose(1.0, 2.0, 2.0, Quaternion::identity());
        assert!((pose_distance(&a, &b) - 9.0).abs() < 1e-12);
    }

    #[test]
    fn orientation_term_stays_within_unit_interval() {
        let origin = Vec3::zero();
        let axes = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        for a in axes {
            for b in axes {
                for i in 0..=16 {
                    for j in 0..=16 {
                        let qa = axis_angle(a, i as f64 * std::f64::consts::PI / 8.0);
                        let qb = axis_angle(b, j as f64 * std::f64::consts::PI / 8.0);
                        let d = pose_distance(
                            &Pose { position: origin, orientation: qa },
                            &Pose { position: origin, orientation: qb },
                        );
                        assert!((0.0..=1.0).contains(&d), "d = {d}");
                    }
                }
            }
        }
        // Half-turn apart: maximal orientation distance.
        let d = pose_distance(
            &pose(0.0, 0.0, 0.0, Quaternion::identity()),
            &pose(0.0, 0.0, 0.0, axis_angle([0.0, 0.0, 1.0], std::f64::consts::PI)),
        );
        assert!((d - 1.0).abs() < 1e-12);
    }

    #[test]
    fn two_close_criteria_satisfy_goal() {
        let targets = [
            pose(0.0, 0.0, 0.0, Quaternion::identity()),
            pose(5.0, 5.0, 0.0, Quaternion::identity()),
        ];
        let goal = GoalEvaluator::new(
            vec![criterion(0, targets[0]), criterion(1, targets[1])],
            2,
            DEFAULT_GOAL_TOLERANCE,
        )
        .unwrap();

        // Each body 0.2 m off: 0.04 per criterion, 0.08 total <= 0.2.
        let state = world(&[
            pose(0.2, 0.0, 0.0, Quaternion::identity()),
            pose(5.0, 5.2, 0.0, Quaternion::identity()),
        ]);
        let eval = goal.evaluate(&state).unwrap();
        assert!((eval.distance - 0.08).abs() < 1e-9);
        assert!(eval.satisfied);
        assert!(goal.is_satisfied(&state).unwrap());
    }

    #[test]
    fn two_far_criteria_miss_goal() {
        let targets = [
            pose(0.0, 0.0, 0.0, Quaternion::identity()),
            pose(5.0, 5.0, 0.0, Quaternion::identity()),
        ];
        let goal = GoalEvaluator::new(
            vec![criterion(0, targets[0]), criterion(1, targets[1])],
            2,
            DEFAULT_GOAL_TOLERANCE,
        )
        .unwrap();

        // 0.4² + 0.2² = 0.2 per criterion, 0.4 total > 0.2.
        let state = world(&[
            pose(0.4, 0.2, 0.0, Quaternion::identity()),
            pose(5.4, 5.2, 0.0, Quaternion::identity()),
        ]);
        let eval = goal.evaluate(&state).unwrap();
        assert!((eval.distance - 0.4).abs() < 1e-9);
        assert!(!eval.satisfied);
        assert!((goal.distance(&state).unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn threshold_scales_with_full_criteria_count() {
        let target = pose(0.0, 0.0, 0.0, Quaternion::identity());
        let goal = GoalEvaluator::new(
            vec![
                criterion(0, target),
                criterion(1, target),
                criterion(2, target),
            ],
            3,
            0.1,
        )
        .unwrap();
        assert!((goal.threshold() - 0.3).abs() < 1e-12);

        // 0.25 total: within 3 * 0.1 but not within 2 * 0.1.
        let state = world(&[
            pose(0.5, 0.0, 0.0, Quaternion::identity()),
            target,
            target,
        ]);
        assert!(goal.is_satisfied(&state).unwrap());
    }

    #[test]
    fn criterion_for_missing_body_is_rejected() {
        let target = pose(0.0, 0.0, 0.0, Quaternion::identity());
        assert!(matches!(
            GoalEvaluator::new(vec![criterion(2, target)], 2, 0.1),
            Err(SimError::MalformedState(_))
        ));

        let goal = GoalEvaluator::new(vec![criterion(1, target)], 2, 0.1).unwrap();
        let short = world(&[target]);
        assert!(matches!(
            goal.evaluate(&short),
            Err(SimError::MalformedState(_))
        ));
    }
}
