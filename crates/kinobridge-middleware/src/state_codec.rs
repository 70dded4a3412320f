//! Conversion between the simulator's body tuples and [`WorldState`].
//!
//! On the wire every body is
//! `((px, py, pz), (vx, vy, vz), (wx, wy, wz), (qw, qx, qy, qz))` and the world
//! is a sequence of bodies in the simulator's stable body order.  Decoding
//! checks the body count and every block's arity; encoding writes the same
//! layout back as a literal the simulator's decoder accepts, including the
//! non-finite spellings from [`float_literal`].

use kinobridge_types::{GoalCriterion, Pose, Quaternion, RigidBodyState, SimError, Vec3, WorldState};

use crate::literal::{float_literal, Literal};

/// Decode an `extractState()` reply holding `body_count` bodies.
///
/// # Errors
///
/// Returns [`SimError::MalformedState`] on a body-count, block-count or
/// arity mismatch, or a non-numeric scalar.
pub fn decode_world_state(raw: &Literal, body_count: usize) -> Result<WorldState, SimError> {
    let bodies = seq(raw, "world state")?;
    if bodies.len() != body_count {
        return Err(SimError::MalformedState(format!(
            "expected {body_count} bodies, simulator reported {}",
            bodies.len()
        )));
    }
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| decode_body(body, i))
        .collect::<Result<Vec<_>, _>>()
        .map(WorldState::new)
}

fn decode_body(raw: &Literal, index: usize) -> Result<RigidBodyState, SimError> {
    let blocks = seq(raw, &format!("body {index}"))?;
    if blocks.len() != 4 {
        return Err(SimError::MalformedState(format!(
            "body {index} has {} blocks, expected 4",
            blocks.len()
        )));
    }
    Ok(RigidBodyState {
        position: vec3(&blocks[0], &format!("body {index} position"))?,
        linear_velocity: vec3(&blocks[1], &format!("body {index} linear velocity"))?,
        angular_velocity: vec3(&blocks[2], &format!("body {index} angular velocity"))?,
        orientation: quaternion(&blocks[3], &format!("body {index} orientation"))?,
    })
}

/// Encode `state` as the literal argument of `submitState(...)`.
///
/// ```rust
/// use kinobridge_middleware::state_codec::encode_world_state;
/// use kinobridge_types::{Quaternion, RigidBodyState, Vec3, WorldState};
///
/// let world = WorldState::new(vec![RigidBodyState::at_rest(
///     Vec3::new(1.0, 2.0, 0.5),
///     Quaternion::identity(),
/// )]);
/// assert_eq!(
///     encode_world_state(&world),
///     "[((1.0, 2.0, 0.5), (0.0, 0.0, 0.0), (0.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0))]"
/// );
/// ```
pub fn encode_world_state(state: &WorldState) -> String {
    let mut out = String::from("[");
    for (i, body) in state.bodies.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('(');
        write_tuple(&mut out, &body.position.to_array());
        out.push_str(", ");
        write_tuple(&mut out, &body.linear_velocity.to_array());
        out.push_str(", ");
        write_tuple(&mut out, &body.angular_velocity.to_array());
        out.push_str(", ");
        write_tuple(&mut out, &body.orientation.to_array());
        out.push(')');
    }
    out.push(']');
    out
}

/// Write `values` as a literal list, e.g. `[1.0, -0.5]`.
pub fn encode_values(values: &[f64]) -> String {
    let mut out = String::from("[");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&float_literal(*v));
    }
    out.push(']');
    out
}

fn write_tuple(out: &mut String, values: &[f64]) {
    out.push('(');
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&float_literal(*v));
    }
    out.push(')');
}

/// Decode a `getGoalCriteria()` reply: a sequence of `(body_index, target)`.
///
/// `target` is either a full four-block body state, of which position and
/// orientation are kept, or a `(position, orientation)` pair.
///
/// # Errors
///
/// Returns [`SimError::MalformedState`] on any layout mismatch.
pub fn decode_goal_criteria(raw: &Literal) -> Result<Vec<GoalCriterion>, SimError> {
    seq(raw, "goal criteria")?
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let what = format!("goal criterion {i}");
            let parts = seq(entry, &what)?;
            let [index, target] = parts else {
                return Err(SimError::MalformedState(format!(
                    "{what} has {} elements, expected (body, target)",
                    parts.len()
                )));
            };
            let body = index.as_usize().ok_or_else(|| {
                SimError::MalformedState(format!("{what} body index {index} is not an index"))
            })?;
            let blocks = seq(target, &what)?;
            let (position, orientation) = match blocks {
                [position, orientation] => (position, orientation),
                [position, _, _, orientation] => (position, orientation),
                _ => {
                    return Err(SimError::MalformedState(format!(
                        "{what} target has {} blocks, expected 2 or 4",
                        blocks.len()
                    )));
                }
            };
            Ok(GoalCriterion {
                body,
                target: Pose {
                    position: vec3(position, &format!("{what} position"))?,
                    orientation: quaternion(orientation, &format!("{what} orientation"))?,
                },
            })
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn seq<'a>(raw: &'a Literal, what: &str) -> Result<&'a [Literal], SimError> {
    raw.as_seq()
        .ok_or_else(|| SimError::MalformedState(format!("{what} is not a sequence: {raw}")))
}

pub(crate) fn scalars<const N: usize>(raw: &Literal, what: &str) -> Result<[f64; N], SimError> {
    let items = seq(raw, what)?;
    if items.len() != N {
        return Err(SimError::MalformedState(format!(
            "{what} has {} values, expected {N}",
            items.len()
        )));
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| SimError::MalformedState(format!("{what} holds non-number {item}")))?;
    }
    Ok(out)
}

fn vec3(raw: &Literal, what: &str) -> Result<Vec3, SimError> {
    scalars::<3>(raw, what).map(Vec3::from)
}

fn quaternion(raw: &Literal, what: &str) -> Result<Quaternion, SimError> {
    scalars::<4>(raw, what).map(Quaternion::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::parse;

    fn sample_world() -> WorldState {
        WorldState::new(vec![
            RigidBodyState {
                position: Vec3::new(0.1, -2.0, 3.25),
                linear_velocity: Vec3::new(1.0, 0.0, -1.0),
                angular_velocity: Vec3::new(0.0, 0.5, 0.0),
                orientation: Quaternion::new(0.7071067811865476, 0.0, 0.0, 0.7071067811865475),
            },
            RigidBodyState {
                position: Vec3::new(f64::INFINITY, f64::NEG_INFINITY, 1e-12),
                linear_velocity: Vec3::new(f64::NAN, 2.0, 3.0),
                angular_velocity: Vec3::zero(),
                orientation: Quaternion::identity(),
            },
        ])
    }

    fn same_bits(a: &WorldState, b: &WorldState) -> bool {
        let (fa, fb) = (a.to_flat(), b.to_flat());
        fa.len() == fb.len()
            && fa
                .iter()
                .zip(&fb)
                .all(|(x, y)| x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()))
    }

    #[test]
    fn decodes_simulator_layout() {
        let raw = parse(
            "[((1, 2, 3), (4, 5, 6), (7, 8, 9), (1.0, 0.0, 0.0, 0.0)), \
              ((0.5, 0.5, 0.5), (0, 0, 0), (0, 0, 0), (0.0, 1.0, 0.0, 0.0))]",
        )
        .unwrap();
        let world = decode_world_state(&raw, 2).unwrap();
        assert_eq!(world.bodies[0].angular_velocity, Vec3::new(7.0, 8.0, 9.0));
        assert_eq!(world.bodies[1].orientation, Quaternion::new(0.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn encode_then_decode_preserves_every_value() {
        let world = sample_world();
        let text = encode_world_state(&world);
        assert!(text.contains("float(\"nan\")"));
        assert!(text.contains("-float(\"inf\")"));

        let back = decode_world_state(&parse(&text).unwrap(), 2).unwrap();
        assert!(same_bits(&world, &back));
    }

    #[test]
    fn wrong_body_count_is_malformed() {
        let text = encode_world_state(&sample_world());
        let result = decode_world_state(&parse(&text).unwrap(), 3);
        assert!(matches!(result, Err(SimError::MalformedState(_))));
    }

    #[test]
    fn wrong_block_arity_is_malformed() {
        // Orientation with three components.
        let raw = parse("[((0, 0, 0), (0, 0, 0), (0, 0, 0), (1, 0, 0))]").unwrap();
        assert!(matches!(
            decode_world_state(&raw, 1),
            Err(SimError::MalformedState(_))
        ));

        // Missing angular velocity block.
        let raw = parse("[((0, 0, 0), (0, 0, 0), (1, 0, 0, 0))]").unwrap();
        assert!(matches!(
            decode_world_state(&raw, 1),
            Err(SimError::MalformedState(_))
        ));

        let raw = parse("[((0, 'x', 0), (0, 0, 0), (0, 0, 0), (1, 0, 0, 0))]").unwrap();
        assert!(matches!(
            decode_world_state(&raw, 1),
            Err(SimError::MalformedState(_))
        ));
    }

    #[test]
    fn goal_criteria_accept_pose_or_full_state_targets() {
        let raw = parse(
            "[(0, ((1.0, 2.0, 0.0), (0.0, 0.0, 1.0, 0.0))), \
              (2, ((3.0, 4.0, 0.0), (9, 9, 9), (9, 9, 9), (1.0, 0.0, 0.0, 0.0)))]",
        )
        .unwrap();
        let criteria = decode_goal_criteria(&raw).unwrap();
        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria[0].body, 0);
        assert_eq!(criteria[0].target.orientation, Quaternion::new(0.0, 0.0, 1.0, 0.0));
        assert_eq!(criteria[1].body, 2);
        assert_eq!(criteria[1].target.position, Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(criteria[1].target.orientation, Quaternion::identity());
    }

    #[test]
    fn goal_criterion_with_negative_index_is_malformed() {
        let raw = parse("[(-1, ((0, 0, 0), (1, 0, 0, 0)))]").unwrap();
        assert!(matches!(
            decode_goal_criteria(&raw),
            Err(SimError::MalformedState(_))
        ));
    }

    #[test]
    fn encode_values_uses_list_form() {
        assert_eq!(encode_values(&[1.0, -0.5]), "[1.0, -0.5]");
        assert_eq!(encode_values(&[]), "[]");
    }
}
