//! Decoders for the session handshake replies.
//!
//! * `getControlDescription()` →
//!   `[dimension, (name, template, dims), (name, template, dims), ...]`
//! * `getRigidBodiesBounds()` →
//!   `[body_count, [x_lo, x_hi, y_lo, y_hi, z_lo, z_hi]]`; the position bounds
//!   are shared by every body.  Nested `[[lo, hi], ...]` pairs are accepted as
//!   well.

use kinobridge_types::{ControlChannel, ControlDescriptor, RealVectorBounds, SimError};

use crate::literal::Literal;
use crate::state_codec::{scalars, seq};

/// Body count and shared position bounds reported by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyBounds {
    pub body_count: usize,
    pub position: RealVectorBounds,
}

/// Decode a `getControlDescription()` reply.
///
/// # Errors
///
/// Returns [`SimError::InvalidDescriptor`] when the reply has the wrong shape
/// or its channels do not cover the declared dimension.
pub fn decode_control_description(raw: &Literal) -> Result<ControlDescriptor, SimError> {
    let invalid = |detail: String| SimError::InvalidDescriptor(detail);
    let items = raw
        .as_seq()
        .ok_or_else(|| invalid(format!("control description is not a sequence: {raw}")))?;
    let (dimension, channels) = items
        .split_first()
        .ok_or_else(|| invalid("control description is empty".to_string()))?;
    let dimension = dimension
        .as_usize()
        .ok_or_else(|| invalid(format!("control dimension {dimension} is not a count")))?;

    let channels = channels
        .iter()
        .map(|entry| match entry.as_seq() {
            Some([name, template, dims]) => match (name.as_str(), template.as_str(), dims.as_usize()) {
                (Some(name), Some(template), Some(dimension)) => Ok(ControlChannel {
                    name: name.to_string(),
                    template: template.to_string(),
                    dimension,
                }),
                _ => Err(invalid(format!("control channel {entry} is not (name, template, dims)"))),
            },
            _ => Err(invalid(format!("control channel {entry} is not (name, template, dims)"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    ControlDescriptor::new(dimension, channels)
}

/// Decode a `getRigidBodiesBounds()` reply.
///
/// # Errors
///
/// Returns [`SimError::MalformedState`] on any layout mismatch or when a
/// lower bound exceeds its upper bound.
pub fn decode_body_bounds(raw: &Literal) -> Result<BodyBounds, SimError> {
    let items = seq(raw, "rigid body bounds")?;
    let [count, bounds] = items else {
        return Err(SimError::MalformedState(format!(
            "rigid body bounds have {} elements, expected (count, bounds)",
            items.len()
        )));
    };
    let body_count = count.as_usize().ok_or_else(|| {
        SimError::MalformedState(format!("rigid body count {count} is not a count"))
    })?;
    let position = decode_bounds(bounds, 3, "position bounds")?;
    Ok(BodyBounds {
        body_count,
        position,
    })
}

/// Decode `dimension` `(low, high)` pairs, either interleaved
/// (`[lo0, hi0, lo1, hi1, ...]`) or nested (`[[lo0, hi0], ...]`).
pub fn decode_bounds(
    raw: &Literal,
    dimension: usize,
    what: &str,
) -> Result<RealVectorBounds, SimError> {
    let items = seq(raw, what)?;
    let pairs: Vec<(f64, f64)> = if items.iter().all(|i| i.as_seq().is_some()) {
        items
            .iter()
            .map(|pair| scalars::<2>(pair, what).map(|[lo, hi]| (lo, hi)))
            .collect::<Result<_, _>>()?
    } else {
        let flat = items
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| SimError::MalformedState(format!("{what} holds non-number {v}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if flat.len() % 2 != 0 {
            return Err(SimError::MalformedState(format!(
                "{what} has an odd number of values ({})",
                flat.len()
            )));
        }
        flat.chunks_exact(2).map(|p| (p[0], p[1])).collect()
    };

    if pairs.len() != dimension {
        return Err(SimError::MalformedState(format!(
            "{what} cover {} dimensions, expected {dimension}",
            pairs.len()
        )));
    }
    let bounds = RealVectorBounds::from_pairs(&pairs);
    if !bounds.is_valid() {
        return Err(SimError::MalformedState(format!(
            "{what} have a lower bound above its upper bound"
        )));
    }
    Ok(bounds)
}
