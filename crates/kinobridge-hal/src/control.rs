//! [`ControlApplier`] – flat control vector → simulator actuator commands.
//!
//! The planner hands over one flat control vector per propagation step.  The
//! applier slices it along the session's [`ControlDescriptor`] and sends one
//! command per channel:
//!
//! ```text
//! id <channel-name> <template> [v0, v1, ...]
//! ```
//!
//! # Redundant dispatch suppression
//!
//! The applier remembers the last vector it dispatched.  A vector equal to
//! it element by element sends nothing.  Any change re-sends **every**
//! channel, in descriptor order, and the cache is updated only after the
//! last command went out.

use kinobridge_middleware::rpc::RpcClient;
use kinobridge_middleware::state_codec::encode_values;
use kinobridge_middleware::transport::Transport;
use kinobridge_types::{ControlChannel, ControlDescriptor, SimError};
use tracing::debug;

/// Dispatches control vectors to the simulator's actuator channels.
#[derive(Debug, Clone)]
pub struct ControlApplier {
    descriptor: ControlDescriptor,
    last: Vec<f64>,
}

impl ControlApplier {
    /// The cache starts at the zero vector: after the session reset every
    /// actuator is at rest.
    pub fn new(descriptor: ControlDescriptor) -> Self {
        let last = vec![0.0; descriptor.dimension()];
        Self { descriptor, last }
    }

    pub fn descriptor(&self) -> &ControlDescriptor {
        &self.descriptor
    }

    /// The last control vector dispatched.
    pub fn last_control(&self) -> &[f64] {
        &self.last
    }

    /// Apply `control`.  Returns `true` when commands were sent, `false` for
    /// a suppressed repeat.
    ///
    /// # Errors
    ///
    /// * [`SimError::DimensionMismatch`] when `control` has the wrong length;
    ///   nothing is sent.
    /// * [`SimError::TransportFailure`] when a command cannot be written; the
    ///   cache keeps its previous value.
    pub fn apply<T: Transport>(
        &mut self,
        rpc: &mut RpcClient<T>,
        control: &[f64],
    ) -> Result<bool, SimError> {
        let expected = self.descriptor.dimension();
        if control.len() != expected {
            return Err(SimError::DimensionMismatch {
                expected,
                actual: control.len(),
            });
        }
        if control == self.last.as_slice() {
            return Ok(false);
        }

        let mut offset = 0;
        for channel in self.descriptor.channels() {
            let slice = &control[offset..offset + channel.dimension];
            rpc.send(&channel_command(channel, slice))?;
            offset += channel.dimension;
        }
        self.last.clear();
        self.last.extend_from_slice(control);
        debug!(?control, channels = self.descriptor.channels().len(), "control applied");
        Ok(true)
    }
}

/// `id <name> <template> [v0, ...]` for one channel.
pub fn channel_command(channel: &ControlChannel, values: &[f64]) -> String {
    format!(
        "id {} {} {}",
        channel.name,
        channel.template,
        encode_values(values)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinobridge_middleware::sim_transport::SimTransport;
    use kinobridge_types::{Quaternion, RigidBodyState, Vec3};

    fn setup() -> (ControlApplier, RpcClient<SimTransport>) {
        let descriptor = ControlDescriptor::new(
            3,
            vec![
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
            ],
        )
        .unwrap();
        let sim = SimTransport::builder()
            .with_body(RigidBodyState::at_rest(Vec3::zero(), Quaternion::identity()))
            .build();
        (ControlApplier::new(descriptor), RpcClient::new(sim))
    }

    #[test]
    fn repeated_control_is_sent_once() {
        let (mut applier, mut rpc) = setup();
        assert!(applier.apply(&mut rpc, &[1.0, 0.5, -0.2]).unwrap());
        assert!(!applier.apply(&mut rpc, &[1.0, 0.5, -0.2]).unwrap());
        assert_eq!(
            rpc.transport().channel_commands(),
            vec![
                "id robot.motion set_speed [1.0, 0.5]",
                "id robot.arm set_rotation [-0.2]"
            ]
        );
    }

    #[test]
    fn any_change_resends_every_channel_in_order() {
        let (mut applier, mut rpc) = setup();
        applier.apply(&mut rpc, &[1.0, 0.5, -0.2]).unwrap();
        rpc.transport_mut().clear_log();

        // Only the arm slice changes.
        applier.apply(&mut rpc, &[1.0, 0.5, 0.3]).unwrap();
        assert_eq!(
            rpc.transport().channel_commands(),
            vec![
                "id robot.motion set_speed [1.0, 0.5]",
                "id robot.arm set_rotation [0.3]"
            ]
        );
        assert_eq!(applier.last_control(), &[1.0, 0.5, 0.3]);
    }

    #[test]
    fn initial_zero_control_is_a_noop() {
        let (mut applier, mut rpc) = setup();
        assert!(!applier.apply(&mut rpc, &[0.0, 0.0, 0.0]).unwrap());
        assert!(rpc.transport().commands().is_empty());
    }

    #[test]
    fn wrong_length_is_dimension_mismatch_and_sends_nothing() {
        let (mut applier, mut rpc) = setup();
        let result = applier.apply(&mut rpc, &[1.0, 2.0]);
        assert_eq!(
            result,
            Err(SimError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        );
        assert!(rpc.transport().commands().is_empty());
        assert_eq!(applier.last_control(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn failed_dispatch_keeps_previous_cache() {
        let (mut applier, mut rpc) = setup();
        rpc.call("endSimulation()").unwrap();
        assert!(matches!(
            applier.apply(&mut rpc, &[1.0, 1.0, 1.0]),
            Err(SimError::TransportFailure(_))
        ));
        assert_eq!(applier.last_control(), &[0.0, 0.0, 0.0]);
        assert!(!rpc.is_running());
    }
}
