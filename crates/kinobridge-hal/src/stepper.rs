//! [`WorldStepper`] – advance simulated time in whole ticks.
//!
//! A requested duration is converted to `round(duration * tick_rate)` ticks
//! and each tick is one blocking `nextTick()` call.  There is no partial-tick
//! interpolation: durations that are not a whole number of ticks are rounded
//! to the nearest tick, so callers should pick tick-aligned durations.

use kinobridge_middleware::rpc::{requests, RpcClient};
use kinobridge_middleware::transport::Transport;
use kinobridge_types::SimError;
use tracing::trace;

/// Default simulator tick rate.
pub const DEFAULT_TICK_RATE_HZ: f64 = 60.0;

/// Advances the simulator by fixed-size ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldStepper {
    tick_rate_hz: f64,
}

impl Default for WorldStepper {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ)
    }
}

impl WorldStepper {
    /// `tick_rate_hz` must be positive; configuration validates it.
    pub fn new(tick_rate_hz: f64) -> Self {
        Self { tick_rate_hz }
    }

    pub fn tick_rate_hz(&self) -> f64 {
        self.tick_rate_hz
    }

    /// Number of ticks `step(duration)` issues.
    ///
    /// ```
    /// use kinobridge_hal::stepper::WorldStepper;
    ///
    /// let stepper = WorldStepper::default();
    /// assert_eq!(stepper.ticks_for(0.5).unwrap(), 30);
    /// assert_eq!(stepper.ticks_for(0.016).unwrap(), 1);
    /// assert_eq!(stepper.ticks_for(-1.0).unwrap(), 0);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidDuration`] for a non-finite duration.
    pub fn ticks_for(&self, duration: f64) -> Result<u64, SimError> {
        if !duration.is_finite() {
            return Err(SimError::InvalidDuration(duration));
        }
        let ticks = (duration * self.tick_rate_hz).round();
        Ok(if ticks > 0.0 { ticks as u64 } else { 0 })
    }

    /// Advance the simulation by `duration` seconds.  Returns the number of
    /// ticks issued.
    ///
    /// # Errors
    ///
    /// [`SimError::InvalidDuration`] before any call for a non-finite
    /// duration; [`SimError::TransportFailure`] from the first failing tick.
    pub fn step<T: Transport>(
        &self,
        rpc: &mut RpcClient<T>,
        duration: f64,
    ) -> Result<u64, SimError> {
        let ticks = self.ticks_for(duration)?;
        for _ in 0..ticks {
            rpc.call(requests::NEXT_TICK)?;
        }
        trace!(duration, ticks, "world stepped");
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinobridge_middleware::sim_transport::SimTransport;
    use kinobridge_types::{Quaternion, RigidBodyState, Vec3};

    fn rpc() -> RpcClient<SimTransport> {
        RpcClient::new(
            SimTransport::builder()
                .with_body(RigidBodyState::at_rest(Vec3::zero(), Quaternion::identity()))
                .build(),
        )
    }

    #[test]
    fn whole_tick_durations_issue_exact_tick_counts() {
        let stepper = WorldStepper::default();
        for k in [0u64, 1, 30, 59, 60] {
            let mut rpc = rpc();
            let issued = stepper.step(&mut rpc, k as f64 / 60.0).unwrap();
            assert_eq!(issued, k);
            assert_eq!(rpc.transport().tick_count(), k, "k = {k}");
            assert!(rpc.transport().requests().iter().all(|r| r == "nextTick()"));
        }
    }

    #[test]
    fn durations_round_to_nearest_tick() {
        let stepper = WorldStepper::default();

        let mut rpc1 = rpc();
        stepper.step(&mut rpc1, 0.016).unwrap();
        assert_eq!(rpc1.transport().tick_count(), 1);

        let mut rpc2 = rpc();
        stepper.step(&mut rpc2, 0.5).unwrap();
        assert_eq!(rpc2.transport().tick_count(), 30);

        // 0.2 ticks rounds down to nothing.
        let mut rpc3 = rpc();
        stepper.step(&mut rpc3, 0.2 / 60.0).unwrap();
        assert_eq!(rpc3.transport().tick_count(), 0);
    }

    #[test]
    fn non_finite_duration_is_rejected_before_any_call() {
        let stepper = WorldStepper::default();
        let mut rpc = rpc();
        assert!(matches!(
            stepper.step(&mut rpc, f64::NAN),
            Err(SimError::InvalidDuration(_))
        ));
        assert!(matches!(
            stepper.step(&mut rpc, f64::INFINITY),
            Err(SimError::InvalidDuration(_))
        ));
        assert!(rpc.transport().requests().is_empty());
        assert!(rpc.is_running());
    }

    #[test]
    fn custom_tick_rate() {
        let stepper = WorldStepper::new(100.0);
        assert_eq!(stepper.ticks_for(0.5).unwrap(), 50);
    }

    #[test]
    fn failing_tick_stops_stepping() {
        let stepper = WorldStepper::default();
        let mut rpc = rpc();
        rpc.transport_mut().fail_after(3);
        assert!(matches!(
            stepper.step(&mut rpc, 0.5),
            Err(SimError::TransportFailure(_))
        ));
        assert_eq!(rpc.transport().tick_count(), 3);
        assert!(!rpc.is_running());
    }
}
