//! [`RpcClient`] – the session's handle on the simulator.
//!
//! Every request goes through [`RpcClient::call`], which sends the text
//! request, waits for the reply and decodes it with
//! [`literal::parse`][crate::literal::parse].  The client tracks a single
//! `running` flag: the first transport or decode failure clears it, and from
//! then on every call fails fast with [`SimError::TransportFailure`].  A
//! desynchronised request stream cannot be trusted, so there is no retry and
//! no reconnection.

use kinobridge_types::SimError;
use tracing::{debug, info, warn};

use crate::literal::{self, Literal};
use crate::transport::Transport;

/// Requests understood by the simulator.
pub mod requests {
    pub const GET_CONTROL_DESCRIPTION: &str = "getControlDescription()";
    pub const GET_RIGID_BODIES_BOUNDS: &str = "getRigidBodiesBounds()";
    pub const EXTRACT_STATE: &str = "extractState()";
    pub const NEXT_TICK: &str = "nextTick()";
    pub const GET_GOAL_CRITERIA: &str = "getGoalCriteria()";
    pub const END_SIMULATION: &str = "endSimulation()";

    /// `submitState(<literal>)`.
    pub fn submit_state(state_literal: &str) -> String {
        format!("submitState({state_literal})")
    }
}

/// Command that resets every simulated object to its initial state.
pub const RESET_COMMAND: &str = "id simulation reset_objects";

/// Synchronous RPC client owning the transport and the session's `running`
/// flag.
pub struct RpcClient<T: Transport> {
    transport: T,
    running: bool,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            running: true,
        }
    }

    /// `false` once a transport failure or shutdown has happened.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send `command` and decode the reply.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TransportFailure`] if the session is no longer
    /// running, the transport fails, or the reply is not a valid literal.  In
    /// the latter two cases the session stops running.
    pub fn call(&mut self, command: &str) -> Result<Literal, SimError> {
        self.ensure_running(command)?;
        let reply = match self.transport.request(command) {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(command, failure_detail(e))),
        };
        match literal::parse(&reply) {
            Ok(value) => {
                debug!(command, reply_bytes = reply.len(), "rpc call");
                Ok(value)
            }
            Err(e) => Err(self.fail(command, format!("undecodable reply: {e}"))),
        }
    }

    /// Send a fire-and-forget command.  A trailing newline is added when
    /// missing.
    ///
    /// # Errors
    ///
    /// Same as [`call`][Self::call]: a failed write ends the session.
    pub fn send(&mut self, command: &str) -> Result<(), SimError> {
        self.ensure_running(command)?;
        let result = if command.ends_with('\n') {
            self.transport.send_command(command)
        } else {
            self.transport.send_command(&format!("{command}\n"))
        };
        match result {
            Ok(()) => {
                debug!(command = command.trim_end(), "command sent");
                Ok(())
            }
            Err(e) => Err(self.fail(command.trim_end(), failure_detail(e))),
        }
    }

    /// Ask the simulator to end the simulation and stop the session.
    ///
    /// Calling this on a session that is no longer running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the failure of the final `endSimulation()` call, if any.  The
    /// session is stopped either way.
    pub fn shutdown(&mut self) -> Result<(), SimError> {
        if !self.running {
            debug!("shutdown requested on a stopped session; nothing to do");
            return Ok(());
        }
        let result = self.call(requests::END_SIMULATION).map(|_| ());
        self.running = false;
        info!("simulation session ended");
        result
    }

    fn ensure_running(&self, command: &str) -> Result<(), SimError> {
        if self.running {
            Ok(())
        } else {
            Err(SimError::TransportFailure(format!(
                "'{command}' rejected: simulator session is no longer running"
            )))
        }
    }

    fn fail(&mut self, command: &str, detail: String) -> SimError {
        self.running = false;
        warn!(command, error = %detail, "simulator link failed; session stopped");
        SimError::TransportFailure(format!("'{command}': {detail}"))
    }
}

fn failure_detail(err: SimError) -> String {
    match err {
        SimError::TransportFailure(detail) => detail,
        other => other.to_string(),
    }
}
