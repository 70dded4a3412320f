//! `kinobridge-middleware` – the wire between planner and simulator.
//!
//! Moves text requests, replies and commands to and from the simulator
//! without caring what the planner does with them.
//!
//! # Modules
//!
//! - [`transport`] – [`Transport`] trait and the blocking [`TcpTransport`].
//! - [`literal`] – structured-literal parser for simulator replies.
//! - [`rpc`] – [`RpcClient`]: request/reply calls, fire-and-forget commands
//!   and the session's `running` flag.
//! - [`state_codec`] – body tuples ⇄ [`WorldState`][kinobridge_types::WorldState],
//!   goal criteria.
//! - [`descriptor`] – control description and body bounds handshake replies.
//! - [`sim_transport`] – [`SimTransport`], an in-process simulator double.

pub mod descriptor;
pub mod literal;
pub mod rpc;
pub mod sim_transport;
pub mod state_codec;
pub mod transport;

pub use literal::{Literal, LiteralError};
pub use rpc::RpcClient;
pub use sim_transport::SimTransport;
pub use transport::{Framing, TcpTransport, Transport};
