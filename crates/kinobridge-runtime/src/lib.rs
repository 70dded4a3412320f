//! `kinobridge-runtime` – process-level wiring for planning sessions.
//!
//! # Modules
//!
//! - [`config`] – [`BridgeConfig`][config::BridgeConfig]: simulator endpoint
//!   and session parameters, loaded from TOML with per-field defaults and
//!   `KINOBRIDGE_*` environment overrides.
//! - [`session`] – [`PlanningSession`][session::PlanningSession]: connects to
//!   the simulator, runs the handshake and holds the environment, goal and
//!   projection a planner needs.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod config;
pub mod session;
pub mod telemetry;

pub use config::BridgeConfig;
pub use session::PlanningSession;
pub use telemetry::{init_tracing, LogFormat, TracerProviderGuard};
