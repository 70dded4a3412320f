//! Bridge configuration – reads `kinobridge.toml`.
//!
//! Every field has a default, so an empty file (or no file at all, via
//! [`BridgeConfig::default`]) describes a session against a simulator on
//! `localhost` with the stock ports.
//!
//! ```toml
//! [simulator]
//! host = "localhost"
//! request_port = 50007
//! command_port = 4000
//! rpc_timeout_ms = 30000
//! framing = "literal"
//!
//! [session]
//! robot_body = 1
//! goal_tolerance = 0.1
//! tick_rate_hz = 60.0
//! cell_sizes = [2.0, 2.0]
//! control_bounds = [[-10.0, 10.0], [-1.0, 1.0]]
//!
//! [session.propagation]
//! step_size = 0.1
//! min_control_duration = 5
//! max_control_duration = 30
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use kinobridge_hal::EnvironmentOptions;
use kinobridge_middleware::Framing;
use kinobridge_types::{PropagationParams, SimError};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Where the simulator listens and how replies are framed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the request/response channel.
    #[serde(default = "default_request_port")]
    pub request_port: u16,

    /// Port of the fire-and-forget command channel.
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Connect/read/write timeout in milliseconds; `0` blocks forever.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default)]
    pub framing: Framing,
}

/// Planning-side parameters the simulator does not report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Body whose (x, y) position the projection uses.
    #[serde(default = "default_robot_body")]
    pub robot_body: usize,

    /// Per-criterion goal distance allowance.
    #[serde(default = "default_goal_tolerance")]
    pub goal_tolerance: f64,

    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,

    #[serde(default = "default_cell_sizes")]
    pub cell_sizes: [f64; 2],

    /// `[low, high]` per control dimension.
    #[serde(default = "default_control_bounds")]
    pub control_bounds: Vec<[f64; 2]>,

    #[serde(default)]
    pub propagation: PropagationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_min_control_duration")]
    pub min_control_duration: u32,
    #[serde(default = "default_max_control_duration")]
    pub max_control_duration: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_request_port() -> u16 {
    50007
}
fn default_command_port() -> u16 {
    4000
}
fn default_rpc_timeout_ms() -> u64 {
    30_000
}
fn default_robot_body() -> usize {
    1
}
fn default_goal_tolerance() -> f64 {
    kinobridge_perception::goal::DEFAULT_GOAL_TOLERANCE
}
fn default_tick_rate_hz() -> f64 {
    kinobridge_hal::stepper::DEFAULT_TICK_RATE_HZ
}
fn default_cell_sizes() -> [f64; 2] {
    kinobridge_perception::projection::DEFAULT_CELL_SIZES
}
fn default_control_bounds() -> Vec<[f64; 2]> {
    vec![[-10.0, 10.0], [-1.0, 1.0]]
}
fn default_step_size() -> f64 {
    PropagationParams::default().step_size
}
fn default_min_control_duration() -> u32 {
    PropagationParams::default().min_control_duration
}
fn default_max_control_duration() -> u32 {
    PropagationParams::default().max_control_duration
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            request_port: default_request_port(),
            command_port: default_command_port(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            framing: Framing::default(),
        }
    }
}

impl SimulatorConfig {
    /// The socket timeout, `None` when disabled.
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            robot_body: default_robot_body(),
            goal_tolerance: default_goal_tolerance(),
            tick_rate_hz: default_tick_rate_hz(),
            cell_sizes: default_cell_sizes(),
            control_bounds: default_control_bounds(),
            propagation: PropagationConfig::default(),
        }
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            min_control_duration: default_min_control_duration(),
            max_control_duration: default_max_control_duration(),
        }
    }
}

impl From<PropagationConfig> for PropagationParams {
    fn from(p: PropagationConfig) -> Self {
        Self {
            step_size: p.step_size,
            min_control_duration: p.min_control_duration,
            max_control_duration: p.max_control_duration,
        }
    }
}

impl BridgeConfig {
    /// Read, parse and validate the file at `path`.
    ///
    /// `KINOBRIDGE_*` environment overrides are applied before validation
    /// (see [`BridgeConfig::apply_env_overrides`]).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] if the file cannot be read or parsed, or
    /// holds invalid values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            SimError::Config(format!("failed to read config at {}: {e}", path.display()))
        })?;
        let mut cfg = Self::parse(&raw)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] for TOML syntax errors, unknown value
    /// types, or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self, SimError> {
        let cfg = Self::parse(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse(raw: &str) -> Result<Self, SimError> {
        toml::from_str(raw).map_err(|e| SimError::Config(format!("failed to parse config: {e}")))
    }

    /// Apply `KINOBRIDGE_*` environment variable overrides.
    ///
    /// | Variable | Config field |
    /// |---|---|
    /// | `KINOBRIDGE_SIM_HOST` | `simulator.host` |
    /// | `KINOBRIDGE_REQUEST_PORT` | `simulator.request_port` |
    /// | `KINOBRIDGE_COMMAND_PORT` | `simulator.command_port` |
    ///
    /// Unparseable port values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("KINOBRIDGE_SIM_HOST") {
            self.simulator.host = host;
        }
        if let Some(port) = lookup("KINOBRIDGE_REQUEST_PORT").and_then(|v| v.parse().ok()) {
            self.simulator.request_port = port;
        }
        if let Some(port) = lookup("KINOBRIDGE_COMMAND_PORT").and_then(|v| v.parse().ok()) {
            self.simulator.command_port = port;
        }
    }

    /// Check value ranges serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SimError> {
        let s = &self.session;
        if !(s.tick_rate_hz.is_finite() && s.tick_rate_hz > 0.0) {
            return Err(invalid("session.tick_rate_hz must be positive"));
        }
        if !(s.goal_tolerance.is_finite() && s.goal_tolerance >= 0.0) {
            return Err(invalid("session.goal_tolerance must be non-negative"));
        }
        if s.cell_sizes.iter().any(|c| !(c.is_finite() && *c > 0.0)) {
            return Err(invalid("session.cell_sizes must be positive"));
        }
        if let Some(i) = s
            .control_bounds
            .iter()
            .position(|[lo, hi]| lo.is_nan() || hi.is_nan() || lo > hi)
        {
            return Err(SimError::Config(format!(
                "session.control_bounds[{i}] has low above high"
            )));
        }
        let p = &s.propagation;
        if !(p.step_size.is_finite() && p.step_size > 0.0) {
            return Err(invalid("session.propagation.step_size must be positive"));
        }
        if p.min_control_duration > p.max_control_duration {
            return Err(invalid(
                "session.propagation.min_control_duration exceeds max_control_duration",
            ));
        }
        if self.simulator.host.is_empty() {
            return Err(invalid("simulator.host must not be empty"));
        }
        Ok(())
    }

    /// Options for [`kinobridge_hal::SimEnvironment::connect`].
    pub fn to_environment_options(&self) -> EnvironmentOptions {
        EnvironmentOptions {
            control_bounds: self
                .session
                .control_bounds
                .iter()
                .map(|&[lo, hi]| (lo, hi))
                .collect(),
            tick_rate_hz: self.session.tick_rate_hz,
            propagation: self.session.propagation.into(),
        }
    }
}

fn invalid(msg: &str) -> SimError {
    SimError::Config(msg.to_string())
}
