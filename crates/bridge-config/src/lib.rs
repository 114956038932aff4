#![allow(clippy::must_use_candidate)]

pub mod cli;
pub mod cors;
mod duration;
mod env;
pub mod health;
mod loader;
pub mod permissions;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use cli::*;
pub use cors::*;
pub use health::*;
pub use permissions::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level bridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// CLI executable and supervision limits
    #[serde(default)]
    pub cli: CliConfig,
    /// Tool and directory permissions
    #[serde(default)]
    pub permissions: PermissionsConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
