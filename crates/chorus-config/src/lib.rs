#![allow(clippy::must_use_candidate)]

pub mod cors;
pub mod dispatch;
mod env;
pub mod health;
mod loader;
pub mod server;
pub mod targets;
pub mod telemetry;

use chorus_core::ProviderCredentials;
use indexmap::IndexMap;
use serde::Deserialize;

pub use cors::*;
pub use dispatch::*;
pub use env::ExpandError;
pub use health::*;
pub use server::*;
pub use targets::*;
pub use telemetry::TelemetryConfig;

/// Top-level chorus configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Relay server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared credentials keyed by provider identifier
    ///
    /// Used for any target that does not carry its own override.
    #[serde(default)]
    pub providers: IndexMap<String, ProviderCredentials>,
    /// Dispatch engine behaviour
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Default fan-out targets for the `ask` command
    #[serde(default)]
    pub targets: Vec<TargetEntry>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
