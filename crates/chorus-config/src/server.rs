use std::net::SocketAddr;

use serde::Deserialize;

use crate::{cors::CorsConfig, health::HealthConfig};

/// Relay server configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind (defaults to `0.0.0.0:3000`)
    pub listen_address: Option<SocketAddr>,
    /// Path prefix for the relay routes
    #[serde(default = "default_relay_path")]
    pub relay_path: String,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub cors: Option<CorsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            relay_path: default_relay_path(),
            health: HealthConfig::default(),
            cors: None,
        }
    }
}

fn default_relay_path() -> String {
    "/api".to_string()
}
