//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use chorus_config::{Config, CorsConfig, ServerConfig, TargetEntry};
use chorus_core::ProviderCredentials;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    ..ServerConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Shared credentials for a provider pointed at a mock backend
    pub fn with_provider(mut self, id: &str, api_key: &str, base_url: &str) -> Self {
        self.config.providers.insert(
            id.to_owned(),
            ProviderCredentials::new(api_key).with_base_url(base_url.parse().expect("valid URL")),
        );
        self
    }

    pub fn with_target(mut self, id: &str, provider: &str, model: &str) -> Self {
        self.config.targets.push(TargetEntry {
            id: id.to_owned(),
            provider: provider.to_owned(),
            model: model.to_owned(),
            api_key: None,
            base_url: None,
            organization_id: None,
            system_prompt: None,
            enable_thinking: None,
            workflow_inputs: serde_json::Map::new(),
            conversation_id: None,
        });
        self
    }

    pub fn with_relay_path(mut self, path: &str) -> Self {
        path.clone_into(&mut self.config.server.relay_path);
        self
    }

    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
