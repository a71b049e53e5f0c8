use serde::Deserialize;

/// Liveness route served next to the relay
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_owned(),
        }
    }
}

impl HealthConfig {
    /// Path to mount, or `None` when the route is switched off
    pub fn route(&self) -> Option<&str> {
        self.enabled.then_some(self.path.as_str())
    }
}
