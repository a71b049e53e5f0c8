use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// A preconfigured fan-out target
///
/// Credential fields here override the shared `[providers.<id>]` entry
/// for this target only.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    /// Stable identifier for the target's transcript
    pub id: String,
    /// Provider identifier from the adapter registry
    pub provider: String,
    /// Model identifier
    pub model: String,
    #[serde(default)]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub base_url: Option<Url>,
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Optional system prompt sent with every turn
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Ask the model to stream its reasoning
    #[serde(default)]
    pub enable_thinking: Option<bool>,
    /// Workflow input variables (workflow-style providers)
    #[serde(default)]
    pub workflow_inputs: serde_json::Map<String, serde_json::Value>,
    /// Previously issued workflow conversation identifier
    #[serde(default)]
    pub conversation_id: Option<String>,
}
