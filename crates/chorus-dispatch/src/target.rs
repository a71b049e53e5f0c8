//! Target identity and per-target configuration

use std::fmt;

use chorus_config::TargetEntry;
use chorus_core::ProviderCredentials;
use chorus_llm::Attachment;
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

/// Caller-chosen identifier, stable across turns
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One dispatch destination
///
/// Credential fields are overrides; anything left unset falls back to the
/// shared configuration for the provider.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub id: TargetId,
    pub provider_id: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<Url>,
    pub organization_id: Option<String>,
    pub system_prompt: Option<String>,
    pub enable_thinking: Option<bool>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub files: Vec<Attachment>,
    pub workflow_inputs: serde_json::Map<String, serde_json::Value>,
    /// Workflow conversation to continue
    pub conversation_id: Option<String>,
}

impl TargetConfig {
    pub fn new(id: impl Into<TargetId>, provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
            organization_id: None,
            system_prompt: None,
            enable_thinking: None,
            temperature: None,
            max_tokens: None,
            files: Vec::new(),
            workflow_inputs: serde_json::Map::new(),
            conversation_id: None,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub const fn with_thinking(mut self, enabled: bool) -> Self {
        self.enable_thinking = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files;
        self
    }

    /// Credentials for this target, or `None` when no usable key exists
    ///
    /// The target's own key wins over the shared entry; the endpoint and
    /// organization fall back field by field.
    pub fn resolve_credentials(
        &self,
        shared: &IndexMap<String, ProviderCredentials>,
    ) -> Option<ProviderCredentials> {
        let fallback = shared.get(&self.provider_id);

        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
            .or_else(|| fallback.map(|c| &c.api_key))?;

        let credentials = ProviderCredentials {
            api_key: api_key.clone(),
            base_url: self
                .base_url
                .clone()
                .or_else(|| fallback.and_then(|c| c.base_url.clone())),
            organization_id: self
                .organization_id
                .clone()
                .or_else(|| fallback.and_then(|c| c.organization_id.clone())),
        };

        credentials.has_usable_key().then_some(credentials)
    }
}

impl From<&TargetEntry> for TargetConfig {
    fn from(entry: &TargetEntry) -> Self {
        Self {
            api_key: entry.api_key.clone(),
            base_url: entry.base_url.clone(),
            organization_id: entry.organization_id.clone(),
            system_prompt: entry.system_prompt.clone(),
            enable_thinking: entry.enable_thinking,
            workflow_inputs: entry.workflow_inputs.clone(),
            conversation_id: entry.conversation_id.clone(),
            ..Self::new(entry.id.as_str(), entry.provider.as_str(), entry.model.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> IndexMap<String, ProviderCredentials> {
        let mut shared = IndexMap::new();
        shared.insert(
            "openai".to_owned(),
            ProviderCredentials::new("sk-shared")
                .with_base_url(Url::parse("http://shared.local/v1").unwrap())
                .with_organization("org-shared"),
        );
        shared
    }

    #[test]
    fn override_key_wins() {
        let target = TargetConfig::new("a", "openai", "gpt-4o").with_api_key("sk-own");
        let credentials = target.resolve_credentials(&shared()).unwrap();

        assert_eq!(credentials.api_key.expose_secret(), "sk-own");
        assert_eq!(
            credentials.base_url.as_ref().map(Url::as_str),
            Some("http://shared.local/v1")
        );
        assert_eq!(credentials.organization_id.as_deref(), Some("org-shared"));
    }

    #[test]
    fn blank_override_falls_back_to_shared() {
        let target = TargetConfig::new("a", "openai", "gpt-4o").with_api_key("  ");
        let credentials = target.resolve_credentials(&shared()).unwrap();

        assert_eq!(credentials.api_key.expose_secret(), "sk-shared");
    }

    #[test]
    fn base_url_override_applies_on_top_of_shared_key() {
        let target = TargetConfig::new("a", "openai", "gpt-4o")
            .with_base_url(Url::parse("http://own.local/v1").unwrap());
        let credentials = target.resolve_credentials(&shared()).unwrap();

        assert_eq!(credentials.api_key.expose_secret(), "sk-shared");
        assert_eq!(
            credentials.base_url.as_ref().map(Url::as_str),
            Some("http://own.local/v1")
        );
    }

    #[test]
    fn no_key_anywhere_resolves_to_none() {
        let target = TargetConfig::new("a", "anthropic", "claude-sonnet-4-5");
        assert!(target.resolve_credentials(&shared()).is_none());

        let mut blank = IndexMap::new();
        blank.insert("anthropic".to_owned(), ProviderCredentials::new(""));
        assert!(target.resolve_credentials(&blank).is_none());
    }

    #[test]
    fn from_config_entry() {
        let entry: TargetEntry = toml::from_str(
            r#"
            id = "left"
            provider = "dify"
            model = "dify-app"
            conversation_id = "c-1"

            [workflow_inputs]
            topic = "rust"
            "#,
        )
        .unwrap();

        let target = TargetConfig::from(&entry);
        assert_eq!(target.id, TargetId::new("left"));
        assert_eq!(target.provider_id, "dify");
        assert_eq!(target.conversation_id.as_deref(), Some("c-1"));
        assert_eq!(target.workflow_inputs["topic"], "rust");
    }
}
