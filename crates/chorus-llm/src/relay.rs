//! Request relay
//!
//! Validates a relay call, builds the adapter through the registry, and
//! hands back the adapter's output without buffering it.

use std::time::Instant;

use chorus_core::ProviderCredentials;
use chorus_telemetry::RelayMetrics;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LlmError;
use crate::provider::workflow::{FileUpload, UploadedFile, WorkflowAdapter};
use crate::provider::{Completion, VendorAdapter};
use crate::registry::{ProviderDefinition, Registry};
use crate::types::{Attachment, CompletionParams, CompletionRequest, Message};

/// Body of `POST {relay}/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub provider_id: String,
    pub provider_config: RelayCredentials,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_thinking: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub workflow_inputs: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

/// Credential bundle as it travels in a relay body
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl std::fmt::Debug for RelayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayCredentials")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("organization_id", &self.organization_id)
            .finish()
    }
}

impl From<&ProviderCredentials> for RelayCredentials {
    fn from(credentials: &ProviderCredentials) -> Self {
        Self {
            api_key: credentials.api_key.expose_secret().to_owned(),
            base_url: credentials.base_url.clone(),
            organization_id: credentials.organization_id.clone(),
        }
    }
}

impl From<RelayCredentials> for ProviderCredentials {
    fn from(wire: RelayCredentials) -> Self {
        Self {
            api_key: SecretString::from(wire.api_key),
            base_url: wire.base_url,
            organization_id: wire.organization_id,
        }
    }
}

const fn default_stream() -> bool {
    true
}

impl RelayRequest {
    /// Wire body for a relay call
    pub fn from_parts(provider_id: &str, credentials: &ProviderCredentials, request: &CompletionRequest) -> Self {
        Self {
            provider_id: provider_id.to_owned(),
            provider_config: RelayCredentials::from(credentials),
            model: request.model.clone(),
            messages: request.messages.clone(),
            system_prompt: request.system_prompt.clone(),
            enable_thinking: request.enable_thinking,
            files: request.files.clone(),
            workflow_inputs: request.workflow_inputs.clone(),
            conversation_id: request.conversation_id.clone(),
            user: request.user.clone(),
            temperature: request.params.temperature,
            max_tokens: request.params.max_tokens,
            stream: request.stream,
        }
    }

    /// Split into provider id, credentials, and the normalized request
    pub fn into_parts(self) -> (String, ProviderCredentials, CompletionRequest) {
        let request = CompletionRequest {
            model: self.model,
            messages: self.messages,
            system_prompt: self.system_prompt,
            params: CompletionParams {
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            stream: self.stream,
            enable_thinking: self.enable_thinking,
            files: self.files,
            workflow_inputs: self.workflow_inputs,
            conversation_id: self.conversation_id,
            user: self.user,
        };

        (self.provider_id, self.provider_config.into(), request)
    }
}

/// Forwards normalized requests to vendor adapters
#[derive(Clone, Default)]
pub struct Relay {
    registry: Registry,
    metrics: RelayMetrics,
}

impl Relay {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            metrics: RelayMetrics::new(),
        }
    }

    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Relay one completion request
    ///
    /// Fails with `NotFound` for an unknown provider and `BadRequest` for a
    /// missing key or an empty message list, all before any network call.
    pub async fn relay(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        request: CompletionRequest,
    ) -> Result<Completion, LlmError> {
        let definition = self.resolve(provider_id, credentials)?;

        if request.messages.is_empty() {
            return Err(LlmError::BadRequest("messages must not be empty".to_owned()));
        }

        let adapter = self.registry.instantiate(definition.id, credentials)?;

        tracing::debug!(
            provider = %provider_id,
            model = %request.model,
            stream = request.stream,
            "relaying completion request"
        );

        let start = Instant::now();
        let result = adapter.complete(&request).await;
        self.metrics
            .record(provider_id, if result.is_ok() { "success" } else { "error" }, start);

        result
    }

    /// Suggested follow-up questions for a finished workflow answer
    pub async fn suggested_questions(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        message_id: &str,
        user: Option<&str>,
    ) -> Result<Vec<String>, LlmError> {
        if message_id.trim().is_empty() {
            return Err(LlmError::BadRequest("messageId is required".to_owned()));
        }

        let definition = self.resolve(provider_id, credentials)?;
        let adapter = self.workflow_adapter(definition, credentials)?;

        adapter.suggested_questions(message_id, user).await
    }

    /// Upload a file to a workflow-style provider
    pub async fn upload(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        upload: FileUpload,
    ) -> Result<UploadedFile, LlmError> {
        let definition = self.resolve(provider_id, credentials)?;
        let adapter = self.workflow_adapter(definition, credentials)?;

        adapter.upload(upload).await
    }

    fn resolve(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
    ) -> Result<&'static ProviderDefinition, LlmError> {
        let definition = self
            .registry
            .lookup(provider_id)
            .ok_or_else(|| LlmError::NotFound(provider_id.to_owned()))?;

        if !credentials.has_usable_key() {
            return Err(LlmError::BadRequest(missing_key_message(definition)));
        }

        Ok(definition)
    }

    fn workflow_adapter(
        &self,
        definition: &'static ProviderDefinition,
        credentials: &ProviderCredentials,
    ) -> Result<WorkflowAdapter, LlmError> {
        match self.registry.instantiate(definition.id, credentials)? {
            crate::Adapter::Workflow(adapter) => Ok(adapter),
            _ => Err(LlmError::BadRequest(format!(
                "provider '{}' does not support this operation",
                definition.name
            ))),
        }
    }
}

/// Message used whenever a provider has no usable API key
pub fn missing_key_message(definition: &ProviderDefinition) -> String {
    format!("missing API key for provider '{}'", definition.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-4o", vec![Message::user("Hi")])
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() {
        let relay = Relay::default();
        let err = relay
            .relay("nope", &ProviderCredentials::new("k"), request())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn blank_key_is_bad_request() {
        let relay = Relay::default();
        let err = relay
            .relay("anthropic", &ProviderCredentials::new("   "), request())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing API key for provider 'Anthropic'");
    }

    #[tokio::test]
    async fn empty_messages_are_bad_request() {
        let relay = Relay::default();
        let err = relay
            .relay("openai", &ProviderCredentials::new("k"), CompletionRequest::new("gpt-4o", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BadRequest(m) if m == "messages must not be empty"));
    }

    #[tokio::test]
    async fn follow_ups_need_a_workflow_provider() {
        let relay = Relay::default();
        let err = relay
            .suggested_questions("openai", &ProviderCredentials::new("k"), "msg-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::BadRequest(m) if m.contains("does not support")));
    }

    #[test]
    fn wire_body_round_trips_camel_case() {
        let body: RelayRequest = serde_json::from_value(serde_json::json!({
            "providerId": "dify",
            "providerConfig": {"apiKey": "app-1", "baseUrl": "http://localhost:5001/v1"},
            "model": "dify-app",
            "messages": [{"role": "user", "content": "Hi"}],
            "workflowInputs": {"topic": "rust"},
            "conversationId": "conv-1",
            "maxTokens": 256
        }))
        .unwrap();

        let (provider_id, credentials, request) = body.into_parts();

        assert_eq!(provider_id, "dify");
        assert_eq!(credentials.api_key.expose_secret(), "app-1");
        assert_eq!(
            credentials.base_url.as_ref().map(Url::as_str),
            Some("http://localhost:5001/v1")
        );
        assert!(request.stream);
        assert_eq!(request.params.max_tokens, Some(256));
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.workflow_inputs["topic"], "rust");

        let wire = serde_json::to_value(RelayRequest::from_parts(&provider_id, &credentials, &request)).unwrap();
        assert_eq!(wire["providerConfig"]["apiKey"], "app-1");
        assert_eq!(wire["workflowInputs"]["topic"], "rust");
        assert_eq!(wire["stream"], true);
        assert!(wire.get("systemPrompt").is_none());
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let wire = RelayCredentials {
            api_key: "sk-secret".to_owned(),
            base_url: None,
            organization_id: None,
        };
        assert!(!format!("{wire:?}").contains("sk-secret"));
    }
}
