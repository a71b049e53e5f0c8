//! Anthropic Messages API adapter

use async_trait::async_trait;
use chorus_core::ProviderCredentials;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Completion, VendorAdapter};
use crate::convert::anthropic::AnthropicTranslator;
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::registry::ProviderDefinition;
use crate::types::{CompletionRequest, CompletionResponse};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicAdapter {
    provider: &'static str,
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl AnthropicAdapter {
    pub fn new(
        definition: &'static ProviderDefinition,
        credentials: &ProviderCredentials,
        client: Client,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            provider: definition.id,
            client,
            base_url: super::resolve_base_url(definition, credentials)?,
            api_key: credentials.api_key.clone(),
        })
    }

    fn messages_url(&self) -> String {
        super::endpoint(&self.base_url, "messages")
    }
}

#[async_trait]
impl VendorAdapter for AnthropicAdapter {
    fn provider_id(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let wire_request = AnthropicRequest::from(request);

        let builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request);

        let response = super::send(self.provider, builder).await?;

        if request.stream {
            return Ok(Completion::Stream(super::translate_stream(
                self.provider,
                response,
                AnthropicTranslator::new(),
            )));
        }

        let wire_response: AnthropicResponse = super::read_json(self.provider, response).await?;
        Ok(Completion::Response(CompletionResponse::from(wire_response)))
    }
}
