//! OpenAI-compatible adapter

use async_trait::async_trait;
use chorus_core::ProviderCredentials;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Completion, VendorAdapter};
use crate::convert::openai::build_request;
use crate::error::LlmError;
use crate::protocol::openai::OpenAiResponse;
use crate::registry::ProviderDefinition;
use crate::types::{CompletionRequest, CompletionResponse};

/// Whether the endpoint is the canonical `OpenAI` API rather than a compatible host
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// Adapter for `OpenAI` and every host speaking its chat completion protocol
///
/// Streamed bodies already have the normalized frame shape and are passed
/// through untouched.
pub struct OpenAiAdapter {
    provider: &'static str,
    client: Client,
    base_url: Url,
    api_key: SecretString,
    organization_id: Option<String>,
}

impl OpenAiAdapter {
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
            organization_id: credentials.organization_id.clone().filter(|o| !o.is_empty()),
        })
    }

    fn completions_url(&self) -> String {
        super::endpoint(&self.base_url, "chat/completions")
    }
}

#[async_trait]
impl VendorAdapter for OpenAiAdapter {
    fn provider_id(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let wire_request = build_request(request, is_canonical_openai(&self.base_url));

        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&wire_request);

        if let Some(organization) = &self.organization_id {
            builder = builder.header("OpenAI-Organization", organization);
        }

        let response = super::send(self.provider, builder).await?;

        if request.stream {
            return Ok(Completion::Stream(super::passthrough(response)));
        }

        let wire_response: OpenAiResponse = super::read_json(self.provider, response).await?;
        Ok(Completion::Response(CompletionResponse::from(wire_response)))
    }
}
