//! Gemini `generateContent` adapter

use async_trait::async_trait;
use chorus_core::ProviderCredentials;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Completion, VendorAdapter};
use crate::convert::gemini::{GeminiTranslator, into_completion_response};
use crate::error::LlmError;
use crate::protocol::gemini::{GeminiRequest, GeminiResponse};
use crate::registry::ProviderDefinition;
use crate::types::CompletionRequest;

pub struct GeminiAdapter {
    provider: &'static str,
    client: Client,
    base_url: Url,
    api_key: SecretString,
}

impl GeminiAdapter {
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

    /// `:streamGenerateContent?alt=sse` or `:generateContent`, keyed by query parameter
    fn model_url(&self, model: &str, stream: bool) -> Result<Url, LlmError> {
        let method = if stream { "streamGenerateContent" } else { "generateContent" };
        let raw = super::endpoint(&self.base_url, &format!("models/{model}:{method}"));

        let mut url = Url::parse(&raw).map_err(|e| LlmError::BadRequest(format!("invalid model url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            if stream {
                query.append_pair("alt", "sse");
            }
            query.append_pair("key", self.api_key.expose_secret());
        }
        Ok(url)
    }
}

#[async_trait]
impl VendorAdapter for GeminiAdapter {
    fn provider_id(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let wire_request = GeminiRequest::from(request);
        let url = self.model_url(&request.model, request.stream)?;

        let builder = self.client.post(url).json(&wire_request);
        let response = super::send(self.provider, builder).await?;

        if request.stream {
            return Ok(Completion::Stream(super::translate_stream(
                self.provider,
                response,
                GeminiTranslator::new(),
            )));
        }

        let wire_response: GeminiResponse = super::read_json(self.provider, response).await?;
        Ok(Completion::Response(into_completion_response(wire_response, &request.model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn key_travels_in_the_query() {
        let registry = Registry::new();
        let definition = registry.lookup("gemini").unwrap();
        let adapter = GeminiAdapter::new(definition, &ProviderCredentials::new("k-1"), Client::new()).unwrap();

        assert_eq!(
            adapter.model_url("gemini-2.5-flash", true).unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse&key=k-1"
        );
        assert_eq!(
            adapter.model_url("gemini-2.5-flash", false).unwrap().as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=k-1"
        );
    }
}
