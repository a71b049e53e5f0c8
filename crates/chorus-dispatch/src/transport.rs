//! How the engine reaches the relay
//!
//! [`InProcessRelay`] calls the relay library directly; [`HttpRelay`] talks
//! to a running relay server over its `/chat` and `/suggested` routes.

use async_trait::async_trait;
use chorus_core::ProviderCredentials;
use chorus_llm::provider::extract_error_message;
use chorus_llm::{ByteStream, Completion, CompletionResponse, LlmError, Relay, RelayRequest};
use futures_util::StreamExt;
use reqwest::{Client, Response, header};
use secrecy::ExposeSecret;
use serde::Deserialize;
use url::Url;

/// One relay call per target, plus the workflow follow-up lookup
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Start a completion and return its normalized frame stream
    async fn open(&self, request: RelayRequest) -> Result<ByteStream, LlmError>;

    async fn suggested_questions(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        message_id: &str,
        user: Option<&str>,
    ) -> Result<Vec<String>, LlmError>;
}

/// Relay running in the same process
#[derive(Clone, Default)]
pub struct InProcessRelay {
    relay: Relay,
}

impl InProcessRelay {
    pub const fn new(relay: Relay) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl RelayTransport for InProcessRelay {
    async fn open(&self, request: RelayRequest) -> Result<ByteStream, LlmError> {
        let (provider_id, credentials, request) = request.into_parts();
        let completion = self.relay.relay(&provider_id, &credentials, request).await?;

        Ok(completion.into_byte_stream())
    }

    async fn suggested_questions(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        message_id: &str,
        user: Option<&str>,
    ) -> Result<Vec<String>, LlmError> {
        self.relay
            .suggested_questions(provider_id, credentials, message_id, user)
            .await
    }
}

/// Relay server reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct SuggestedBody {
    #[serde(default)]
    data: Vec<String>,
}

impl HttpRelay {
    /// `base_url` is the relay prefix, e.g. `http://127.0.0.1:8080/api`
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub const fn with_client(client: Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn send(builder: reqwest::RequestBuilder) -> Result<Response, LlmError> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "relay request failed");
            LlmError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(&body).unwrap_or_else(|| format!("relay returned {status}"));
        tracing::warn!(status = %status, "relay returned error");

        Err(LlmError::Provider { status, message })
    }
}

#[async_trait]
impl RelayTransport for HttpRelay {
    async fn open(&self, request: RelayRequest) -> Result<ByteStream, LlmError> {
        let response = Self::send(self.client.post(self.url("chat")).json(&request)).await?;

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let completion: CompletionResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;
            return Ok(Completion::Response(completion).into_byte_stream());
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| LlmError::Transport(e.to_string()))),
        ))
    }

    async fn suggested_questions(
        &self,
        provider_id: &str,
        credentials: &ProviderCredentials,
        message_id: &str,
        user: Option<&str>,
    ) -> Result<Vec<String>, LlmError> {
        let mut query = vec![("providerId", provider_id), ("messageId", message_id)];
        if let Some(user) = user {
            query.push(("user", user));
        }

        let mut builder = self
            .client
            .get(self.url("suggested"))
            .query(&query)
            .header("x-api-key", credentials.api_key.expose_secret());
        if let Some(base_url) = &credentials.base_url {
            builder = builder.header("x-base-url", base_url.as_str());
        }

        let body: SuggestedBody = Self::send(builder)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))?;

        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_urls_join_without_double_slash() {
        let relay = HttpRelay::new(Url::parse("http://127.0.0.1:8080/api/").unwrap());
        assert_eq!(relay.url("chat"), "http://127.0.0.1:8080/api/chat");

        let relay = HttpRelay::new(Url::parse("http://127.0.0.1:8080/api").unwrap());
        assert_eq!(relay.url("suggested"), "http://127.0.0.1:8080/api/suggested");
    }
}
