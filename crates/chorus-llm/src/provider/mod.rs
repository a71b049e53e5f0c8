//! Vendor adapters
//!
//! One adapter per protocol variant. Each builds its vendor's request from a
//! [`CompletionRequest`], issues exactly one HTTP call, and returns either a
//! byte stream of normalized `data:` frames or a single-shot response.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod workflow;

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chorus_core::ProviderCredentials;
use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt, stream};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::convert::{FrameTranslator, Translated};
use crate::error::LlmError;
use crate::protocol::normalized;
use crate::registry::{ProtocolVariant, ProviderDefinition};
use crate::types::{CompletionRequest, CompletionResponse};

pub use self::{anthropic::AnthropicAdapter, gemini::GeminiAdapter, openai::OpenAiAdapter, workflow::WorkflowAdapter};

/// Raw response body, chunked as it arrives from the vendor
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Result of a completion call
pub enum Completion {
    /// Normalized `data:` frames, delivered as the vendor produces them
    Stream(ByteStream),
    /// Single-shot response when streaming was not requested
    Response(CompletionResponse),
}

impl Completion {
    /// View either shape as a frame stream
    pub fn into_byte_stream(self) -> ByteStream {
        match self {
            Self::Stream(stream) => stream,
            Self::Response(response) => {
                let frames: Vec<Result<Bytes, LlmError>> = response
                    .into_frames()
                    .iter()
                    .map(|frame| Ok(frame.to_sse()))
                    .chain(std::iter::once(Ok(normalized::done_frame())))
                    .collect();
                Box::pin(stream::iter(frames))
            }
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Completion::Stream(..)"),
            Self::Response(response) => f.debug_tuple("Completion::Response").field(response).finish(),
        }
    }
}

/// Capability shared by every vendor adapter
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    /// Registry identifier of the provider this adapter talks to
    fn provider_id(&self) -> &str;

    /// Send one completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// Closed set of adapters, one variant per protocol
pub enum Adapter {
    OpenAiCompatible(OpenAiAdapter),
    Anthropic(AnthropicAdapter),
    Gemini(GeminiAdapter),
    Workflow(WorkflowAdapter),
}

impl Adapter {
    pub const fn variant(&self) -> ProtocolVariant {
        match self {
            Self::OpenAiCompatible(_) => ProtocolVariant::OpenAiCompatible,
            Self::Anthropic(_) => ProtocolVariant::Anthropic,
            Self::Gemini(_) => ProtocolVariant::Gemini,
            Self::Workflow(_) => ProtocolVariant::Workflow,
        }
    }

    /// The workflow adapter, for its follow-up and upload calls
    pub const fn as_workflow(&self) -> Option<&WorkflowAdapter> {
        match self {
            Self::Workflow(adapter) => Some(adapter),
            _ => None,
        }
    }

    fn inner(&self) -> &dyn VendorAdapter {
        match self {
            Self::OpenAiCompatible(adapter) => adapter,
            Self::Anthropic(adapter) => adapter,
            Self::Gemini(adapter) => adapter,
            Self::Workflow(adapter) => adapter,
        }
    }
}

#[async_trait]
impl VendorAdapter for Adapter {
    fn provider_id(&self) -> &str {
        self.inner().provider_id()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.inner().complete(request).await
    }
}

/// Base URL from the credential override, else the provider default
fn resolve_base_url(definition: &ProviderDefinition, credentials: &ProviderCredentials) -> Result<Url, LlmError> {
    match &credentials.base_url {
        Some(url) => Ok(url.clone()),
        None => Url::parse(definition.default_endpoint)
            .map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid default endpoint for {}: {e}", definition.id))),
    }
}

/// Join a path onto a base URL that may or may not end with '/'
fn endpoint(base_url: &Url, path: &str) -> String {
    let base = base_url.as_str().trim_end_matches('/');
    format!("{base}/{path}")
}

/// Send a request, mapping network failures and non-success statuses
async fn send(provider: &str, builder: RequestBuilder) -> Result<Response, LlmError> {
    let response = builder.send().await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "upstream request failed");
        LlmError::Transport(e.to_string())
    })?;

    if !response.status().is_success() {
        return Err(provider_error(provider, response).await);
    }

    Ok(response)
}

/// Turn a non-success response into `LlmError::Provider`
///
/// Never fails: an unreadable body still yields a best-effort message.
async fn provider_error(provider: &str, response: Response) -> LlmError {
    let status = response.status();

    let message = match response.text().await {
        Ok(body) => extract_error_message(&body).unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                format!("provider returned {status}")
            } else {
                body.to_owned()
            }
        }),
        Err(e) => {
            tracing::debug!(provider = %provider, error = %e, "failed to read error body");
            format!("provider returned {status}")
        }
    };

    tracing::warn!(provider = %provider, status = %status, "upstream returned error");

    LlmError::Provider { status, message }
}

/// Vendor error message from a JSON error body
///
/// Checks `error.message`, then `message`, then a string `error`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    value
        .pointer("/error/message")
        .and_then(serde_json::Value::as_str)
        .or_else(|| value.get("message").and_then(serde_json::Value::as_str))
        .or_else(|| value.get("error").and_then(serde_json::Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .map(ToOwned::to_owned)
}

/// Read and deserialize a complete JSON body
async fn read_json<T: DeserializeOwned>(provider: &str, response: Response) -> Result<T, LlmError> {
    let body = response.bytes().await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "failed to read upstream body");
        LlmError::Transport(e.to_string())
    })?;

    serde_json::from_slice(&body).map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))
}

/// Forward the body untouched
fn passthrough(response: Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Transport(e.to_string()))),
    )
}

type EventStream = Pin<Box<dyn Stream<Item = Result<eventsource_stream::Event, LlmError>> + Send>>;

struct TranslateState<T> {
    events: EventStream,
    translator: T,
    queue: VecDeque<Result<Bytes, LlmError>>,
    finished: bool,
}

impl<T: FrameTranslator> TranslateState<T> {
    fn push(&mut self, translated: Vec<Translated>) {
        for item in translated {
            if self.finished {
                break;
            }
            match item {
                Translated::Frame(frame) => self.queue.push_back(Ok(frame.to_sse())),
                Translated::Done => {
                    self.queue.push_back(Ok(normalized::done_frame()));
                    self.finished = true;
                }
                Translated::Failed(message) => {
                    self.queue.push_back(Err(LlmError::Upstream(message)));
                    self.finished = true;
                }
            }
        }
    }
}

/// Re-encode a vendor event stream as normalized frames
///
/// Stops after the first terminal marker or in-stream error. When the
/// vendor closes the body first, the translator's `finish` frames are
/// appended.
fn translate_stream<T>(provider: &str, response: Response, translator: T) -> ByteStream
where
    T: FrameTranslator + 'static,
{
    let provider = provider.to_owned();
    let events: EventStream = Box::pin(response.bytes_stream().eventsource().map(move |event| {
        event.map_err(|e| {
            tracing::error!(provider = %provider, error = %e, "upstream stream failed");
            LlmError::Transport(e.to_string())
        })
    }));

    let state = TranslateState {
        events,
        translator,
        queue: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.events.next().await {
                Some(Ok(event)) => {
                    let translated = state.translator.translate(&event.event, &event.data);
                    state.push(translated);
                }
                Some(Err(e)) => {
                    state.queue.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    let translated = state.translator.finish();
                    state.push(translated);
                    state.finished = true;
                }
            }
        }
    }))
}
