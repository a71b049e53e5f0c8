//! Anthropic Messages API wire format types
//!
//! Stream payloads are deserialized leniently: the event kind comes from
//! the SSE `event:` line, so `type` may be absent from the JSON.

use serde::{Deserialize, Serialize};

// -- Request types --

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    /// Required by Anthropic
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<AnthropicThinking>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: AnthropicContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub url: String,
}

/// Extended thinking switch
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicThinking {
    #[serde(rename = "type")]
    pub thinking_type: String,
    pub budget_tokens: u32,
}

// -- Response types --

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub content: Vec<AnthropicResponseBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Text or thinking block; other block kinds carry neither field
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicResponseBlock {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: Option<u32>,
    #[serde(default)]
    pub output_tokens: Option<u32>,
}

// -- Stream types --

/// Union of the fields carried by every stream event kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicStreamPayload {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    /// `message_start`
    #[serde(default)]
    pub message: Option<AnthropicStreamMessage>,
    /// `content_block_delta` and `message_delta`
    #[serde(default)]
    pub delta: Option<AnthropicStreamDelta>,
    /// `message_delta`
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
    /// `error`
    #[serde(default)]
    pub error: Option<AnthropicErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicStreamMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicStreamDelta {
    /// `text_delta`
    #[serde(default)]
    pub text: Option<String>,
    /// `thinking_delta`
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicErrorBody {
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
