//! Conversion between normalized types and the Anthropic wire format

use super::{FrameTranslator, Translated, frame_unless_empty};
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicRequest,
    AnthropicResponse, AnthropicStreamPayload, AnthropicThinking,
};
use crate::protocol::normalized::NormalizedFrame;
use crate::types::{AttachmentKind, CompletionRequest, CompletionResponse, Role, Usage};

/// Default max tokens when not specified (Anthropic requires this field)
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Smallest thinking budget Anthropic accepts
const MIN_THINKING_BUDGET: u32 = 1024;

// -- Outbound: normalized request -> Anthropic wire format --

impl From<&CompletionRequest> for AnthropicRequest {
    fn from(req: &CompletionRequest) -> Self {
        let max_tokens = req.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);

        // System turns live in a top-level field rather than in `messages`
        let system: Vec<&str> = req
            .system_prompt
            .as_deref()
            .into_iter()
            .chain(
                req.messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.is_empty())
            .collect();

        let last_user = req.messages.iter().rposition(|m| m.role == Role::User);

        let messages = req
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role != Role::System)
            .map(|(index, m)| AnthropicMessage {
                role: m.role.to_string(),
                content: if Some(index) == last_user {
                    user_content(&m.content, req)
                } else {
                    AnthropicContent::Text(m.content.clone())
                },
            })
            .collect();

        let thinking = req.thinking_enabled().then(|| AnthropicThinking {
            thinking_type: "enabled".to_owned(),
            budget_tokens: MIN_THINKING_BUDGET.max(max_tokens / 2),
        });

        Self {
            model: req.model.clone(),
            max_tokens,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages,
            // Extended thinking only runs at the default temperature
            temperature: if thinking.is_some() { None } else { req.params.temperature },
            stream: req.stream,
            thinking,
        }
    }
}

fn user_content(text: &str, request: &CompletionRequest) -> AnthropicContent {
    let mut blocks: Vec<AnthropicContentBlock> = request
        .remote_files()
        .filter(|f| f.kind == AttachmentKind::Image)
        .filter_map(|f| f.url.clone())
        .map(|url| AnthropicContentBlock::Image {
            source: AnthropicImageSource {
                source_type: "url".to_owned(),
                url,
            },
        })
        .collect();

    if blocks.is_empty() {
        return AnthropicContent::Text(text.to_owned());
    }

    blocks.push(AnthropicContentBlock::Text { text: text.to_owned() });
    AnthropicContent::Blocks(blocks)
}

// -- Inbound: Anthropic response -> normalized response --

impl From<AnthropicResponse> for CompletionResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let mut content = String::new();
        let mut reasoning = String::new();

        for block in resp.content {
            if let Some(text) = block.text {
                content.push_str(&text);
            }
            if let Some(thinking) = block.thinking {
                reasoning.push_str(&thinking);
            }
        }

        let usage = resp.usage.map(|u| {
            Usage::new(u.input_tokens.unwrap_or_default(), u.output_tokens.unwrap_or_default())
        });

        Self::new(resp.id, resp.model, content)
            .with_reasoning(reasoning)
            .with_finish_reason(resp.stop_reason)
            .with_usage(usage)
    }
}

// -- Stream translation --

/// Translates Anthropic's typed event stream into normalized frames
#[derive(Debug, Default)]
pub struct AnthropicTranslator {
    prompt_tokens: u32,
}

impl AnthropicTranslator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameTranslator for AnthropicTranslator {
    fn translate(&mut self, event_type: &str, data: &str) -> Vec<Translated> {
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }

        let payload = match serde_json::from_str::<AnthropicStreamPayload>(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Anthropic SSE event");
                return Vec::new();
            }
        };

        // The `event:` line wins; `message` is the SSE default when it is absent
        let kind = match event_type {
            "" | "message" => payload.event_type.clone().unwrap_or_default(),
            other => other.to_owned(),
        };

        match kind.as_str() {
            "message_start" => {
                let Some(message) = payload.message else {
                    return Vec::new();
                };

                if let Some(input) = message.usage.and_then(|u| u.input_tokens) {
                    self.prompt_tokens = input;
                }

                message
                    .id
                    .map(|id| Translated::Frame(NormalizedFrame::default().with_id(id)))
                    .into_iter()
                    .collect()
            }

            "content_block_delta" => {
                let Some(delta) = payload.delta else {
                    return Vec::new();
                };

                let mut frame = NormalizedFrame::default();
                if let Some(thinking) = delta.thinking {
                    frame.push_reasoning(thinking);
                }
                if let Some(text) = delta.text {
                    frame.push_content(text);
                }
                frame_unless_empty(frame).into_iter().collect()
            }

            "message_delta" => {
                let Some(usage) = payload.usage else {
                    return Vec::new();
                };

                if let Some(input) = usage.input_tokens.filter(|n| *n > 0) {
                    self.prompt_tokens = input;
                }

                match usage.output_tokens {
                    Some(output) if output > 0 => {
                        vec![Translated::Frame(NormalizedFrame::usage(Usage::new(
                            self.prompt_tokens,
                            output,
                        )))]
                    }
                    _ => Vec::new(),
                }
            }

            "message_stop" => vec![Translated::Done],

            "error" => {
                let message = payload
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "anthropic stream error".to_owned());
                vec![Translated::Failed(message)]
            }

            // ping, content_block_start, content_block_stop and unknown kinds
            _ => Vec::new(),
        }
    }
}
