//! Conversion between normalized types and the Gemini wire format

use super::{FrameTranslator, Translated, frame_unless_empty};
use crate::protocol::gemini::{
    GeminiContent, GeminiFileData, GeminiGenerationConfig, GeminiPart, GeminiRequest, GeminiResponse,
    GeminiThinkingConfig, GeminiUsageMetadata,
};
use crate::protocol::normalized::NormalizedFrame;
use crate::types::{CompletionRequest, CompletionResponse, Role, Usage};

impl From<&CompletionRequest> for GeminiRequest {
    fn from(req: &CompletionRequest) -> Self {
        let last_user = req.messages.iter().rposition(|m| m.role == Role::User);

        let contents = req
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role != Role::System)
            .map(|(index, m)| {
                let mut parts = vec![GeminiPart::text(m.content.clone())];
                if Some(index) == last_user {
                    parts.extend(req.remote_files().filter_map(|f| {
                        f.url.clone().map(|file_uri| GeminiPart {
                            file_data: Some(GeminiFileData {
                                mime_type: f.mime_type.clone(),
                                file_uri,
                            }),
                            ..GeminiPart::default()
                        })
                    }));
                }

                GeminiContent {
                    role: Some(if m.role == Role::Assistant { "model" } else { "user" }.to_owned()),
                    parts,
                }
            })
            .collect();

        let system_parts: Vec<GeminiPart> = req
            .system_prompt
            .iter()
            .map(String::as_str)
            .chain(
                req.messages
                    .iter()
                    .filter(|m| m.role == Role::System)
                    .map(|m| m.content.as_str()),
            )
            .filter(|s| !s.is_empty())
            .map(GeminiPart::text)
            .collect();

        let generation_config = GeminiGenerationConfig {
            temperature: req.params.temperature,
            max_output_tokens: req.params.max_tokens,
            thinking_config: req
                .thinking_enabled()
                .then_some(GeminiThinkingConfig { include_thoughts: true }),
        };

        let has_generation_config = generation_config.temperature.is_some()
            || generation_config.max_output_tokens.is_some()
            || generation_config.thinking_config.is_some();

        Self {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(GeminiContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: has_generation_config.then_some(generation_config),
        }
    }
}

fn usage_from_metadata(metadata: GeminiUsageMetadata) -> Usage {
    let completion = metadata
        .candidates_token_count
        .saturating_add(metadata.thoughts_token_count);
    let mut usage = Usage::new(metadata.prompt_token_count, completion);
    if metadata.total_token_count > 0 {
        usage.total_tokens = metadata.total_token_count;
    }
    usage
}

/// Normalized frame for one candidate snapshot
fn snapshot_frame(response: &GeminiResponse) -> NormalizedFrame {
    let mut frame = NormalizedFrame::default();

    if let Some(candidate) = response.candidates.first() {
        if let Some(thought) = candidate.first_thought() {
            frame.push_reasoning(thought);
        }
        if let Some(text) = candidate.first_text() {
            frame.push_content(text);
        }
    }

    frame.usage = response.usage_metadata.map(usage_from_metadata);
    frame
}

/// Build a response from a non-streaming reply
pub fn into_completion_response(resp: GeminiResponse, requested_model: &str) -> CompletionResponse {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut finish_reason = None;

    if let Some(candidate) = resp.candidates.first() {
        for part in candidate.content.iter().flat_map(|c| &c.parts) {
            let Some(text) = part.text.as_deref() else { continue };
            if part.is_thought() {
                reasoning.push_str(text);
            } else {
                content.push_str(text);
            }
        }
        finish_reason.clone_from(&candidate.finish_reason);
    }

    let id = resp.response_id.clone().unwrap_or_default();
    let model = resp
        .model_version
        .clone()
        .unwrap_or_else(|| requested_model.to_owned());

    CompletionResponse::new(id, model, content)
        .with_reasoning(reasoning)
        .with_finish_reason(finish_reason)
        .with_usage(resp.usage_metadata.map(usage_from_metadata))
}

/// Translates Gemini candidate snapshots into normalized frames
#[derive(Debug, Default)]
pub struct GeminiTranslator {
    response_id: Option<String>,
}

impl GeminiTranslator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameTranslator for GeminiTranslator {
    fn translate(&mut self, _event_type: &str, data: &str) -> Vec<Translated> {
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }

        let response = match serde_json::from_str::<GeminiResponse>(data) {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable Gemini SSE event");
                return Vec::new();
            }
        };

        let mut frame = snapshot_frame(&response);

        if let Some(id) = response.response_id
            && self.response_id.as_ref() != Some(&id)
        {
            frame.id = Some(id.clone());
            self.response_id = Some(id);
        }

        let mut translated: Vec<Translated> = frame_unless_empty(frame).into_iter().collect();

        if response.candidates.first().is_some_and(|c| c.is_finished()) {
            translated.push(Translated::Done);
        }

        translated
    }

    /// Truncated connections still end with exactly one terminal marker
    fn finish(&mut self) -> Vec<Translated> {
        vec![Translated::Done]
    }
}
