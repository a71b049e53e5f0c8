//! Conversion between normalized types and the `OpenAI` wire format
//!
//! Streams need no conversion: `OpenAI`-compatible frames already have the
//! normalized shape and are passed through untouched.

use crate::protocol::openai::{
    OpenAiContent, OpenAiContentPart, OpenAiImageUrl, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamOptions,
};
use crate::types::{AttachmentKind, CompletionRequest, CompletionResponse, Role};

/// Build the chat completion body
///
/// `canonical` is true for `api.openai.com`, which accepts `stream_options`
/// but rejects the `enable_thinking` extension.
pub fn build_request(request: &CompletionRequest, canonical: bool) -> OpenAiRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(OpenAiMessage {
            role: Role::System.to_string(),
            content: OpenAiContent::Text(system.to_owned()),
        });
    }

    let last_user = request.messages.iter().rposition(|m| m.role == Role::User);

    for (index, message) in request.messages.iter().enumerate() {
        let content = if Some(index) == last_user {
            user_content(&message.content, request)
        } else {
            OpenAiContent::Text(message.content.clone())
        };

        messages.push(OpenAiMessage {
            role: message.role.to_string(),
            content,
        });
    }

    OpenAiRequest {
        model: request.model.clone(),
        messages,
        temperature: request.params.temperature,
        max_tokens: request.params.max_tokens,
        stream: request.stream,
        stream_options: (request.stream && canonical).then_some(OpenAiStreamOptions { include_usage: true }),
        enable_thinking: if canonical { None } else { request.enable_thinking },
    }
}

/// Text of the latest user turn plus any remote image attachments
fn user_content(text: &str, request: &CompletionRequest) -> OpenAiContent {
    let images: Vec<_> = request
        .remote_files()
        .filter(|f| f.kind == AttachmentKind::Image)
        .filter_map(|f| f.url.clone())
        .collect();

    if images.is_empty() {
        return OpenAiContent::Text(text.to_owned());
    }

    let mut parts = vec![OpenAiContentPart::Text { text: text.to_owned() }];
    parts.extend(
        images
            .into_iter()
            .map(|url| OpenAiContentPart::ImageUrl {
                image_url: OpenAiImageUrl { url },
            }),
    );
    OpenAiContent::Parts(parts)
}

impl From<OpenAiResponse> for CompletionResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let (content, reasoning, finish_reason) = resp
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                let message = choice.message;
                (
                    message.content.unwrap_or_default(),
                    message.reasoning_content.or(message.reasoning).unwrap_or_default(),
                    choice.finish_reason,
                )
            })
            .unwrap_or_default();

        Self::new(resp.id, resp.model, content)
            .with_reasoning(reasoning)
            .with_finish_reason(finish_reason)
            .with_usage(resp.usage)
    }
}
