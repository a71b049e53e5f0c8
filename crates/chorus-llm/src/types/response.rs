use serde::{Deserialize, Serialize};

use super::delta::Usage;
use super::message::Role;
use crate::protocol::normalized::NormalizedFrame;

/// Single-shot completion, returned when streaming was not requested
///
/// Carries the same information a streamed frame sequence would, so it can
/// be replayed as frames with [`CompletionResponse::into_frames`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub object: String,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Conversation issued by a workflow-style vendor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChoiceMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl CompletionResponse {
    /// Response with a single assistant choice
    pub fn new(id: impl Into<String>, model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            object: "chat.completion".to_owned(),
            model: model.into(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: Role::Assistant,
                    content: content.into(),
                    reasoning_content: None,
                },
                finish_reason: None,
            }],
            usage: None,
            conversation_id: None,
        }
    }

    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        if let Some(choice) = self.choices.first_mut() {
            choice.message.reasoning_content = (!reasoning.is_empty()).then_some(reasoning);
        }
        self
    }

    #[must_use]
    pub fn with_finish_reason(mut self, finish_reason: Option<String>) -> Self {
        if let Some(choice) = self.choices.first_mut() {
            choice.finish_reason = finish_reason;
        }
        self
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: Option<Usage>) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: Option<String>) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    /// Text of the first choice
    pub fn content(&self) -> &str {
        self.choices.first().map_or("", |c| c.message.content.as_str())
    }

    /// Replay as the normalized frames a stream would have produced
    pub fn into_frames(self) -> Vec<NormalizedFrame> {
        let mut frame = NormalizedFrame::default().with_id(self.id);
        frame.usage = self.usage;
        frame.conversation_id = self.conversation_id;

        if let Some(choice) = self.choices.into_iter().next() {
            if let Some(reasoning) = choice.message.reasoning_content {
                frame.push_reasoning(reasoning);
            }
            frame.push_content(choice.message.content);
            frame.set_finish_reason(choice.finish_reason);
        }

        vec![frame]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_as_a_single_frame() {
        let response = CompletionResponse::new("r-1", "gpt-4o", "Hello")
            .with_reasoning("thinking")
            .with_usage(Some(Usage::new(3, 1)));

        let frames = response.into_frames();
        assert_eq!(frames.len(), 1);

        let value = serde_json::to_value(&frames[0]).unwrap();
        assert_eq!(value["id"], "r-1");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hello");
        assert_eq!(value["choices"][0]["delta"]["reasoning_content"], "thinking");
        assert_eq!(value["usage"]["total_tokens"], 4);
    }

    #[test]
    fn empty_reasoning_is_dropped() {
        let response = CompletionResponse::new("r-1", "m", "x").with_reasoning("");
        assert_eq!(response.choices[0].message.reasoning_content, None);
        assert_eq!(response.object, "chat.completion");
    }
}
