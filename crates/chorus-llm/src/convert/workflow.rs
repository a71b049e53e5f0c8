//! Conversion between normalized types and the workflow-style (Dify) app API

use super::{FrameTranslator, Translated, frame_unless_empty};
use crate::protocol::normalized::{DONE, NormalizedFrame};
use crate::protocol::workflow::{WorkflowEvent, WorkflowRequest};
use crate::types::{CompletionRequest, CompletionResponse};

/// End-user identifier used when the request names none
pub const DEFAULT_USER: &str = "chorus";

/// Build the `chat-messages` body
///
/// The app receives only the latest user message as its query; earlier
/// turns are tracked by the vendor through `conversation_id`.
pub fn build_request(request: &CompletionRequest) -> WorkflowRequest {
    let query = request
        .last_user_message()
        .or_else(|| request.messages.last().map(|m| m.content.as_str()))
        .unwrap_or_default()
        .to_owned();

    WorkflowRequest {
        inputs: request.workflow_inputs.clone(),
        query,
        response_mode: if request.stream { "streaming" } else { "blocking" }.to_owned(),
        conversation_id: request.conversation_id.clone().filter(|id| !id.is_empty()),
        user: request.user.clone().unwrap_or_else(|| DEFAULT_USER.to_owned()),
        files: request.files.clone(),
    }
}

impl From<WorkflowEvent> for CompletionResponse {
    fn from(event: WorkflowEvent) -> Self {
        Self::new(
            event.message_id.unwrap_or_default(),
            "workflow",
            event.answer.unwrap_or_default(),
        )
        .with_usage(event.metadata.and_then(|m| m.usage))
        .with_conversation_id(event.conversation_id)
    }
}

/// Translates workflow events into normalized frames
///
/// Message and conversation identifiers are surfaced once per distinct
/// value rather than on every event.
#[derive(Debug, Default)]
pub struct WorkflowTranslator {
    message_id: Option<String>,
    conversation_id: Option<String>,
}

impl WorkflowTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn surface_ids(&mut self, event: &WorkflowEvent, frame: &mut NormalizedFrame) {
        if let Some(id) = event.message_id.as_ref().filter(|id| !id.is_empty())
            && self.message_id.as_ref() != Some(id)
        {
            frame.id = Some(id.clone());
            self.message_id = Some(id.clone());
        }

        if let Some(id) = event.conversation_id.as_ref().filter(|id| !id.is_empty())
            && self.conversation_id.as_ref() != Some(id)
        {
            frame.conversation_id = Some(id.clone());
            self.conversation_id = Some(id.clone());
        }
    }
}

impl FrameTranslator for WorkflowTranslator {
    fn translate(&mut self, _event_type: &str, data: &str) -> Vec<Translated> {
        let data = data.trim();
        if data.is_empty() {
            return Vec::new();
        }
        if data == DONE {
            return vec![Translated::Done];
        }

        let event = match serde_json::from_str::<WorkflowEvent>(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable workflow SSE event");
                return Vec::new();
            }
        };

        let mut frame = NormalizedFrame::default();
        self.surface_ids(&event, &mut frame);

        match event.event.as_deref() {
            Some("message" | "agent_message") => {
                if let Some(answer) = event.answer {
                    frame.push_content(answer);
                }
            }
            Some("message_end") => {
                frame.usage = event.metadata.and_then(|m| m.usage);
            }
            Some("error") => {
                let message = event
                    .message
                    .or(event.code)
                    .unwrap_or_else(|| "workflow stream error".to_owned());
                return vec![Translated::Failed(message)];
            }
            _ => {}
        }

        frame_unless_empty(frame).into_iter().collect()
    }

    fn finish(&mut self) -> Vec<Translated> {
        vec![Translated::Done]
    }
}
