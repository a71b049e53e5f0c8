//! The normalized frame shape every adapter emits
//!
//! `data: {id?, choices:[{delta:{content?, reasoning_content?}}], usage?}`
//! terminated by `data: [DONE]`. Workflow adapters add a top-level
//! `conversation_id`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Usage;

/// Terminal marker line
pub const DONE: &str = "[DONE]";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<FrameChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: FrameDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl NormalizedFrame {
    pub fn content(text: impl Into<String>) -> Self {
        let mut frame = Self::default();
        frame.push_content(text);
        frame
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        let mut frame = Self::default();
        frame.push_reasoning(text);
        frame
    }

    pub fn usage(usage: Usage) -> Self {
        Self {
            usage: Some(usage),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append to the content of the first choice; empty text is ignored
    pub fn push_content(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.delta_mut().content.get_or_insert_default().push_str(&text);
        }
    }

    /// Append to the reasoning of the first choice; empty text is ignored
    pub fn push_reasoning(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !text.is_empty() {
            self.delta_mut()
                .reasoning_content
                .get_or_insert_default()
                .push_str(&text);
        }
    }

    pub fn set_finish_reason(&mut self, finish_reason: Option<String>) {
        if finish_reason.is_some() {
            self.choice_mut().finish_reason = finish_reason;
        }
    }

    /// Whether the frame would carry nothing a consumer could use
    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.usage.is_none()
            && self.conversation_id.is_none()
            && self
                .choices
                .iter()
                .all(|c| c.delta.content.is_none() && c.delta.reasoning_content.is_none())
    }

    /// Encode as one `data:` record
    pub fn to_sse(&self) -> Bytes {
        let json = serde_json::to_string(self).unwrap_or_default();
        Bytes::from(format!("data: {json}\n\n"))
    }

    fn choice_mut(&mut self) -> &mut FrameChoice {
        if self.choices.is_empty() {
            self.choices.push(FrameChoice::default());
        }
        &mut self.choices[0]
    }

    fn delta_mut(&mut self) -> &mut FrameDelta {
        &mut self.choice_mut().delta
    }
}

/// The `data: [DONE]` record
pub fn done_frame() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// An in-band error record, written when a stream fails after the
/// response headers were already sent
pub fn error_frame(message: &str, error_type: &str) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "message": message,
            "type": error_type,
        }
    });
    Bytes::from(format!("data: {body}\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_frame_shape() {
        let frame = NormalizedFrame::content("Hi").with_id("m1");
        assert_eq!(
            frame.to_sse(),
            Bytes::from_static(br#"data: {"id":"m1","choices":[{"index":0,"delta":{"content":"Hi"}}]}

"#)
        );
    }

    #[test]
    fn usage_only_frame_has_no_choices() {
        let value = serde_json::to_value(NormalizedFrame::usage(Usage::new(5, 2))).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "choices": [],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })
        );
    }

    #[test]
    fn empty_text_is_not_a_delta() {
        let mut frame = NormalizedFrame::default();
        frame.push_content("");
        frame.push_reasoning("");
        assert!(frame.is_empty());
    }
}
