//! Conversion between normalized types and vendor wire formats
//!
//! Request builders turn a [`CompletionRequest`](crate::types::CompletionRequest)
//! into each vendor's body. Stream translators turn vendor-native SSE events
//! into normalized frames.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod workflow;

use crate::protocol::normalized::NormalizedFrame;

/// Outcome of translating one vendor event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translated {
    Frame(NormalizedFrame),
    /// The vendor signalled a natural end
    Done,
    /// The vendor reported an error inside the stream
    Failed(String),
}

/// Stateful translator from vendor-native SSE events to normalized frames
pub trait FrameTranslator: Send {
    /// Translate one event; `event_type` is the SSE `event:` field
    /// (`"message"` when the vendor sent none)
    fn translate(&mut self, event_type: &str, data: &str) -> Vec<Translated>;

    /// Frames to emit when the vendor closes the stream without a natural end
    fn finish(&mut self) -> Vec<Translated> {
        Vec::new()
    }
}

fn frame_unless_empty(frame: NormalizedFrame) -> Option<Translated> {
    (!frame.is_empty()).then_some(Translated::Frame(frame))
}
