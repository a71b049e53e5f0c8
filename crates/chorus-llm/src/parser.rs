//! Normalized-delta stream parser
//!
//! Turns a byte stream of `data:` records into [`Delta`]s. It is the single
//! definition of what a delta line looks like: vendor-native `OpenAI` frames
//! and frames translated by the other adapters are read identically.
//!
//! - bytes are split on `\n` before UTF-8 decoding, so characters spanning
//!   chunk boundaries survive
//! - blank lines and lines without a `data:` prefix are skipped
//! - a line that is not valid JSON is skipped, never fatal
//! - `[DONE]` yields [`Delta::Terminal`]; everything after it is ignored
//! - a clean end without `[DONE]` yields one `Terminal` after the last
//!   partial line is flushed
//! - an error from the underlying stream is yielded as-is and ends the
//!   sequence without `Terminal`
//! - an in-band `{"error": ...}` record does the same, as a [`FrameError`]

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, StreamExt};
use serde_json::Value;

use crate::protocol::normalized::DONE;
use crate::types::{Delta, Usage};

/// Delta fields that may carry reasoning text, in order of preference
const REASONING_FIELDS: [&str; 3] = ["thinking", "reasoning_content", "reasoning"];

/// Error reported in-band by the producer of the stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FrameError {
    pub message: String,
    /// The record's `type`, such as `upstream_error` or `transport_error`
    pub error_type: Option<String>,
}

/// Lazy, finite sequence of deltas read from a byte stream
pub struct DeltaStream<S> {
    inner: S,
    lines: LineDecoder,
    pending: VecDeque<Delta>,
    failure: Option<FrameError>,
    last_id: Option<String>,
    conversation_id: Option<String>,
    done: bool,
}

impl<S> DeltaStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            lines: LineDecoder::default(),
            pending: VecDeque::new(),
            failure: None,
            last_id: None,
            conversation_id: None,
            done: false,
        }
    }

    /// Workflow conversation identifier seen so far, if any
    ///
    /// Carried beside the deltas rather than as one.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    fn handle_line(&mut self, raw: &str) {
        if self.done {
            return;
        }

        let line = raw.trim();
        let payload = match line.strip_prefix("data:") {
            Some(rest) => rest.trim(),
            None if line == DONE => line,
            None => return,
        };

        if payload.is_empty() {
            return;
        }

        if payload == DONE {
            self.pending.push_back(Delta::Terminal);
            self.done = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(frame) => self.handle_frame(&frame),
            Err(e) => tracing::debug!(error = %e, "skipping unparseable frame"),
        }
    }

    /// Deltas of one frame, in the order id, reasoning, content, usage
    fn handle_frame(&mut self, frame: &Value) {
        if let Some(error) = in_band_error(frame) {
            self.failure = Some(error);
            self.done = true;
            return;
        }

        if let Some(id) = frame.get("id").and_then(Value::as_str)
            && !id.is_empty()
            && self.last_id.as_deref() != Some(id)
        {
            self.last_id = Some(id.to_owned());
            self.pending.push_back(Delta::IdentifierAssigned(id.to_owned()));
        }

        if let Some(conversation_id) = frame.get("conversation_id").and_then(Value::as_str)
            && !conversation_id.is_empty()
        {
            self.conversation_id = Some(conversation_id.to_owned());
        }

        if let Some(delta) = frame.pointer("/choices/0/delta") {
            let reasoning = REASONING_FIELDS
                .iter()
                .find_map(|field| delta.get(field).and_then(Value::as_str));
            if let Some(reasoning) = reasoning.filter(|r| !r.is_empty()) {
                self.pending.push_back(Delta::ReasoningFragment(reasoning.to_owned()));
            }

            if let Some(content) = delta.get("content").and_then(Value::as_str).filter(|c| !c.is_empty()) {
                self.pending.push_back(Delta::ContentFragment(content.to_owned()));
            }
        }

        if let Some(usage) = frame.get("usage").filter(|u| u.is_object()) {
            match serde_json::from_value::<Usage>(usage.clone()) {
                Ok(mut usage) => {
                    if usage.total_tokens == 0 {
                        usage.total_tokens = usage.prompt_tokens.saturating_add(usage.completion_tokens);
                    }
                    self.pending.push_back(Delta::UsageSnapshot(usage));
                }
                Err(e) => tracing::debug!(error = %e, "skipping malformed usage"),
            }
        }
    }
}

/// An `{"error": ...}` record that carries no choices
fn in_band_error(frame: &Value) -> Option<FrameError> {
    if frame.get("choices").is_some() {
        return None;
    }

    let error = frame.get("error")?;
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .unwrap_or("stream error");
    let error_type = error.get("type").and_then(Value::as_str).map(ToOwned::to_owned);

    Some(FrameError {
        message: message.to_owned(),
        error_type,
    })
}

impl<S, B, E> Stream for DeltaStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: From<FrameError>,
{
    type Item = Result<Delta, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(delta) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(delta)));
            }
            if let Some(error) = this.failure.take() {
                return Poll::Ready(Some(Err(error.into())));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(this.inner.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => {
                    for line in this.lines.push(chunk.as_ref()) {
                        this.handle_line(&line);
                    }
                }
                Some(Err(e)) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                None => {
                    if let Some(line) = this.lines.finish() {
                        this.handle_line(&line);
                    }
                    if !this.done {
                        this.pending.push_back(Delta::Terminal);
                        this.done = true;
                    }
                }
            }
        }
    }
}

/// Splits a byte stream into lines, keeping the trailing partial line
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Complete lines contained in the buffer after appending `chunk`
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let Some(last_newline) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, rest);

        complete
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Whatever remains once the stream has ended
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use chorus_core::HttpError;
    use futures_util::stream;

    use super::*;
    use crate::LlmError;
    use crate::convert::anthropic::AnthropicTranslator;
    use crate::convert::{FrameTranslator, Translated};
    use crate::protocol::normalized::{done_frame, error_frame};

    async fn parse(chunks: Vec<Result<Vec<u8>, LlmError>>) -> Vec<Result<Delta, LlmError>> {
        DeltaStream::new(stream::iter(chunks)).collect().await
    }

    async fn parse_ok(chunks: &[&str]) -> Vec<Delta> {
        parse(chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect())
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect()
    }

    #[tokio::test]
    async fn content_fragments_then_terminal() {
        let deltas = parse_ok(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"He\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"llo\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(
            deltas,
            vec![
                Delta::ContentFragment("He".to_owned()),
                Delta::ContentFragment("llo".to_owned()),
                Delta::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn lines_and_characters_split_across_chunks() {
        let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{1f980}\"}}]}\n\ndata: [DONE]\n\n";
        let bytes = frame.as_bytes();
        let chunks = bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

        let deltas: Vec<Delta> = parse(chunks).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            deltas,
            vec![Delta::ContentFragment("caf\u{e9} \u{1f980}".to_owned()), Delta::Terminal]
        );
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let deltas = parse_ok(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"choices\":[{\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(
            deltas,
            vec![
                Delta::ContentFragment("a".to_owned()),
                Delta::ContentFragment("b".to_owned()),
                Delta::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn residual_line_is_flushed_before_terminal() {
        let deltas = parse_ok(&[
            "event: message\ndata: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"y\"}}]}",
        ])
        .await;

        assert_eq!(
            deltas,
            vec![
                Delta::ContentFragment("x".to_owned()),
                Delta::ContentFragment("y".to_owned()),
                Delta::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn records_after_done_are_ignored() {
        let deltas = parse_ok(&[
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
            "[DONE]\n",
        ])
        .await;

        assert_eq!(deltas, vec![Delta::Terminal]);
    }

    #[tokio::test]
    async fn bare_done_marker_terminates() {
        let deltas = parse_ok(&["data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n[DONE]\n"]).await;
        assert_eq!(deltas, vec![Delta::ContentFragment("ok".to_owned()), Delta::Terminal]);
    }

    #[tokio::test]
    async fn transport_error_ends_without_terminal() {
        let results = parse(vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n".to_vec()),
            Err(LlmError::Transport("connection reset".to_owned())),
            Ok(b"data: [DONE]\n".to_vec()),
        ])
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &Delta::ContentFragment("par".to_owned()));
        assert!(matches!(&results[1], Err(LlmError::Transport(m)) if m == "connection reset"));
    }

    #[tokio::test]
    async fn in_band_error_ends_without_terminal() {
        let results = parse(vec![Ok(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {\"error\":{\"message\":\"Overloaded\",\"type\":\"upstream_error\"}}\ndata: [DONE]\n"
                .to_vec(),
        )])
        .await;

        assert_eq!(results.len(), 2);
        assert!(matches!(&results[1], Err(LlmError::Upstream(m)) if m == "Overloaded"));
    }

    #[tokio::test]
    async fn relayed_error_records_keep_their_category() {
        let cases = [
            (LlmError::Upstream("Overloaded".to_owned()), "upstream error: Overloaded"),
            (
                LlmError::Transport("connection reset".to_owned()),
                "transport error: connection reset",
            ),
        ];

        for (error, expected) in cases {
            let record = error_frame(&error.bare_message(), error.error_type());
            let results = parse(vec![Ok(record.to_vec())]).await;

            assert_eq!(results.len(), 1);
            let parsed = results.into_iter().next().unwrap().unwrap_err();
            assert_eq!(parsed.to_string(), expected);
        }
    }

    #[tokio::test]
    async fn frame_order_and_reasoning_fields() {
        let deltas = parse_ok(&[
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"A\",\"reasoning_content\":\"R\",\"reasoning\":\"ignored\"}}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":2,\"total_tokens\":3}}\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"thinking\":\"T\"}}],\"usage\":null}\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"reasoning\":\"O\"}}]}\n",
        ])
        .await;

        assert_eq!(
            deltas,
            vec![
                Delta::IdentifierAssigned("c1".to_owned()),
                Delta::ReasoningFragment("R".to_owned()),
                Delta::ContentFragment("A".to_owned()),
                Delta::UsageSnapshot(Usage::new(1, 2)),
                Delta::ReasoningFragment("T".to_owned()),
                Delta::ReasoningFragment("O".to_owned()),
                Delta::Terminal,
            ]
        );
    }

    #[tokio::test]
    async fn usage_only_frame_with_empty_choices() {
        let deltas = parse_ok(&[
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":6}}\n",
            "data: [DONE]\n",
        ])
        .await;

        assert_eq!(deltas, vec![Delta::UsageSnapshot(Usage::new(4, 6)), Delta::Terminal]);
    }

    #[tokio::test]
    async fn conversation_id_is_a_side_channel() {
        let chunks = vec![Ok::<_, LlmError>(
            b"data: {\"id\":\"m\",\"conversation_id\":\"conv-1\",\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n".to_vec(),
        )];
        let mut deltas = DeltaStream::new(stream::iter(chunks));

        assert_eq!(deltas.next().await.unwrap().unwrap(), Delta::IdentifierAssigned("m".to_owned()));
        assert_eq!(deltas.conversation_id(), Some("conv-1"));
        assert_eq!(deltas.next().await.unwrap().unwrap(), Delta::ContentFragment("x".to_owned()));
        assert_eq!(deltas.next().await.unwrap().unwrap(), Delta::Terminal);
        assert!(deltas.next().await.is_none());
    }

    #[tokio::test]
    async fn translated_anthropic_stream_parses_to_normalized_deltas() {
        let mut translator = AnthropicTranslator::new();
        let mut chunks = Vec::new();

        for (event, data) in [
            ("message_start", r#"{"message":{"id":"m1","usage":{"input_tokens":5}}}"#),
            ("content_block_delta", r#"{"delta":{"text":"Hi"}}"#),
            ("message_delta", r#"{"usage":{"output_tokens":2}}"#),
            ("message_stop", "{}"),
        ] {
            for translated in translator.translate(event, data) {
                let bytes = match translated {
                    Translated::Frame(frame) => frame.to_sse(),
                    Translated::Done => done_frame(),
                    Translated::Failed(message) => panic!("unexpected failure: {message}"),
                };
                chunks.push(Ok(bytes.to_vec()));
            }
        }

        let deltas: Vec<Delta> = parse(chunks).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(
            deltas,
            vec![
                Delta::IdentifierAssigned("m1".to_owned()),
                Delta::ContentFragment("Hi".to_owned()),
                Delta::UsageSnapshot(Usage::new(5, 2)),
                Delta::Terminal,
            ]
        );
    }
}
