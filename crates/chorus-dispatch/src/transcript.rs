//! Per-target conversation state and the delta fold

use chorus_llm::{Delta, Message, Role, Usage};
use serde::{Deserialize, Serialize};

/// One turn of a target's conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reasoning: String,
    /// True from creation until the turn settles
    #[serde(default)]
    pub in_progress: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Identifier the vendor assigned to this answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    /// Workflow conversation the answer belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Set when the text was replaced by an error message
    #[serde(default)]
    pub failed: bool,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Empty assistant turn waiting for deltas
    pub fn pending() -> Self {
        Self {
            role: Role::Assistant,
            in_progress: true,
            ..Self::default()
        }
    }

    /// Fold one delta into the turn
    ///
    /// Fragments append, a usage snapshot replaces the previous one, and
    /// an identifier replaces the previous identifier. `Terminal` leaves
    /// the turn untouched; settling is the caller's decision.
    pub fn apply(&mut self, delta: &Delta) {
        match delta {
            Delta::ContentFragment(text) => self.text.push_str(text),
            Delta::ReasoningFragment(text) => self.reasoning.push_str(text),
            Delta::UsageSnapshot(usage) => self.usage = Some(*usage),
            Delta::IdentifierAssigned(id) => self.message_id = Some(id.clone()),
            Delta::Terminal => {}
        }
    }

    /// Replace the content with an error message and settle
    pub fn fail(&mut self, message: &str) {
        self.text = format!("Error: {message}");
        self.failed = true;
        self.in_progress = false;
    }

    fn as_message(&self) -> Message {
        Message::new(self.role, self.text.clone())
    }
}

/// Ordered turn history of one target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Messages to send upstream
    ///
    /// Turns still in progress are left out. Failed answers and answers
    /// that never received any text (cancelled before the first fragment)
    /// are dropped together with the user turn that produced them.
    pub fn history(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = Vec::with_capacity(self.turns.len());

        for turn in &self.turns {
            if turn.in_progress {
                continue;
            }
            if turn.failed || (turn.role == Role::Assistant && turn.text.trim().is_empty()) {
                if messages.last().is_some_and(|m| m.role == Role::User) {
                    messages.pop();
                }
                continue;
            }
            messages.push(turn.as_message());
        }

        messages
    }

    /// Most recent workflow conversation surfaced by an answer
    pub fn conversation_id(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| t.conversation_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Delta> {
        vec![
            Delta::IdentifierAssigned("m1".to_owned()),
            Delta::ReasoningFragment("let me ".to_owned()),
            Delta::ReasoningFragment("think".to_owned()),
            Delta::ContentFragment("Hel".to_owned()),
            Delta::ContentFragment("lo".to_owned()),
            Delta::UsageSnapshot(Usage::new(5, 1)),
            Delta::ContentFragment(" there".to_owned()),
            Delta::UsageSnapshot(Usage::new(5, 3)),
            Delta::Terminal,
        ]
    }

    fn fold(deltas: &[Delta]) -> Turn {
        let mut turn = Turn::pending();
        for delta in deltas {
            turn.apply(delta);
        }
        turn
    }

    #[test]
    fn fragments_concatenate_in_arrival_order() {
        let turn = fold(&sample());

        assert_eq!(turn.text, "Hello there");
        assert_eq!(turn.reasoning, "let me think");
        assert_eq!(turn.message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn usage_is_last_write_wins() {
        let turn = fold(&sample());
        assert_eq!(turn.usage, Some(Usage::new(5, 3)));
    }

    #[test]
    fn fold_is_prefix_stable() {
        let deltas = sample();
        let whole = fold(&deltas);

        for split in 0..=deltas.len() {
            let mut turn = fold(&deltas[..split]);
            for delta in &deltas[split..] {
                turn.apply(delta);
            }
            assert_eq!(turn, whole, "split at {split}");
        }
    }

    #[test]
    fn terminal_does_not_settle() {
        let turn = fold(&[Delta::Terminal]);
        assert!(turn.in_progress);
        assert!(turn.text.is_empty());
    }

    #[test]
    fn fail_replaces_content() {
        let mut turn = fold(&sample());
        turn.fail("upstream error: boom");

        assert_eq!(turn.text, "Error: upstream error: boom");
        assert!(turn.failed);
        assert!(!turn.in_progress);
    }

    #[test]
    fn history_skips_pending_and_failed_exchanges() {
        let mut transcript = Transcript::default();
        transcript.push(Turn::user("first"));
        let mut answer = fold(&sample());
        answer.in_progress = false;
        transcript.push(answer);

        transcript.push(Turn::user("second"));
        let mut failed = Turn::pending();
        failed.fail("nope");
        transcript.push(failed);

        transcript.push(Turn::user("third"));
        transcript.push(Turn::pending());

        let history = transcript.history();
        let texts: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, ["first", "Hello there", "third"]);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn history_skips_answers_without_text() {
        let mut transcript = Transcript::default();
        transcript.push(Turn::user("first"));
        let mut aborted = Turn::pending();
        aborted.in_progress = false;
        transcript.push(aborted);
        transcript.push(Turn::user("second"));

        let history = transcript.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "second");
    }

    #[test]
    fn latest_conversation_id_wins() {
        let mut transcript = Transcript::default();
        let mut first = Turn::pending();
        first.conversation_id = Some("c1".to_owned());
        transcript.push(first);
        transcript.push(Turn::user("again"));
        let mut second = Turn::pending();
        second.conversation_id = Some("c2".to_owned());
        transcript.push(second);

        assert_eq!(transcript.conversation_id(), Some("c2"));
    }
}
