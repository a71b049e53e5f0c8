use serde::{Deserialize, Serialize};

/// One normalized incremental unit of a streamed response
///
/// Every delta is meaningful on its own, so any prefix of a delta sequence
/// folds into a valid (possibly incomplete) turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    ContentFragment(String),
    ReasoningFragment(String),
    /// Replaces any earlier snapshot for the same turn
    UsageSnapshot(Usage),
    IdentifierAssigned(String),
    /// Natural end of a successful stream, delivered exactly once
    Terminal,
}

/// Token accounting reported by a vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl Usage {
    /// Snapshot whose total is the sum of both counts
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}
