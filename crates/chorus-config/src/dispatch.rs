use std::time::Duration;

use serde::{Deserialize, Deserializer};

/// Dispatch engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Longest wait for the next chunk of a target's stream
    ///
    /// Unset means a stalled upstream keeps its target streaming forever.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub stream_idle_timeout: Option<Duration>,
    /// When transcripts are handed to the configured store
    #[serde(default)]
    pub persist: PersistPolicy,
    /// Fetch suggested follow-up questions after workflow targets settle
    #[serde(default = "default_true")]
    pub follow_up_suggestions: bool,
    /// End-user identifier sent to workflow-style vendors
    #[serde(default = "default_user")]
    pub user: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            stream_idle_timeout: None,
            persist: PersistPolicy::default(),
            follow_up_suggestions: true,
            user: default_user(),
        }
    }
}

/// Transcript persistence cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Save after every folded delta
    EveryMutation,
    /// Save once per settled turn
    #[default]
    OnSettle,
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    duration_str::parse(&raw)
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

fn default_user() -> String {
    "chorus".to_string()
}
