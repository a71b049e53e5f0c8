//! Dispatch error types

use thiserror::Error;

use crate::target::TargetId;

/// Errors returned synchronously by the engine
///
/// Per-target failures never surface here; they settle the target with an
/// error instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A target still has a turn in flight
    #[error("target '{0}' is still streaming")]
    TargetBusy(TargetId),

    /// The same target appears twice in one dispatch
    #[error("target '{0}' appears more than once")]
    DuplicateTarget(TargetId),

    /// `clear()` is cancelling and resetting every target
    #[error("transcripts are being cleared")]
    Clearing,

    /// Nothing to send
    #[error("dispatch needs at least one target and a non-empty prompt")]
    EmptyDispatch,

    /// Transcript persistence failed
    #[error("transcript store failed: {0}")]
    Store(String),
}
