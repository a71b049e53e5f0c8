//! Multi-target dispatch and stream reconciliation for chorus
//!
//! Sends one user turn to several independently configured targets at
//! once, parses each normalized delta stream as it arrives, and keeps one
//! transcript per target. Targets settle independently: a failure, a slow
//! vendor, or a cancellation on one target never affects the others.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod engine;
pub mod error;
pub mod store;
pub mod target;
pub mod transcript;
pub mod transport;

pub use engine::{DispatchBatch, DispatchEvent, Engine, EngineBuilder, Outcome, Phase, Settlement};
pub use error::DispatchError;
pub use store::{MemoryStore, TranscriptStore};
pub use target::{TargetConfig, TargetId};
pub use transcript::{Transcript, Turn};
pub use transport::{HttpRelay, InProcessRelay, RelayTransport};
