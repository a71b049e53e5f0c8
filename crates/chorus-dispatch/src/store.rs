//! Transcript persistence interface

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::DispatchError;
use crate::target::TargetId;
use crate::transcript::Transcript;

/// Where transcripts are kept between runs
///
/// Every save is a full snapshot that overwrites the previous one, so
/// saving the same state twice is harmless.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn load(&self, target: &TargetId) -> Result<Option<Transcript>, DispatchError>;

    async fn save(&self, target: &TargetId, transcript: &Transcript) -> Result<(), DispatchError>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    transcripts: DashMap<TargetId, Transcript>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot for a target, if one was saved
    pub fn snapshot(&self, target: &TargetId) -> Option<Transcript> {
        self.transcripts.get(target).map(|t| t.clone())
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn load(&self, target: &TargetId) -> Result<Option<Transcript>, DispatchError> {
        Ok(self.snapshot(target))
    }

    async fn save(&self, target: &TargetId, transcript: &Transcript) -> Result<(), DispatchError> {
        self.transcripts.insert(target.clone(), transcript.clone());
        Ok(())
    }
}
