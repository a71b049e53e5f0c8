//! Fan-out dispatch and per-target stream reconciliation
//!
//! Each target moves through `Idle → Dispatched → Streaming → Settled` on
//! its own task. A fold only lands when the target's generation still
//! matches and its cancellation token has not fired, so a superseded or
//! cancelled task can never write into a transcript.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chorus_config::{DispatchConfig, PersistPolicy};
use chorus_core::ProviderCredentials;
use chorus_llm::relay::missing_key_message;
use chorus_llm::types::CompletionParams;
use chorus_llm::{CompletionRequest, Delta, DeltaStream, LlmError, Message, ProtocolVariant, Registry, RelayRequest};
use chorus_telemetry::DispatchMetrics;
use dashmap::DashMap;
use futures_util::StreamExt;
use indexmap::IndexMap;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::DispatchError;
use crate::store::TranscriptStore;
use crate::target::{TargetConfig, TargetId};
use crate::transcript::{Transcript, Turn};
use crate::transport::RelayTransport;

const EVENT_CAPACITY: usize = 256;

/// How a target's turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The turn's text was replaced by `Error: <message>`
    Error(String),
    /// Cancelled; the turn keeps whatever had arrived
    Aborted,
}

impl Outcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error(_) => "error",
            Self::Aborted => "aborted",
        }
    }
}

/// Lifecycle of a target's latest turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Dispatched,
    Streaming,
    Settled(Outcome),
}

impl Phase {
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Dispatched | Self::Streaming)
    }
}

/// Final state of one target in a batch
#[derive(Debug, Clone)]
pub struct Settlement {
    pub target: TargetId,
    pub outcome: Outcome,
    pub turn: Turn,
}

/// Progress notifications for observers
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Dispatched { target: TargetId },
    /// The target's latest turn changed
    Updated { target: TargetId, turn: Turn },
    Settled(Settlement),
}

/// Handle on the targets started by one `dispatch` call
pub struct DispatchBatch {
    targets: Vec<TargetId>,
    receiver: mpsc::UnboundedReceiver<Settlement>,
}

impl DispatchBatch {
    pub fn targets(&self) -> &[TargetId] {
        &self.targets
    }

    /// Next target to settle, in settle order
    pub async fn next_settled(&mut self) -> Option<Settlement> {
        self.receiver.recv().await
    }

    /// Wait for every target, returned in dispatch order
    pub async fn settled(mut self) -> Vec<Settlement> {
        let mut settlements = Vec::with_capacity(self.targets.len());
        while let Some(settlement) = self.receiver.recv().await {
            settlements.push(settlement);
        }

        let position = |id: &TargetId| self.targets.iter().position(|t| t == id);
        settlements.sort_by_key(|s| position(&s.target));
        settlements
    }
}

#[derive(Default)]
struct Slot {
    transcript: Transcript,
    phase: Phase,
    generation: u64,
    cancel: CancellationToken,
}

struct Job {
    target: TargetConfig,
    generation: u64,
    cancel: CancellationToken,
    history: Vec<Message>,
    conversation_id: Option<String>,
    started: Instant,
}

struct Inner {
    transport: Arc<dyn RelayTransport>,
    registry: Registry,
    credentials: IndexMap<String, ProviderCredentials>,
    settings: DispatchConfig,
    store: Option<Arc<dyn TranscriptStore>>,
    slots: DashMap<TargetId, Slot>,
    generation: AtomicU64,
    /// Number of `clear()` calls in flight; dispatch is refused while non-zero
    clearing: AtomicUsize,
    dispatch_lock: Mutex<()>,
    tracker: TaskTracker,
    events: broadcast::Sender<DispatchEvent>,
    metrics: DispatchMetrics,
}

/// Builder for [`Engine`]
pub struct EngineBuilder {
    transport: Arc<dyn RelayTransport>,
    registry: Registry,
    credentials: IndexMap<String, ProviderCredentials>,
    settings: DispatchConfig,
    store: Option<Arc<dyn TranscriptStore>>,
}

impl EngineBuilder {
    #[must_use]
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Shared credentials, keyed by provider id
    #[must_use]
    pub fn credentials(mut self, credentials: IndexMap<String, ProviderCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn settings(mut self, settings: DispatchConfig) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Engine {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Engine {
            inner: Arc::new(Inner {
                transport: self.transport,
                registry: self.registry,
                credentials: self.credentials,
                settings: self.settings,
                store: self.store,
                slots: DashMap::new(),
                generation: AtomicU64::new(0),
                clearing: AtomicUsize::new(0),
                dispatch_lock: Mutex::new(()),
                tracker: TaskTracker::new(),
                events,
                metrics: DispatchMetrics::new(),
            }),
        }
    }
}

/// Fans user turns out to targets and keeps one transcript per target
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn builder(transport: Arc<dyn RelayTransport>) -> EngineBuilder {
        EngineBuilder {
            transport,
            registry: Registry::new(),
            credentials: IndexMap::new(),
            settings: DispatchConfig::default(),
            store: None,
        }
    }

    /// Send one user turn to every target
    ///
    /// Appends the user turn and an in-progress answer to each target
    /// before returning, then streams every target on its own task. Fails
    /// without touching any transcript when a target is still streaming.
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, text: &str, targets: Vec<TargetConfig>) -> Result<DispatchBatch, DispatchError> {
        if targets.is_empty() || text.trim().is_empty() {
            return Err(DispatchError::EmptyDispatch);
        }

        let _guard = self
            .inner
            .dispatch_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.is_clearing() {
            return Err(DispatchError::Clearing);
        }

        let mut seen = HashSet::with_capacity(targets.len());
        for target in &targets {
            if !seen.insert(&target.id) {
                return Err(DispatchError::DuplicateTarget(target.id.clone()));
            }
            if self.inner.slots.get(&target.id).is_some_and(|s| s.phase.is_busy()) {
                return Err(DispatchError::TargetBusy(target.id.clone()));
            }
        }

        let ids: Vec<TargetId> = targets.iter().map(|t| t.id.clone()).collect();
        let (sender, receiver) = mpsc::unbounded_channel();

        for target in targets {
            let job = self.inner.begin(text, target);
            let inner = Arc::clone(&self.inner);
            let sender = sender.clone();

            self.inner.tracker.spawn(async move {
                let settlement = inner.run(job).await;
                let _ = sender.send(settlement);
            });
        }

        Ok(DispatchBatch {
            targets: ids,
            receiver,
        })
    }

    /// Stop a streaming target
    ///
    /// Returns false when the target has nothing in flight.
    pub fn cancel(&self, target: &TargetId) -> bool {
        let Some(slot) = self.inner.slots.get(target) else {
            return false;
        };
        if !slot.phase.is_busy() {
            return false;
        }

        slot.cancel.cancel();
        tracing::debug!(target_id = %target, "cancellation requested");
        true
    }

    /// Stop every streaming target
    pub fn cancel_all(&self) {
        for slot in &self.inner.slots {
            if slot.phase.is_busy() {
                slot.cancel.cancel();
            }
        }
    }

    /// Cancel everything, wait for the tasks to stop, then drop every
    /// transcript
    ///
    /// Dispatches made while this runs fail with [`DispatchError::Clearing`].
    pub async fn clear(&self) {
        let _clearing = {
            let _guard = self
                .inner
                .dispatch_lock
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            ClearingGuard::enter(&self.inner.clearing)
        };

        for slot in &self.inner.slots {
            slot.cancel.cancel();
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();

        let targets: Vec<TargetId> = self.inner.slots.iter().map(|s| s.key().clone()).collect();
        self.inner.slots.clear();

        if let Some(store) = &self.inner.store {
            let empty = Transcript::default();
            for target in &targets {
                if let Err(e) = store.save(target, &empty).await {
                    tracing::warn!(target_id = %target, error = %e, "failed to persist cleared transcript");
                }
            }
        }
    }

    pub fn is_clearing(&self) -> bool {
        self.inner.clearing.load(Ordering::Acquire) > 0
    }

    /// Load saved transcripts for targets the engine has not seen yet
    ///
    /// Returns how many transcripts were restored.
    pub async fn restore(&self, targets: &[TargetId]) -> Result<usize, DispatchError> {
        let Some(store) = &self.inner.store else {
            return Ok(0);
        };

        let mut restored = 0;
        for target in targets {
            let Some(mut transcript) = store.load(target).await? else {
                continue;
            };

            // an answer saved mid-stream can never finish now
            for turn in &mut transcript.turns {
                turn.in_progress = false;
            }

            if let dashmap::mapref::entry::Entry::Vacant(entry) = self.inner.slots.entry(target.clone()) {
                entry.insert(Slot {
                    transcript,
                    ..Slot::default()
                });
                restored += 1;
            }
        }

        Ok(restored)
    }

    /// Snapshot of a target's transcript
    pub fn transcript(&self, target: &TargetId) -> Option<Transcript> {
        self.inner.slots.get(target).map(|s| s.transcript.clone())
    }

    pub fn phase(&self, target: &TargetId) -> Phase {
        self.inner
            .slots
            .get(target)
            .map(|s| s.phase.clone())
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.inner.events.subscribe()
    }
}

/// Marks a `clear()` in flight until dropped
struct ClearingGuard<'a>(&'a AtomicUsize);

impl<'a> ClearingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ClearingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Inner {
    fn emit(&self, event: DispatchEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append the user turn and the pending answer
    fn begin(&self, text: &str, target: TargetConfig) -> Job {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();

        let mut slot = self.slots.entry(target.id.clone()).or_default();
        slot.generation = generation;
        slot.cancel = cancel.clone();
        slot.phase = Phase::Dispatched;
        slot.transcript.push(Turn::user(text));

        let history = slot.transcript.history();
        let conversation_id = target
            .conversation_id
            .clone()
            .or_else(|| slot.transcript.conversation_id().map(ToOwned::to_owned));

        slot.transcript.push(Turn::pending());
        drop(slot);

        tracing::debug!(target_id = %target.id, provider = %target.provider_id, "target dispatched");
        self.emit(DispatchEvent::Dispatched {
            target: target.id.clone(),
        });

        Job {
            target,
            generation,
            cancel,
            history,
            conversation_id,
            started: Instant::now(),
        }
    }

    async fn run(&self, job: Job) -> Settlement {
        if self.settings.persist == PersistPolicy::EveryMutation {
            self.persist(&job.target.id).await;
        }

        let (outcome, conversation_id, credentials) = match self.prepare(&job) {
            Err(message) => (Outcome::Error(message), None, None),
            Ok((credentials, request)) => {
                let streamed = tokio::select! {
                    biased;
                    () = job.cancel.cancelled() => None,
                    result = self.consume(&job, request) => Some(result),
                };

                match streamed {
                    None => (Outcome::Aborted, None, None),
                    Some(Ok(conversation_id)) => (Outcome::Success, conversation_id, Some(credentials)),
                    Some(Err(e)) => (Outcome::Error(e.to_string()), None, None),
                }
            }
        };

        let mut settlement = self.settle(&job, outcome, conversation_id);
        self.persist(&job.target.id).await;

        if let (Outcome::Success, Some(credentials)) = (&settlement.outcome, credentials)
            && let Some(turn) = self.follow_up(&job, &credentials, &settlement.turn).await
        {
            settlement.turn = turn;
        }

        settlement
    }

    /// Resolve credentials and build the relay body
    ///
    /// Any failure here settles the target before a network call.
    fn prepare(&self, job: &Job) -> Result<(ProviderCredentials, RelayRequest), String> {
        let target = &job.target;

        let definition = self
            .registry
            .lookup(&target.provider_id)
            .ok_or_else(|| LlmError::NotFound(target.provider_id.clone()).to_string())?;

        let credentials = target
            .resolve_credentials(&self.credentials)
            .ok_or_else(|| missing_key_message(definition))?;

        let request = CompletionRequest {
            model: target.model.clone(),
            messages: job.history.clone(),
            system_prompt: target.system_prompt.clone(),
            params: CompletionParams {
                temperature: target.temperature,
                max_tokens: target.max_tokens,
            },
            stream: true,
            enable_thinking: target.enable_thinking,
            files: target.files.clone(),
            workflow_inputs: target.workflow_inputs.clone(),
            conversation_id: job.conversation_id.clone(),
            user: Some(self.settings.user.clone()),
        };

        let body = RelayRequest::from_parts(&target.provider_id, &credentials, &request);
        Ok((credentials, body))
    }

    /// Drive one target's stream until it ends
    ///
    /// Returns the workflow conversation id surfaced by the stream, if any.
    async fn consume(&self, job: &Job, request: RelayRequest) -> Result<Option<String>, LlmError> {
        let provider = job.target.provider_id.as_str();
        let stream = self.transport.open(request).await?;
        self.mark_streaming(job);

        let mut deltas = DeltaStream::new(stream);
        let mut first = true;

        loop {
            let next = match self.settings.stream_idle_timeout {
                Some(limit) => tokio::time::timeout(limit, deltas.next())
                    .await
                    .map_err(|_| LlmError::Transport(format!("no data received for {limit:?}")))?,
                None => deltas.next().await,
            };

            let Some(delta) = next else {
                break;
            };
            let delta = delta?;
            if delta == Delta::Terminal {
                break;
            }

            if first {
                self.metrics.record_first_delta(provider, job.started);
                first = false;
            }

            if let Some(turn) = self.fold(job, &delta) {
                self.emit(DispatchEvent::Updated {
                    target: job.target.id.clone(),
                    turn,
                });
                if self.settings.persist == PersistPolicy::EveryMutation {
                    self.persist(&job.target.id).await;
                }
            }
        }

        Ok(deltas.conversation_id().map(ToOwned::to_owned))
    }

    fn mark_streaming(&self, job: &Job) {
        if let Some(mut slot) = self.slots.get_mut(&job.target.id)
            && slot.generation == job.generation
            && !job.cancel.is_cancelled()
        {
            slot.phase = Phase::Streaming;
        }
    }

    /// Apply a delta to the pending answer if this job still owns it
    fn fold(&self, job: &Job, delta: &Delta) -> Option<Turn> {
        let mut slot = self.slots.get_mut(&job.target.id)?;
        if slot.generation != job.generation || job.cancel.is_cancelled() {
            return None;
        }

        let turn = slot.transcript.last_mut()?;
        turn.apply(delta);
        Some(turn.clone())
    }

    fn settle(&self, job: &Job, outcome: Outcome, conversation_id: Option<String>) -> Settlement {
        let target = &job.target;
        let mut outcome = outcome;

        let turn = match self.slots.get_mut(&target.id) {
            Some(mut slot) if slot.generation == job.generation => {
                if job.cancel.is_cancelled() {
                    outcome = Outcome::Aborted;
                }

                let slot = &mut *slot;
                if let Some(turn) = slot.transcript.last_mut() {
                    match &outcome {
                        Outcome::Error(message) => turn.fail(message),
                        Outcome::Success => {
                            turn.in_progress = false;
                            turn.conversation_id = conversation_id;
                        }
                        Outcome::Aborted => turn.in_progress = false,
                    }
                }
                slot.phase = Phase::Settled(outcome.clone());
                slot.transcript.last().cloned().unwrap_or_default()
            }
            _ => Turn::default(),
        };

        match &outcome {
            Outcome::Error(message) => {
                tracing::warn!(target_id = %target.id, provider = %target.provider_id, error = %message, "target failed");
            }
            other => {
                tracing::info!(target_id = %target.id, provider = %target.provider_id, outcome = other.label(), "target settled");
            }
        }
        self.metrics.record_settled(&target.provider_id, outcome.label());

        let settlement = Settlement {
            target: target.id.clone(),
            outcome,
            turn,
        };
        self.emit(DispatchEvent::Settled(settlement.clone()));
        settlement
    }

    /// Best-effort follow-up questions for a settled workflow answer
    ///
    /// Failures are logged and leave the turn untouched.
    async fn follow_up(&self, job: &Job, credentials: &ProviderCredentials, turn: &Turn) -> Option<Turn> {
        if !self.settings.follow_up_suggestions {
            return None;
        }

        let target = &job.target;
        let definition = self.registry.lookup(&target.provider_id)?;
        if definition.variant != ProtocolVariant::Workflow {
            return None;
        }
        let message_id = turn.message_id.as_deref()?;

        let lookup = self.transport.suggested_questions(
            &target.provider_id,
            credentials,
            message_id,
            Some(&self.settings.user),
        );
        let result = tokio::select! {
            biased;
            () = job.cancel.cancelled() => return None,
            result = lookup => result,
        };

        let suggestions = match result {
            Ok(suggestions) if !suggestions.is_empty() => suggestions,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!(target_id = %target.id, error = %e, "follow-up suggestions unavailable");
                return None;
            }
        };

        let updated = {
            let mut slot = self.slots.get_mut(&target.id)?;
            if slot.generation != job.generation {
                return None;
            }
            let turn = slot.transcript.last_mut()?;
            turn.suggestions = suggestions;
            turn.clone()
        };

        self.emit(DispatchEvent::Updated {
            target: target.id.clone(),
            turn: updated.clone(),
        });
        self.persist(&target.id).await;

        Some(updated)
    }

    /// Overwrite the stored snapshot for a target
    async fn persist(&self, target: &TargetId) {
        let Some(store) = &self.store else {
            return;
        };
        let Some(snapshot) = self.slots.get(target).map(|s| s.transcript.clone()) else {
            return;
        };

        if let Err(e) = store.save(target, &snapshot).await {
            tracing::warn!(target_id = %target, error = %e, "failed to persist transcript");
        }
    }
}
