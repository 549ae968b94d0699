//! Generation request lifecycle
//!
//! The orchestrator owns the currently displayed bundle and the history
//! collection. At most one request is in flight: a submit while another is
//! running returns [`SubmitOutcome::Busy`] without touching the service.

use crate::collection::CollectionStore;
use crate::error::ServiceError;
use crate::generation::GenerationService;
use crate::model::{GenerationRecord, OutputBundle};
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Result of a submit
#[derive(Debug)]
pub(crate) enum SubmitOutcome {
    /// The bundle is now current and the record heads history
    Succeeded(GenerationRecord),
    /// Nothing changed; the user may retry
    Failed(ServiceError),
    /// Another request was already in flight
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Submitting,
}

struct OrchestratorState {
    phase: Phase,
    current_bundle: Option<OutputBundle>,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Drives prompt submissions against the generation service
pub(crate) struct GenerationOrchestrator {
    service: Arc<dyn GenerationService>,
    prompt: watch::Receiver<String>,
    state: Mutex<OrchestratorState>,
    history: Mutex<CollectionStore<GenerationRecord>>,
}

/// Returns the orchestrator to `Idle` when a submit ends, even if its future
/// is dropped mid-request
struct SubmitGuard<'a> {
    orchestrator: &'a GenerationOrchestrator,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.state().phase = Phase::Idle;
    }
}

impl GenerationOrchestrator {
    /// Create an orchestrator reading the committed prompt from `prompt`
    pub(crate) fn new(
        service: Arc<dyn GenerationService>,
        prompt: watch::Receiver<String>,
        history: CollectionStore<GenerationRecord>,
    ) -> Self {
        let last_timestamp = history.items().iter().map(|record| record.timestamp).max();
        Self {
            service,
            prompt,
            state: Mutex::new(OrchestratorState {
                phase: Phase::Idle,
                current_bundle: None,
                last_timestamp,
            }),
            history: Mutex::new(history),
        }
    }

    /// Submit `prompt` to the generation service
    pub(crate) async fn submit(&self, prompt: &str) -> SubmitOutcome {
        let Some(_guard) = self.begin_submit() else {
            info!("Generation already in flight, ignoring submit");
            return SubmitOutcome::Busy;
        };

        info!(prompt_len = prompt.len(), "Submitting prompt");
        match self.service.generate(prompt).await {
            Ok(bundle) => {
                let record = self.record_success(prompt, bundle);
                info!(tags = ?record.tags, timestamp = %record.timestamp, "Generation succeeded");
                SubmitOutcome::Succeeded(record)
            }
            Err(e) => {
                error!(error = %e, "Generation failed");
                SubmitOutcome::Failed(e)
            }
        }
    }

    /// Submit the currently committed prompt again
    pub(crate) async fn regenerate(&self) -> SubmitOutcome {
        let prompt = self.current_prompt();
        self.submit(&prompt).await
    }

    /// The committed prompt
    pub(crate) fn current_prompt(&self) -> String {
        self.prompt.borrow().clone()
    }

    /// True while a request is in flight
    pub(crate) fn is_loading(&self) -> bool {
        self.state().phase == Phase::Submitting
    }

    pub(crate) fn current_bundle(&self) -> Option<OutputBundle> {
        self.state().current_bundle.clone()
    }

    /// Replace the displayed bundle
    ///
    /// The only writer of the current bundle, used by both generation and
    /// share-link hydration.
    pub(crate) fn set_current_bundle(&self, bundle: OutputBundle) {
        self.state().current_bundle = Some(bundle);
    }

    /// History, newest first
    pub(crate) fn history(&self) -> Vec<GenerationRecord> {
        self.history_store().items().to_vec()
    }

    pub(crate) fn history_entry(&self, index: usize) -> Option<GenerationRecord> {
        self.history_store().get(index).cloned()
    }

    fn begin_submit(&self) -> Option<SubmitGuard<'_>> {
        let mut state = self.state();
        if state.phase == Phase::Submitting {
            return None;
        }
        state.phase = Phase::Submitting;
        Some(SubmitGuard { orchestrator: self })
    }

    fn record_success(&self, prompt: &str, bundle: OutputBundle) -> GenerationRecord {
        let timestamp = {
            let mut state = self.state();
            let timestamp = next_timestamp(state.last_timestamp, Utc::now());
            state.last_timestamp = Some(timestamp);
            timestamp
        };
        self.set_current_bundle(bundle.clone());

        let record = GenerationRecord::new(prompt, bundle, timestamp);
        self.history_store().prepend(record.clone());
        record
    }

    fn state(&self) -> MutexGuard<'_, OrchestratorState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => {
                warn!("Orchestrator state mutex was poisoned, recovering data");
                poisoned.into_inner()
            }
        }
    }

    fn history_store(&self) -> MutexGuard<'_, CollectionStore<GenerationRecord>> {
        match self.history.lock() {
            Ok(history) => history,
            Err(poisoned) => {
                warn!("History mutex was poisoned, recovering data");
                poisoned.into_inner()
            }
        }
    }
}

/// Millisecond timestamp strictly after `last`
///
/// Records are keyed by timestamp, so two generations inside the same
/// millisecond must not share one.
fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(3);
    match last {
        Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
        _ => now,
    }
}
