//! Debounced prompt input
//!
//! Raw edits arrive through [`DebouncedInput::on_change`]. Each edit replaces
//! the pending value and restarts the quiescence window; only when the window
//! elapses untouched is the value committed. Committed values are published
//! on a `watch` channel so the orchestrator always reads the latest prompt.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

/// Default quiescence window
pub(crate) const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Shared handle that commits a prompt immediately (used by voice input)
///
/// Every edit and every direct commit bumps a shared sequence number. A
/// debounced edit only lands if nothing happened after it, so a direct commit
/// wins over an edit still waiting for its window.
#[derive(Clone)]
pub(crate) struct PromptCommitter {
    tx: Arc<watch::Sender<String>>,
    sequence: Arc<Mutex<u64>>,
}

impl PromptCommitter {
    /// Commit `value` now, superseding any pending edit
    pub(crate) fn commit(&self, value: String) {
        let mut sequence = lock_sequence(&self.sequence);
        *sequence += 1;
        self.publish(value);
    }

    /// Start a new edit, superseding earlier ones
    fn begin_edit(&self) -> u64 {
        let mut sequence = lock_sequence(&self.sequence);
        *sequence += 1;
        *sequence
    }

    /// Commit the value of edit `edit` unless something superseded it
    fn commit_edit(&self, edit: u64, value: String) {
        let mut sequence = lock_sequence(&self.sequence);
        if *sequence != edit {
            debug!(edit, "Pending edit superseded");
            return;
        }
        *sequence += 1;
        self.publish(value);
    }

    fn is_current(&self, edit: u64) -> bool {
        *lock_sequence(&self.sequence) == edit
    }

    fn publish(&self, value: String) {
        debug!(len = value.len(), "Prompt committed");
        self.tx.send_replace(value);
    }
}

fn lock_sequence(sequence: &Mutex<u64>) -> MutexGuard<'_, u64> {
    match sequence.lock() {
        Ok(sequence) => sequence,
        Err(poisoned) => {
            warn!("Prompt sequence mutex was poisoned, recovering data");
            poisoned.into_inner()
        }
    }
}

struct PendingEdit {
    edit: u64,
    value: String,
    handle: JoinHandle<()>,
}

/// Coalesces rapid edits into a single committed prompt
pub(crate) struct DebouncedInput {
    window: Duration,
    committer: PromptCommitter,
    pending: Option<PendingEdit>,
}

impl DebouncedInput {
    pub(crate) fn new(window: Duration) -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self {
            window,
            committer: PromptCommitter {
                tx: Arc::new(tx),
                sequence: Arc::new(Mutex::new(0)),
            },
            pending: None,
        }
    }

    /// Record a raw edit, restarting the window
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn on_change(&mut self, raw: impl Into<String>) {
        self.cancel();

        let raw = raw.into();
        let edit = self.committer.begin_edit();
        let deadline = Instant::now() + self.window;
        let committer = self.committer.clone();
        let value = raw.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            committer.commit_edit(edit, raw);
        });
        self.pending = Some(PendingEdit {
            edit,
            value,
            handle,
        });
    }

    /// Commit the pending edit without waiting for the window
    ///
    /// An edit that already landed or was superseded is left alone.
    pub(crate) fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
            self.committer.commit_edit(pending.edit, pending.value);
        }
    }

    /// Drop the pending edit without committing it
    pub(crate) fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    /// True while an edit is waiting for the window to elapse
    pub(crate) fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| self.committer.is_current(pending.edit))
    }

    /// The committed prompt
    pub(crate) fn value(&self) -> String {
        self.committer.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<String> {
        self.committer.tx.subscribe()
    }

    pub(crate) fn committer(&self) -> PromptCommitter {
        self.committer.clone()
    }
}

impl Default for DebouncedInput {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for DebouncedInput {
    fn drop(&mut self) {
        self.cancel();
    }
}
