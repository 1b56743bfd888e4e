//! Debounced persistence of the active document.
//!
//! [`SaveCoordinator`] turns a stream of tree changes into full-replace writes:
//!
//! ```text
//! idle --change--> pending --debounce elapsed--> saving --done--> idle
//!                  ^    |
//!                  +----+ change (timer re-armed, previous snapshot dropped)
//! ```
//!
//! Only the trailing snapshot of a burst of edits is written. A change that
//! arrives while a save is in flight arms a new timer; the two writes are not
//! queued against each other, the later full snapshot simply overwrites the
//! earlier one.
//!
//! A failed write never reaches the edit path. It is logged, recorded in
//! [`SaveStatus`], and retried with exponential backoff up to
//! [`AutosaveConfig::max_retries`] times as long as no newer edit or page
//! switch has superseded it. `has_unsaved_changes` stays set until a write of
//! the latest snapshot succeeds.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use ts_rs::TS;

use crate::model::Page;
use crate::projection::{DocTree, to_blocks};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::storage::{BlockStorage, StorageResult};

/// Debounce and retry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// Quiet period after the last change before a save fires
    pub debounce_ms: u64,

    /// Retries after a failed save; 0 disables retrying
    pub max_retries: u32,

    /// Delay before the first retry, doubled for each further attempt
    pub retry_backoff_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl AutosaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Save state observed by the UI chrome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SaveStatus {
    /// A write is outstanding
    pub saving: bool,

    /// Completion time of the last successful write
    pub last_saved_at: Option<DateTime<Utc>>,

    /// Last known answer of the storage availability check
    pub is_connected: bool,

    /// The latest edit has not been written yet
    pub has_unsaved_changes: bool,

    /// Message of the most recent failure affecting the latest edit
    pub last_error: Option<String>,
}

/// A snapshot waiting for its timer.
struct PendingSave {
    slot: u64,
    handle: TaskHandle,
    page_id: String,
    tree: DocTree,
    generation: u64,
    attempt: u32,
}

#[derive(Default)]
struct CoordinatorState {
    pending: Option<PendingSave>,
    /// Bumped by every change and every cancellation
    generation: u64,
    next_slot: u64,
    in_flight: usize,
}

struct Shared {
    storage: Arc<dyn BlockStorage>,
    scheduler: Arc<dyn Scheduler>,
    config: AutosaveConfig,
    state: Mutex<CoordinatorState>,
    status: watch::Sender<SaveStatus>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps the in-flight counter and the `saving` flag honest on every exit path.
struct InFlight<'a> {
    shared: &'a Shared,
}

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        lock(&shared.state).in_flight += 1;
        shared.status.send_modify(|s| s.saving = true);
        Self { shared }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let remaining = {
            let mut state = lock(&self.shared.state);
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight
        };
        self.shared.status.send_modify(|s| s.saving = remaining > 0);
    }
}

impl Shared {
    /// Arm a timer for `tree`, replacing any pending snapshot.
    ///
    /// Called with the state lock held so the timer cannot fire before the
    /// pending entry describing it exists.
    fn arm(
        self: &Arc<Self>,
        state: &mut CoordinatorState,
        delay: Duration,
        page_id: String,
        tree: DocTree,
        generation: u64,
        attempt: u32,
    ) {
        if let Some(previous) = state.pending.take() {
            self.scheduler.cancel(previous.handle);
        }

        state.next_slot += 1;
        let slot = state.next_slot;
        let shared = Arc::clone(self);
        let handle = self
            .scheduler
            .schedule(delay, Box::pin(async move { shared.fire(slot).await }));

        log::debug!(
            "[SaveCoordinator] Armed save for page {} in {:?} (attempt {})",
            page_id,
            delay,
            attempt
        );
        state.pending = Some(PendingSave {
            slot,
            handle,
            page_id,
            tree,
            generation,
            attempt,
        });
    }

    async fn fire(self: Arc<Self>, slot: u64) {
        let pending = {
            let mut state = lock(&self.state);
            let ours = state.pending.as_ref().is_some_and(|p| p.slot == slot);
            if ours { state.pending.take() } else { None }
        };
        // Superseded between firing and claiming the snapshot
        let Some(pending) = pending else {
            return;
        };
        // Already logged and recorded in the status by `save`
        if let Err(e) = self.save(pending).await {
            log::trace!("[SaveCoordinator] Timer-driven save ended with: {}", e);
        }
    }

    async fn save(self: &Arc<Self>, pending: PendingSave) -> StorageResult<()> {
        let PendingSave {
            page_id,
            tree,
            generation,
            attempt,
            ..
        } = pending;

        let result = {
            let _in_flight = InFlight::enter(self);
            let blocks = to_blocks(&tree, &page_id, Utc::now());
            log::debug!(
                "[SaveCoordinator] Writing {} blocks for page {}",
                blocks.len(),
                page_id
            );
            self.storage.replace_blocks_for_page(&page_id, blocks).await
        };

        match &result {
            Ok(()) => {
                let is_latest = lock(&self.state).generation == generation;
                let now = Utc::now();
                self.status.send_modify(|s| {
                    s.last_saved_at = Some(now);
                    s.is_connected = true;
                    if is_latest {
                        s.has_unsaved_changes = false;
                        s.last_error = None;
                    }
                });
            }
            Err(e) => {
                log::warn!(
                    "[SaveCoordinator] Save failed for page {} (attempt {}): {}",
                    page_id,
                    attempt,
                    e
                );
                let mut state = lock(&self.state);
                let is_latest = state.generation == generation && state.pending.is_none();
                if is_latest {
                    let message = e.to_string();
                    self.status.send_modify(|s| {
                        s.has_unsaved_changes = true;
                        s.last_error = Some(message);
                    });
                    if attempt < self.config.max_retries {
                        let delay = self.config.retry_delay(attempt);
                        self.arm(&mut state, delay, page_id, tree, generation, attempt + 1);
                    } else {
                        log::error!(
                            "[SaveCoordinator] Giving up on page {} after {} attempts; edits remain unsaved",
                            page_id,
                            attempt + 1
                        );
                    }
                }
            }
        }

        result
    }
}

/// Debounced, full-replace autosave for one editor session.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct SaveCoordinator {
    shared: Arc<Shared>,
}

impl SaveCoordinator {
    pub fn new(
        storage: Arc<dyn BlockStorage>,
        scheduler: Arc<dyn Scheduler>,
        config: AutosaveConfig,
    ) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        Self {
            shared: Arc::new(Shared {
                storage,
                scheduler,
                config,
                state: Mutex::new(CoordinatorState::default()),
                status,
            }),
        }
    }

    pub fn config(&self) -> &AutosaveConfig {
        &self.shared.config
    }

    /// Record a change of the document shown for `active_page`.
    ///
    /// Re-arms the debounce timer with this snapshot; any earlier pending
    /// snapshot is discarded without being written. No-op without an active page.
    pub fn on_document_changed(&self, tree: &DocTree, active_page: Option<&Page>) {
        let Some(page) = active_page else {
            return;
        };

        {
            let mut state = lock(&self.shared.state);
            state.generation += 1;
            let generation = state.generation;
            self.shared.arm(
                &mut state,
                self.shared.config.debounce(),
                page.id.clone(),
                tree.clone(),
                generation,
                0,
            );
        }
        self.shared
            .status
            .send_modify(|s| s.has_unsaved_changes = true);
    }

    /// Write the pending snapshot now instead of waiting for its timer.
    ///
    /// Returns `Ok(false)` when nothing was pending. A failure is returned to
    /// the caller as well as being handled like a timer-driven failure.
    pub async fn flush(&self) -> StorageResult<bool> {
        let pending = {
            let mut state = lock(&self.shared.state);
            state.pending.take()
        };
        let Some(pending) = pending else {
            return Ok(false);
        };
        self.shared.scheduler.cancel(pending.handle);
        self.shared.save(pending).await.map(|()| true)
    }

    /// Drop the pending snapshot and any scheduled retry.
    ///
    /// A save already in flight is not affected. Returns whether a pending
    /// snapshot was discarded.
    pub fn cancel_pending(&self) -> bool {
        let discarded = {
            let mut state = lock(&self.shared.state);
            state.generation += 1;
            state.pending.take()
        };
        let had_pending = match discarded {
            Some(pending) => {
                self.shared.scheduler.cancel(pending.handle);
                log::debug!(
                    "[SaveCoordinator] Discarded unsaved snapshot for page {}",
                    pending.page_id
                );
                true
            }
            None => false,
        };
        self.shared.status.send_modify(|s| {
            s.has_unsaved_changes = false;
            s.last_error = None;
        });
        had_pending
    }

    /// Whether a snapshot is waiting for its timer.
    pub fn has_pending(&self) -> bool {
        lock(&self.shared.state).pending.is_some()
    }

    /// Check storage availability and record it in the `is_connected` flag.
    pub async fn refresh_connection(&self) -> bool {
        let available = self.shared.storage.is_available().await;
        self.shared
            .status
            .send_modify(|s| s.is_connected = available);
        available
    }

    /// Current save status.
    pub fn status(&self) -> SaveStatus {
        self.shared.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.shared.status.subscribe()
    }
}

impl std::fmt::Debug for SaveCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveCoordinator")
            .field("config", &self.shared.config)
            .field("pending", &self.has_pending())
            .finish_non_exhaustive()
    }
}
