//! Cancellable delayed tasks.
//!
//! The save coordinator never touches timers directly; it goes through a
//! [`Scheduler`] so the debounce state machine can run against real time
//! ([`TokioScheduler`]) or a virtual clock ([`ManualScheduler`]).
//!
//! A task is *pending* until its delay elapses and *fired* afterwards.
//! [`Scheduler::cancel`] only affects pending tasks; a fired task always runs
//! to completion.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::storage::BoxFuture;

/// Identifies a scheduled task for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Runs futures after a delay, with cancellation of not-yet-fired tasks.
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle;

    /// Cancel a pending task.
    ///
    /// Returns `true` if the task had not fired yet and will now never run.
    fn cancel(&self, handle: TaskHandle) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler backed by tokio timers.
///
/// Each scheduled task is a spawned tokio task that sleeps, then claims its
/// slot in the armed table. Cancelling removes the slot and aborts the sleep;
/// whichever side takes the slot first wins.
pub struct TokioScheduler {
    handle: Handle,
    next_id: AtomicU64,
    armed: Arc<Mutex<HashMap<u64, Option<AbortHandle>>>>,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            armed: Arc::default(),
        }
    }

    /// Create a scheduler for the runtime this is called from, if any.
    pub fn from_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Number of armed (not yet fired) timers.
    pub fn pending(&self) -> usize {
        lock(&self.armed).len()
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let armed = Arc::clone(&self.armed);

        // Held across the spawn so the timer cannot claim its slot before it exists
        let mut slots = lock(&self.armed);
        slots.insert(id, None);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let claimed = lock(&armed).remove(&id).is_some();
            if claimed {
                task.await;
            }
        });
        slots.insert(id, Some(join.abort_handle()));

        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        match lock(&self.armed).remove(&handle.0) {
            Some(abort) => {
                if let Some(abort) = abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }
}

struct ScheduledTask {
    due: Duration,
    id: u64,
    task: BoxFuture<'static, ()>,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    queue: Vec<ScheduledTask>,
}

/// Virtual-clock scheduler for deterministic tests.
///
/// Time only moves when [`ManualScheduler::advance`] is awaited. Due tasks
/// run in due-time order (scheduling order for ties), each to completion,
/// before the clock moves past them.
#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time since creation.
    pub fn now(&self) -> Duration {
        lock(&self.state).now
    }

    /// Number of tasks waiting to fire.
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Move the clock forward by `by`, running every task that falls due,
    /// including tasks scheduled by the tasks being run.
    pub async fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            let next = {
                let mut state = lock(&self.state);
                let position = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due <= target)
                    .min_by_key(|(_, t)| (t.due, t.id))
                    .map(|(i, _)| i);
                position.map(|i| {
                    let scheduled = state.queue.remove(i);
                    state.now = state.now.max(scheduled.due);
                    scheduled.task
                })
            };
            match next {
                Some(task) => task.await,
                None => break,
            }
        }
        let mut state = lock(&self.state);
        state.now = state.now.max(target);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: BoxFuture<'static, ()>) -> TaskHandle {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        let due = state.now + delay;
        state.queue.push(ScheduledTask { due, id, task });
        TaskHandle(id)
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = lock(&self.state);
        let before = state.queue.len();
        state.queue.retain(|t| t.id != handle.0);
        state.queue.len() != before
    }
}
