use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{QueueError, Result};
use crate::job::{CancelToken, CapturedError, JobError, JobId};

/// Execution state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// The job has been accepted for execution and has not finished.
    Running,
    /// The job returned a result normally.
    Completed,
    /// The job raised an error or panicked; the failure is captured.
    Failed,
    /// Cancellation was requested before the job finished.
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Completed, Failed and Cancelled are terminal: no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

enum Slot<T> {
    Running,
    Completed(Arc<T>),
    Failed(CapturedError),
    Cancelled,
}

impl<T> Slot<T> {
    fn state(&self) -> TaskState {
        match self {
            Slot::Running => TaskState::Running,
            Slot::Completed(_) => TaskState::Completed,
            Slot::Failed(_) => TaskState::Failed,
            Slot::Cancelled => TaskState::Cancelled,
        }
    }
}

struct Shared<T> {
    id: JobId,
    slot: Mutex<Slot<T>>,
    done: Condvar,
    collected: AtomicBool,
    cancel: CancelToken,
}

/// Handle over one running or finished job.
///
/// Handles are cheap to clone and all clones observe the same state. The
/// worker pool drives the `complete`/`fail` transitions, cancellation drives
/// `cancel`, and the registry's retrieval path drives `mark_collected`; the
/// state itself only ever moves forward, from `Running` into exactly one
/// terminal state.
pub struct Task<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Task<T> {
    /// Create a handle in the `Running` state.
    pub fn new(id: JobId) -> Self {
        Task {
            shared: Arc::new(Shared {
                id,
                slot: Mutex::new(Slot::Running),
                done: Condvar::new(),
                collected: AtomicBool::new(false),
                cancel: CancelToken::new(),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.shared.id
    }

    /// Token handed to the job so it can observe cancellation requests.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Non-blocking state snapshot.
    pub fn state(&self) -> TaskState {
        self.shared.slot.lock().state()
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    /// The result value, if the job has completed.
    pub fn result(&self) -> Option<Arc<T>> {
        match &*self.shared.slot.lock() {
            Slot::Completed(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The captured failure, if the job has failed.
    pub fn error(&self) -> Option<CapturedError> {
        match &*self.shared.slot.lock() {
            Slot::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Flag this task as retrieved by a caller. Idempotent; a collected task
    /// becomes eligible for eviction once it is also terminal.
    pub fn mark_collected(&self) {
        self.shared.collected.store(true, Ordering::Release);
    }

    pub fn collected(&self) -> bool {
        self.shared.collected.load(Ordering::Acquire)
    }

    /// Record a normal completion. Returns false, discarding the value, if
    /// the task already reached a terminal state (a cancellation raced in
    /// first).
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Running) {
            return false;
        }
        *slot = Slot::Completed(Arc::new(value));
        drop(slot);
        self.shared.done.notify_all();
        true
    }

    /// Record a failure. Returns false, discarding the error, if the task
    /// already reached a terminal state.
    pub fn fail(&self, error: JobError) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Running) {
            return false;
        }
        *slot = Slot::Failed(Arc::from(error));
        drop(slot);
        self.shared.done.notify_all();
        true
    }

    /// Request cancellation. Returns true iff the task was still running and
    /// the request was accepted; the state is forced to `Cancelled` even if
    /// the job itself keeps executing.
    pub fn cancel(&self) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Running) {
            return false;
        }
        self.shared.cancel.set();
        *slot = Slot::Cancelled;
        drop(slot);
        self.shared.done.notify_all();
        true
    }

    /// Block until the job finishes, then return its result, re-surface its
    /// captured error, or report cancellation.
    pub fn wait(&self) -> Result<Arc<T>> {
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Running) {
            self.shared.done.wait(&mut slot);
        }
        Self::outcome(&slot)
    }

    /// Like [`wait`](Task::wait), but gives up after `timeout` with
    /// [`QueueError::Timeout`]. A timeout affects only this call; the task's
    /// own state is untouched and the job keeps running.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Arc<T>> {
        let mut slot = self.shared.slot.lock();
        let timed_out = self
            .shared
            .done
            .wait_while_for(&mut slot, |slot| matches!(slot, Slot::Running), timeout)
            .timed_out();
        if timed_out && matches!(*slot, Slot::Running) {
            return Err(QueueError::Timeout);
        }
        Self::outcome(&slot)
    }

    fn outcome(slot: &Slot<T>) -> Result<Arc<T>> {
        match slot {
            Slot::Completed(value) => Ok(value.clone()),
            Slot::Failed(error) => Err(QueueError::Failed(error.clone())),
            Slot::Cancelled => Err(QueueError::Cancelled),
            Slot::Running => unreachable!("waited task still running"),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("collected", &self.collected())
            .finish()
    }
}
