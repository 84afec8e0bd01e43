use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier assigned to a submitted job.
///
/// Identifiers are allocated from a monotonic counter, so they are unique for
/// the lifetime of the process and strictly increasing in submission order.
pub type JobId = u64;

/// Error a job may fail with. Entirely caller-defined.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of running a job to completion.
pub type JobResult<T> = std::result::Result<T, JobError>;

/// A job failure after capture, shared between all clones of a task handle.
pub type CapturedError = Arc<dyn std::error::Error + Send + Sync>;

/// Cancellation flag shared between a task handle and the job it runs.
///
/// Cancellation is best-effort: a job that polls the token can stop early,
/// but one that ignores it will still run to completion. Either way the
/// task's observable state is forced to `Cancelled`, so callers must not
/// assume a cancelled job had no side effects.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub(crate) fn new() -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

/// A unit of work submitted for asynchronous execution.
///
/// The queue never inspects a job beyond this single capability: run to
/// completion on exactly one worker thread, producing a result value or
/// failing. Plain closures taking a [`CancelToken`] are jobs too, via the
/// blanket implementation below.
pub trait Job: Send + 'static {
    /// Value produced on successful completion.
    type Output: Send + Sync + 'static;

    /// Run the job to completion.
    fn run(self: Box<Self>, cancel: &CancelToken) -> JobResult<Self::Output>;
}

impl<T, F> Job for F
where
    F: FnOnce(&CancelToken) -> JobResult<T> + Send + 'static,
    T: Send + Sync + 'static,
{
    type Output = T;

    fn run(self: Box<Self>, cancel: &CancelToken) -> JobResult<T> {
        self(cancel)
    }
}
