//! Asynchronous job-execution queue.
//!
//! Callers submit jobs; each runs on its own worker thread and is assigned a
//! monotonically increasing identifier. Presenting the identifier retrieves
//! a [`Task`] handle for polling, blocking waits, or cancellation. A
//! background reaper evicts entries for jobs that are cancelled, or finished
//! and already collected, so the registry only holds recent jobs.
//!
//! ```no_run
//! use job_queue::{CancelToken, JobQueue, JobResult};
//!
//! let queue: JobQueue<u64> = JobQueue::new()?;
//!
//! let id = queue.submit(|_: &CancelToken| -> JobResult<u64> { Ok(42) })?;
//! let task = queue.lookup(id)?;
//! assert_eq!(*task.wait()?, 42);
//!
//! queue.shutdown();
//! # Ok::<(), job_queue::QueueError>(())
//! ```

mod config;
mod pool;
mod registry;
mod reaper;

pub use config::QueueConfig;
pub use pool::WorkerPool;
pub use registry::JobQueue;

pub use job_queue_core::{
    CancelToken, CapturedError, Job, JobError, JobId, JobResult, QueueError, Result, Task,
    TaskState,
};
