mod error;
mod job;
mod task;

pub use error::{QueueError, Result};
pub use job::{CancelToken, CapturedError, Job, JobError, JobId, JobResult};
pub use task::{Task, TaskState};
