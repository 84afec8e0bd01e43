use thiserror::Error;

use crate::job::{CapturedError, JobId};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("No such job: {0}")]
    NotFound(JobId),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Job failed: {0}")]
    Failed(CapturedError),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Timed out waiting for job to finish")]
    Timeout,

    #[error("Queue is shut down")]
    ShutDown,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
