use std::time::Duration;

use job_queue_core::{QueueError, Result};

/// Tuning knobs for a [`JobQueue`](crate::JobQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long an idle worker thread waits for another job before retiring.
    pub idle_timeout: Duration,
    /// How often the reaper sweeps the registry for evictable entries.
    pub reap_interval: Duration,
    /// Worker threads are named `{prefix}-{n}`.
    pub thread_name_prefix: String,
    /// Stack size for worker threads, if overridden.
    pub worker_stack_size: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            idle_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(60),
            thread_name_prefix: "job-worker".to_string(),
            worker_stack_size: None,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(QueueError::Config("idle_timeout must be > 0".to_string()));
        }
        if self.reap_interval.is_zero() {
            return Err(QueueError::Config("reap_interval must be > 0".to_string()));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(QueueError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
