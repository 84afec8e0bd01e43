use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use job_queue_core::{Job, JobId, QueueError, Result, Task, TaskState};

use crate::config::QueueConfig;
use crate::pool::WorkerPool;
use crate::reaper::Reaper;

/// Registry of recent jobs, and the public face of the queue.
///
/// Submitting a job starts it on its own worker thread and returns an
/// identifier; presenting the identifier again retrieves the task handle.
/// Retrieval marks the task collected, which together with a terminal state
/// makes its entry eligible for the reaper — callers that only want to poll
/// should use [`peek`](JobQueue::peek) instead.
///
/// All operations are safe under unbounded concurrent callers; the map is
/// sharded, so unrelated submissions do not serialize against each other.
pub struct JobQueue<T: Send + Sync + 'static> {
    tasks: Arc<DashMap<JobId, Task<T>>>,
    counter: AtomicU64,
    pool: WorkerPool,
    reaper: Reaper,
    down: AtomicBool,
}

impl<T: Send + Sync + 'static> JobQueue<T> {
    /// Create a queue with the default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let tasks = Arc::new(DashMap::new());
        let pool = WorkerPool::new(&config);
        let reaper = Reaper::spawn(tasks.clone(), config.reap_interval)?;
        info!(
            "job queue started (idle timeout {:?}, reap interval {:?})",
            config.idle_timeout, config.reap_interval
        );
        Ok(JobQueue {
            tasks,
            counter: AtomicU64::new(0),
            pool,
            reaper,
            down: AtomicBool::new(false),
        })
    }

    /// Submit a job for execution and return its identifier immediately.
    ///
    /// Identifiers start at 0 and are strictly increasing across
    /// submissions, whatever the interleaving of concurrent submitters.
    pub fn submit<J>(&self, job: J) -> Result<JobId>
    where
        J: Job<Output = T>,
    {
        if self.down.load(Ordering::Acquire) {
            return Err(QueueError::ShutDown);
        }
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let task = self.pool.execute(id, job)?;
        self.tasks.insert(id, task);
        debug!("job {} submitted", id);
        Ok(id)
    }

    /// Retrieve the task handle for `id`, marking it collected.
    ///
    /// Fails with [`QueueError::NotFound`] if the identifier was never
    /// issued or its entry has been evicted.
    pub fn lookup(&self, id: JobId) -> Result<Task<T>> {
        let task = self.tasks.get(&id).ok_or(QueueError::NotFound(id))?;
        task.mark_collected();
        Ok(task.value().clone())
    }

    /// Read the state of `id` without marking it collected.
    pub fn peek(&self, id: JobId) -> Result<TaskState> {
        self.tasks
            .get(&id)
            .map(|task| task.state())
            .ok_or(QueueError::NotFound(id))
    }

    /// Request cancellation of a still-running job.
    ///
    /// Returns true iff the request was accepted; false for identifiers
    /// that are unknown, evicted, or already terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        let Some(task) = self.tasks.get(&id) else {
            return false;
        };
        let accepted = task.cancel();
        if accepted {
            debug!("job {} cancelled", id);
        }
        accepted
    }

    /// Number of registry entries not yet evicted.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tear the queue down: stop the reaper, cancel all in-flight work and
    /// refuse further submissions. Registry contents are left in place.
    /// Safe to call once; later calls (and `Drop`) are no-ops.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down job queue");
        self.reaper.stop();
        for entry in self.tasks.iter() {
            entry.value().cancel();
        }
        self.pool.shutdown();
    }
}

impl<T: Send + Sync + 'static> Drop for JobQueue<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_queue_core::{CancelToken, JobResult};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    /// Short intervals so eviction and retirement are observable in tests.
    fn test_queue() -> JobQueue<i32> {
        JobQueue::with_config(QueueConfig {
            idle_timeout: Duration::from_millis(200),
            reap_interval: Duration::from_millis(25),
            ..QueueConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_ids_start_at_zero_and_increase() {
        let queue = test_queue();
        let ids: Vec<JobId> = (0..10)
            .map(|_| {
                queue
                    .submit(|_: &CancelToken| -> JobResult<i32> { Ok(0) })
                    .unwrap()
            })
            .collect();
        assert_eq!(ids, (0..10).collect::<Vec<JobId>>());
    }

    #[test]
    fn test_wait_returns_result_after_delay() {
        let queue = test_queue();
        let id = queue
            .submit(|_: &CancelToken| -> JobResult<i32> {
                thread::sleep(Duration::from_millis(50));
                Ok(42)
            })
            .unwrap();

        let task = queue.lookup(id).unwrap();
        assert_eq!(*task.wait().unwrap(), 42);
        assert!(task.is_done());
    }

    #[test]
    fn test_failure_surfaces_the_captured_error() {
        let queue = test_queue();
        let id = queue
            .submit(|_: &CancelToken| -> JobResult<i32> { Err("boom".into()) })
            .unwrap();

        let task = queue.lookup(id).unwrap();
        match task.wait() {
            Err(QueueError::Failed(cause)) => assert_eq!(cause.to_string(), "boom"),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(!task.is_cancelled());
    }

    #[test]
    fn test_cancel_before_completion() {
        let queue = test_queue();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let id = queue
            .submit(move |_: &CancelToken| -> JobResult<i32> {
                let _ = release_rx.recv();
                Ok(1)
            })
            .unwrap();

        assert!(queue.cancel(id));
        let task = queue.lookup(id).unwrap();
        assert!(task.is_cancelled());
        assert!(matches!(task.wait(), Err(QueueError::Cancelled)));

        // Even once the job runs to completion, the state stays Cancelled.
        release_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(task.state(), TaskState::Cancelled);
    }

    #[test]
    fn test_collected_and_done_entries_are_reaped() {
        let queue = test_queue();
        let id = queue
            .submit(|_: &CancelToken| -> JobResult<i32> {
                thread::sleep(Duration::from_millis(30));
                Ok(0)
            })
            .unwrap();

        // Collect before the job finishes, then let it finish.
        let task = queue.lookup(id).unwrap();
        task.wait().unwrap();

        thread::sleep(Duration::from_millis(150));
        assert!(matches!(queue.lookup(id), Err(QueueError::NotFound(evicted)) if evicted == id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_uncollected_entries_survive_the_reaper() {
        let queue = test_queue();
        let id = queue
            .submit(|_: &CancelToken| -> JobResult<i32> { Ok(0) })
            .unwrap();

        // Poll via peek only, which must not mark the task collected.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while queue.peek(id).unwrap() == TaskState::Running {
            assert!(std::time::Instant::now() < deadline, "job never finished");
            thread::sleep(Duration::from_millis(5));
        }

        thread::sleep(Duration::from_millis(150));
        assert_eq!(queue.len(), 1);
        assert!(queue.lookup(id).is_ok());
    }

    #[test]
    fn test_cancelled_entries_are_reaped_without_collection() {
        let queue = test_queue();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let id = queue
            .submit(move |_: &CancelToken| -> JobResult<i32> {
                let _ = release_rx.recv();
                Ok(0)
            })
            .unwrap();

        assert!(queue.cancel(id));
        thread::sleep(Duration::from_millis(150));
        assert!(matches!(queue.lookup(id), Err(QueueError::NotFound(_))));

        release_tx.send(()).unwrap();
    }

    #[test]
    fn test_concurrent_submissions_get_unique_ids() {
        let queue = Arc::new(test_queue());
        let (ids_tx, ids_rx) = mpsc::channel::<JobId>();

        let submitters: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let ids_tx = ids_tx.clone();
                thread::spawn(move || {
                    for _ in 0..125 {
                        let id = queue
                            .submit(|_: &CancelToken| -> JobResult<i32> { Ok(0) })
                            .unwrap();
                        ids_tx.send(id).unwrap();
                    }
                })
            })
            .collect();
        for submitter in submitters {
            submitter.join().unwrap();
        }
        drop(ids_tx);

        let mut ids: Vec<JobId> = ids_rx.iter().collect();
        assert_eq!(ids.len(), 1000);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1000, "identifiers must be pairwise distinct");

        // Every submitted job reaches a terminal state.
        for id in ids {
            let task = queue.lookup(id).unwrap();
            assert_eq!(*task.wait_timeout(Duration::from_secs(5)).unwrap(), 0);
        }
    }

    #[test]
    fn test_cancel_unknown_or_terminal_returns_false() {
        let queue = test_queue();
        assert!(!queue.cancel(999));

        let id = queue
            .submit(|_: &CancelToken| -> JobResult<i32> { Ok(0) })
            .unwrap();
        queue.lookup(id).unwrap().wait().unwrap();
        assert!(!queue.cancel(id));
    }

    #[test]
    fn test_lookup_of_never_issued_id_fails() {
        let queue = test_queue();
        assert!(matches!(queue.lookup(123), Err(QueueError::NotFound(123))));
        assert!(matches!(queue.peek(123), Err(QueueError::NotFound(123))));
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let queue = test_queue();
        queue.shutdown();
        let result = queue.submit(|_: &CancelToken| -> JobResult<i32> { Ok(0) });
        assert!(matches!(result, Err(QueueError::ShutDown)));
    }

    #[test]
    fn test_shutdown_cancels_inflight_jobs() {
        let queue = test_queue();
        let id = queue
            .submit(|cancel: &CancelToken| -> JobResult<i32> {
                while !cancel.is_cancelled() {
                    thread::sleep(Duration::from_millis(5));
                }
                Err("observed cancellation".into())
            })
            .unwrap();

        let task = queue.lookup(id).unwrap();
        queue.shutdown();
        assert!(matches!(
            task.wait_timeout(Duration::from_secs(2)),
            Err(QueueError::Cancelled)
        ));

        // Registry contents are left in place after shutdown.
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_shutdown_twice_is_safe() {
        let queue = test_queue();
        queue.shutdown();
        queue.shutdown();
    }
}
