use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, error};

use job_queue_core::{Job, JobId, QueueError, Result, Task};

use crate::config::QueueConfig;

type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Unbounded, on-demand worker pool with synchronous handoff.
///
/// A submission is first offered to an idle worker over a zero-capacity
/// channel; if no worker is parked on the channel at that instant, a new
/// worker thread is spawned with the job as its first unit of work. Workers
/// that stay idle for the configured grace period retire. The pool trades
/// resource bounding for latency: a submission never waits behind a queue,
/// and admission control is the caller's concern.
pub struct WorkerPool {
    handoff: RwLock<Option<Sender<Runnable>>>,
    jobs: Receiver<Runnable>,
    idle_timeout: Duration,
    thread_name_prefix: String,
    worker_stack_size: Option<usize>,
    next_worker: AtomicUsize,
    live_workers: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(config: &QueueConfig) -> Self {
        let (tx, rx) = bounded::<Runnable>(0);
        WorkerPool {
            handoff: RwLock::new(Some(tx)),
            jobs: rx,
            idle_timeout: config.idle_timeout,
            thread_name_prefix: config.thread_name_prefix.clone(),
            worker_stack_size: config.worker_stack_size,
            next_worker: AtomicUsize::new(0),
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Accept a job for execution, returning its task handle immediately.
    ///
    /// The handle starts out `Running`; the pool records the job's outcome
    /// on it when execution finishes. Fails only if a fresh worker thread
    /// could not be spawned, or after shutdown.
    pub fn execute<J: Job>(&self, id: JobId, job: J) -> Result<Task<J::Output>> {
        let task = Task::new(id);
        let handle = task.clone();
        self.dispatch(Box::new(move || run_job(id, job, &handle)))?;
        Ok(task)
    }

    /// Number of worker threads currently alive, busy or idle.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Disconnect the handoff channel: idle workers exit immediately, no
    /// further work is accepted. Jobs already running are not waited for.
    pub fn shutdown(&self) {
        self.handoff.write().take();
    }

    fn dispatch(&self, runnable: Runnable) -> Result<()> {
        let guard = self.handoff.read();
        let sender = guard.as_ref().ok_or(QueueError::ShutDown)?;
        match sender.try_send(runnable) {
            Ok(()) => Ok(()),
            // No worker parked on the channel right now: spawn one.
            Err(TrySendError::Full(runnable)) => self.spawn_worker(runnable),
            Err(TrySendError::Disconnected(_)) => Err(QueueError::ShutDown),
        }
    }

    fn spawn_worker(&self, first: Runnable) -> Result<()> {
        let name = format!(
            "{}-{}",
            self.thread_name_prefix,
            self.next_worker.fetch_add(1, Ordering::Relaxed)
        );
        let jobs = self.jobs.clone();
        let idle_timeout = self.idle_timeout;
        let live = self.live_workers.clone();

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(stack_size) = self.worker_stack_size {
            builder = builder.stack_size(stack_size);
        }

        live.fetch_add(1, Ordering::AcqRel);
        let spawned = builder.spawn(move || {
            debug!("worker {} started", name);
            worker_loop(first, jobs, idle_timeout);
            live.fetch_sub(1, Ordering::AcqRel);
            debug!("worker {} retired", name);
        });

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                self.live_workers.fetch_sub(1, Ordering::AcqRel);
                Err(QueueError::Spawn(e))
            }
        }
    }
}

fn worker_loop(first: Runnable, jobs: Receiver<Runnable>, idle_timeout: Duration) {
    first();
    loop {
        match jobs.recv_timeout(idle_timeout) {
            Ok(runnable) => runnable(),
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn run_job<J: Job>(id: JobId, job: J, task: &Task<J::Output>) {
    let cancel = task.cancel_token();
    if cancel.is_cancelled() {
        debug!("job {} cancelled before start", id);
        return;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| Box::new(job).run(&cancel))) {
        Ok(Ok(value)) => {
            if !task.complete(value) {
                debug!("job {} finished after cancellation, result discarded", id);
            }
        }
        Ok(Err(cause)) => {
            debug!("job {} failed: {}", id, cause);
            task.fail(cause);
        }
        Err(payload) => {
            let message = panic_message(payload);
            error!("job {} panicked: {}", id, message);
            task.fail(Box::new(PanicError(message)));
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Failure recorded for a job that panicked instead of returning an error.
#[derive(Debug)]
struct PanicError(String);

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job panicked: {}", self.0)
    }
}

impl std::error::Error for PanicError {}
