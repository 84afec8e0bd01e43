use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use job_queue_core::{JobId, QueueError, Result, Task};

/// Background eviction of registry entries that are no longer interesting:
/// cancelled tasks, and finished tasks whose caller already collected them.
/// Finished-but-uncollected tasks are kept, whatever their age.
pub(crate) struct Reaper {
    stop: Mutex<Option<Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Reaper {
    pub(crate) fn spawn<T>(tasks: Arc<DashMap<JobId, Task<T>>>, interval: Duration) -> Result<Self>
    where
        T: Send + Sync + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("job-reaper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => sweep(&tasks),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(QueueError::Spawn)?;

        Ok(Reaper {
            stop: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stop scheduling further passes and wait for the thread to exit.
    pub(crate) fn stop(&self) {
        self.stop.lock().take();
        if let Some(thread) = self.thread.lock().take() {
            let _ = thread.join();
        }
    }
}

fn sweep<T>(tasks: &DashMap<JobId, Task<T>>) {
    let mut evicted = 0usize;
    tasks.retain(|id, task| {
        if evictable(task) {
            debug!("evicting job {} ({})", id, task.state().as_str());
            evicted += 1;
            false
        } else {
            true
        }
    });
    if evicted > 0 {
        debug!("reaper evicted {} entries", evicted);
    }
}

fn evictable<T>(task: &Task<T>) -> bool {
    task.is_cancelled() || (task.is_done() && task.collected())
}
