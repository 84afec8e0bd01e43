use std::thread;
use std::time::Duration;

use job_queue::{CancelToken, JobQueue, JobResult, QueueError};

fn main() -> job_queue::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let queue: JobQueue<u64> = JobQueue::new()?;

    // Submit a job and poll its status without collecting it.
    let id = queue.submit(|_: &CancelToken| -> JobResult<u64> {
        thread::sleep(Duration::from_millis(200));
        Ok(40 + 2)
    })?;
    println!("Submitted job {}", id);
    println!("Status: {}", queue.peek(id)?.as_str());

    // Collect the task and block on its result.
    let task = queue.lookup(id)?;
    println!("Job {} finished with {}", id, task.wait()?);

    // Cancellation: the job observes the token and stops early.
    let slow = queue.submit(|cancel: &CancelToken| -> JobResult<u64> {
        while !cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(10));
        }
        Err("stopped early".into())
    })?;
    assert!(queue.cancel(slow));
    match queue.lookup(slow)?.wait() {
        Err(QueueError::Cancelled) => println!("Job {} was cancelled", slow),
        other => println!("Unexpected outcome: {:?}", other),
    }

    queue.shutdown();
    Ok(())
}
