mod process;

pub use self::process::Worker;

use crate::broker::{Dequeuer, Submitter};
use crate::store::KvStore;
use crate::task::{SharedHandler, Task, TaskResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A fixed set of concurrently running workers.
///
/// Each worker pulls tasks from a shared source, runs the handler
/// registered for the task's type, and sends the result on.  Workers
/// run in parallel with each other, but each one handles only one
/// task at a time, in the order it received them.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    tracker: TaskTracker,
}

impl WorkerPool {
    /// Creates a pool of `count` workers.
    #[must_use]
    pub fn new(count: usize) -> Self { Self::from_workers(vec![Worker::new(); count]) }

    #[must_use]
    pub fn from_workers(workers: Vec<Worker>) -> Self {
        Self {
            workers,
            tracker: TaskTracker::new(),
        }
    }

    pub fn len(&self) -> usize { self.workers.len() }

    pub fn is_empty(&self) -> bool { self.workers.is_empty() }

    pub fn workers(&self) -> &[Worker] { &self.workers }

    /// Starts every worker.
    ///
    /// This returns immediately; the workers keep running until
    /// `cancel` fires, which is the only way to stop them.  A worker
    /// that is in the middle of a handler when that happens finishes
    /// it first, though its result is only kept if the result broker
    /// still accepts it.
    ///
    /// Each worker is given a fresh unique ID.  A pool is started once;
    /// calling this again spawns nothing.
    pub fn start<S, R, H>(
        &mut self,
        cancel: &CancellationToken,
        tasks: &S,
        results: Arc<R>,
        handlers: Arc<H>,
    ) where
        S: Dequeuer<Task> + ?Sized,
        R: Submitter<TaskResult> + ?Sized + 'static,
        H: KvStore<String, SharedHandler> + ?Sized + 'static,
    {
        if self.tracker.is_closed() {
            tracing::warn!("worker pool already started");
            return;
        }

        for worker in &mut self.workers {
            let id: Arc<str> = Arc::from(uuid::Uuid::new_v4().to_string());
            worker.assign_id(Arc::clone(&id));

            self.tracker.spawn(process::run(process::Context {
                id,
                inbox: tasks.dequeue(cancel),
                results: Arc::clone(&results),
                handlers: Arc::clone(&handlers),
                cancel: cancel.clone(),
            }));
        }

        self.tracker.close();
    }

    /// Waits until every worker has stopped.
    ///
    /// This doesn't stop anything by itself; cancel the token the pool
    /// was started with first.  Once this returns, no worker is running
    /// a handler anymore.  On a pool that was never started, this
    /// returns immediately.
    pub async fn await_shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
