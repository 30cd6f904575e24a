mod build;

pub use self::build::OrchestratorBuilder;

use crate::broker::{Broker, Dequeuer, Inbox, Submitter};
use crate::store::KvStore;
use crate::task::{Handler, SharedHandler, Task, TaskId, TaskResult};
use crate::worker::WorkerPool;
use crate::{Config, Error};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The handler registry: task type to handler.
pub type HandlerStore = dyn KvStore<String, SharedHandler>;
/// The results store: task ID to result.
pub type ResultStore = dyn KvStore<TaskId, TaskResult>;

/// Ties brokers, workers, and stores together.
///
/// An orchestrator runs in one of two modes, depending on
/// [`Config::workers`]:
///
/// - **local**, with an in-process [`WorkerPool`] consuming the task
///   broker and feeding the result broker;
/// - **distributed**, with no workers of its own.  The task and result
///   brokers are then remote (see [`RedisBroker`][crate::redis::RedisBroker]),
///   and some other process runs a [`WorkerPool`] against the same keys.
///
/// Either way, [`push`][Self::push] refuses task types that have no
/// handler in *this* orchestrator's registry, and a single background
/// loop moves results from the result broker into the results store.
pub struct Orchestrator {
    config: Config,
    pool: Option<WorkerPool>,
    task_broker: Arc<dyn Broker<Task>>,
    result_broker: Arc<dyn Broker<TaskResult>>,
    handlers: Arc<HandlerStore>,
    results: Arc<ResultStore>,
    cancel: CancellationToken,
    drain: Option<JoinHandle<()>>,
}

impl Orchestrator {
    #[must_use]
    pub fn builder() -> OrchestratorBuilder { OrchestratorBuilder::default() }

    /// An orchestrator with every default: in-process brokers and stores,
    /// and [`Config::default`] workers.
    #[must_use]
    pub fn new() -> Self { Self::builder().build() }

    pub fn config(&self) -> &Config { &self.config }

    /// Registers `handler` for `task_type`, replacing any previous one.
    pub fn register_handler<T: Into<String>, H: Handler>(&self, task_type: T, handler: H) {
        self.handlers
            .put(task_type.into(), Arc::new(handler) as SharedHandler);
    }

    /// Starts the workers, if there are any, and the results loop.
    ///
    /// Must be called from within a tokio runtime.  Starting an
    /// already-started orchestrator does nothing.
    pub fn start(&mut self) {
        if self.drain.is_some() {
            tracing::warn!("orchestrator already started");
            return;
        }

        if let Some(pool) = &mut self.pool {
            pool.start(
                &self.cancel,
                &*self.task_broker,
                Arc::clone(&self.result_broker),
                Arc::clone(&self.handlers),
            );
        }

        self.drain = Some(tokio::spawn(drain_results(
            self.result_broker.dequeue(&self.cancel),
            Arc::clone(&self.results),
            self.cancel.clone(),
        )));
    }

    /// Submits a new task, returning its ID.
    ///
    /// Fails straight away, without enqueuing anything, if there's no
    /// handler registered for `task_type`.  Otherwise this returns as
    /// soon as the task broker has accepted the task, which for a full
    /// in-process broker means waiting for room; completion is observed
    /// later through [`get_result`][Self::get_result].
    #[tracing::instrument(skip(self, payload))]
    pub async fn push(&self, task_type: &str, payload: Value) -> Result<TaskId, Error> {
        if self.handlers.get(&task_type.to_owned()).is_none() {
            return Err(Error::NoHandler {
                task_type: task_type.to_owned(),
            });
        }

        let task = Task::new(task_type, payload);
        let id = task.id.clone();

        self.task_broker.submit(&self.cancel, task).await?;
        tracing::debug!(task_id = %id, "submitted task");

        Ok(id)
    }

    /// Looks up the result of a task.
    ///
    /// This never waits.  `None` means the task hasn't completed, or
    /// its result hasn't been collected yet, or it never existed;
    /// callers are expected to poll.
    pub fn get_result(&self, id: &TaskId) -> Option<TaskResult> { self.results.get(id) }

    /// Stops the orchestrator.
    ///
    /// Signals every worker and background loop to stop, then waits for
    /// the workers to finish the tasks they're in the middle of, and
    /// finally for the results loop.  Results still in flight at that
    /// point may not make it into the results store.
    pub async fn stop(mut self) {
        self.cancel.cancel();

        if let Some(pool) = &self.pool {
            pool.await_shutdown().await;
        }

        if let Some(drain) = self.drain.take() {
            if let Err(error) = drain.await {
                tracing::error!(%error, "results loop failed");
            }
        }

        tracing::info!("orchestrator stopped");
    }
}

impl Default for Orchestrator {
    fn default() -> Self { Self::new() }
}

impl Drop for Orchestrator {
    fn drop(&mut self) { self.cancel.cancel(); }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("started", &self.drain.is_some())
            .finish_non_exhaustive()
    }
}

#[tracing::instrument(skip_all, name = "results.drain")]
async fn drain_results(
    inbox: Inbox<TaskResult>,
    results: Arc<ResultStore>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = inbox.recv() => result,
        };

        let Some(result) = result else {
            return;
        };

        persist(&*results, result);
    }

    // Whatever already made it into the inbox is kept.
    while let Some(result) = inbox.try_recv() {
        persist(&*results, result);
    }
}

fn persist(results: &ResultStore, result: TaskResult) {
    tracing::debug!(task_id = %result.task_id, "persisting result");
    results.put(result.task_id.clone(), result);
}
