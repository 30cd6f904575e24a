use crate::broker::{Inbox, Submitter};
use crate::store::KvStore;
use crate::task::{SharedHandler, Task, TaskResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A single worker slot in a [`WorkerPool`][super::WorkerPool].
///
/// A worker carries nothing but its identity, which the pool assigns
/// when it starts.
#[derive(Debug, Clone, Default)]
pub struct Worker {
    id: Option<Arc<str>>,
}

impl Worker {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// The ID assigned to this worker, if it has been started.
    pub fn id(&self) -> Option<&str> { self.id.as_deref() }

    pub(super) fn assign_id(&mut self, id: Arc<str>) { self.id = Some(id); }
}

/// Everything a running worker needs, moved into its task.
pub(super) struct Context<R: ?Sized, H: ?Sized> {
    pub id: Arc<str>,
    pub inbox: Inbox<Task>,
    pub results: Arc<R>,
    pub handlers: Arc<H>,
    pub cancel: CancellationToken,
}

#[tracing::instrument(skip_all, name = "worker.run", fields(worker_id = %context.id))]
pub(super) async fn run<R, H>(context: Context<R, H>)
where
    R: Submitter<TaskResult> + ?Sized,
    H: KvStore<String, SharedHandler> + ?Sized,
{
    tracing::info!("worker starting");

    loop {
        let task = tokio::select! {
            biased;
            () = context.cancel.cancelled() => {
                tracing::info!("received shutdown signal, stopping worker");
                break;
            }
            task = context.inbox.recv() => task,
        };

        let Some(task) = task else {
            tracing::info!("task queue closed, stopping worker");
            break;
        };

        process(&context, task).await;
    }
}

async fn process<R, H>(context: &Context<R, H>, task: Task)
where
    R: Submitter<TaskResult> + ?Sized,
    H: KvStore<String, SharedHandler> + ?Sized,
{
    let Some(handler) = context.handlers.get(&task.task_type) else {
        tracing::warn!(
            task_id = %task.id,
            task_type = %task.task_type,
            "no handler registered for task type"
        );
        return;
    };

    tracing::info!(task_id = %task.id, task_type = %task.task_type, "picked up task");

    let Task {
        id: task_id,
        payload,
        ..
    } = task;

    // Handlers are plain functions and may block; keep them off the
    // async workers.  This is still awaited, so a worker only ever runs
    // one handler at a time.
    let output = tokio::task::spawn_blocking(move || handler.handle(payload)).await;

    let result = match output {
        Ok(Ok(payload)) => TaskResult::success(task_id, payload),
        Ok(Err(error)) => {
            let error = format!("{error:#}");
            tracing::error!(task_id = %task_id, %error, "failed to process task");
            TaskResult::failure(task_id, error)
        }
        Err(error) => {
            tracing::error!(task_id = %task_id, %error, "handler panicked");
            TaskResult::failure(task_id, "handler panicked")
        }
    };

    let task_id = result.task_id.clone();
    if let Err(error) = context.results.submit(&context.cancel, result).await {
        tracing::warn!(task_id = %task_id, %error, "failed to submit result");
    }
}
