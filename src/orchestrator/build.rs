use super::{HandlerStore, Orchestrator, ResultStore};
use crate::broker::{Broker, ChannelBroker};
use crate::store::MemoryStore;
use crate::worker::WorkerPool;
use crate::{Config, SharedHandler, Task, TaskId, TaskResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds an [`Orchestrator`].
///
/// Anything not set falls back to an in-process default: channel
/// brokers sized from the [`Config`], and in-memory stores.
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Config,
    task_broker: Option<Arc<dyn Broker<Task>>>,
    result_broker: Option<Arc<dyn Broker<TaskResult>>>,
    handlers: Option<Arc<HandlerStore>>,
    results: Option<Arc<ResultStore>>,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn with_config(self, config: Config) -> Self { Self { config, ..self } }

    /// Shorthand for setting [`Config::workers`].
    #[must_use]
    pub fn with_workers(self, workers: usize) -> Self {
        let config = self.config.clone().with_workers(workers);
        Self { config, ..self }
    }

    #[must_use]
    pub fn with_task_broker<B: Broker<Task> + 'static>(self, broker: B) -> Self {
        Self {
            task_broker: Some(Arc::new(broker)),
            ..self
        }
    }

    #[must_use]
    pub fn with_result_broker<B: Broker<TaskResult> + 'static>(self, broker: B) -> Self {
        Self {
            result_broker: Some(Arc::new(broker)),
            ..self
        }
    }

    /// Uses `handlers` as the handler registry.
    ///
    /// The store is shared; handlers put into it directly are visible to
    /// the orchestrator and its workers.
    #[must_use]
    pub fn with_handler_store(self, handlers: Arc<HandlerStore>) -> Self {
        Self {
            handlers: Some(handlers),
            ..self
        }
    }

    /// Uses `results` as the results store.
    #[must_use]
    pub fn with_results_store(self, results: Arc<ResultStore>) -> Self {
        Self {
            results: Some(results),
            ..self
        }
    }

    #[must_use]
    pub fn build(self) -> Orchestrator {
        let task_broker: Arc<dyn Broker<Task>> = match self.task_broker {
            Some(broker) => broker,
            None => Arc::new(ChannelBroker::<Task>::new(self.config.task_buffer)),
        };
        let result_broker: Arc<dyn Broker<TaskResult>> = match self.result_broker {
            Some(broker) => broker,
            None => Arc::new(ChannelBroker::<TaskResult>::new(self.config.result_buffer)),
        };
        let handlers: Arc<HandlerStore> = match self.handlers {
            Some(handlers) => handlers,
            None => Arc::new(MemoryStore::<String, SharedHandler>::new()),
        };
        let results: Arc<ResultStore> = match self.results {
            Some(results) => results,
            None => Arc::new(MemoryStore::<TaskId, TaskResult>::new()),
        };
        let pool = (self.config.workers > 0).then(|| WorkerPool::new(self.config.workers));

        Orchestrator {
            config: self.config,
            pool,
            task_broker,
            result_broker,
            handlers,
            results,
            cancel: CancellationToken::new(),
            drain: None,
        }
    }
}

impl std::fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("task_broker", &self.task_broker.is_some())
            .field("result_broker", &self.result_broker.is_some())
            .finish_non_exhaustive()
    }
}
