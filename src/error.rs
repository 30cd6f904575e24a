use crate::broker::BrokerError;

/// Errors returned synchronously to callers of the
/// [`Orchestrator`][crate::Orchestrator].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no handler defined for taskType: {task_type}")]
    NoHandler { task_type: String },
    #[error("failed to submit the task")]
    Submit {
        #[from]
        source: BrokerError,
    },
}
