/// Sizing for an [`Orchestrator`][crate::Orchestrator].
///
/// Every field has a default, so a partial config (for example, one
/// deserialized from a file that only sets `workers`) is fine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// The number of in-process workers.
    ///
    /// Zero means tasks are executed elsewhere; the orchestrator then
    /// only submits tasks and collects results.
    pub workers: usize,
    /// How many tasks the default in-process task broker buffers before
    /// `push` starts waiting.
    pub task_buffer: usize,
    /// How many results the default in-process result broker buffers.
    pub result_buffer: usize,
}

impl Config {
    #[must_use]
    pub fn with_workers(self, workers: usize) -> Self { Self { workers, ..self } }

    #[must_use]
    pub fn with_task_buffer(self, task_buffer: usize) -> Self {
        Self {
            task_buffer,
            ..self
        }
    }

    #[must_use]
    pub fn with_result_buffer(self, result_buffer: usize) -> Self {
        Self {
            result_buffer,
            ..self
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 5,
            task_buffer: 10,
            result_buffer: 1,
        }
    }
}
