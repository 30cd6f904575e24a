use serde_json::Value;
use std::sync::Arc;

/// The unique identifier of a submitted [`Task`].
///
/// Every task pushed through an [`Orchestrator`][crate::Orchestrator]
/// gets a fresh v4 UUID; the ID is the only thing correlating a
/// [`TaskResult`] back to the task that produced it, including when
/// the task crossed a process boundary through a remote broker.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub(crate) String);

impl TaskId {
    /// Generates a new, never-before-seen task ID.
    #[must_use]
    pub fn generate() -> Self { Self(uuid::Uuid::new_v4().to_string()) }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self { Self(id) }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self { Self(id.to_owned()) }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::ops::Deref for TaskId {
    type Target = str;

    fn deref(&self) -> &Self::Target { &self.0 }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

/// A unit of submitted work.
///
/// Tasks are immutable once created.  The payload is an arbitrary
/// JSON value, so that it survives the trip through a remote broker
/// without the producer and the worker sharing a Rust type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub payload: Value,
}

impl Task {
    /// Creates a task with a freshly generated ID.
    #[must_use]
    pub fn new<S: Into<String>>(task_type: S, payload: Value) -> Self {
        Self::with_id(TaskId::generate(), task_type, payload)
    }

    /// Creates a task with a caller-provided ID.
    ///
    /// This is mostly useful for producers that feed a remote broker
    /// directly, without going through an orchestrator.
    #[must_use]
    pub fn with_id<S: Into<String>>(id: TaskId, task_type: S, payload: Value) -> Self {
        Self {
            id,
            task_type: task_type.into(),
            payload,
        }
    }
}

/// The outcome of running a task's handler.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub struct TaskResult {
    pub task_id: TaskId,
    pub payload: Value,
    /// The rendered handler failure, if the handler failed.
    pub error: Option<String>,
}

impl TaskResult {
    #[must_use]
    pub fn success(task_id: TaskId, payload: Value) -> Self {
        Self {
            task_id,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn failure<E: Into<String>>(task_id: TaskId, error: E) -> Self {
        Self {
            task_id,
            payload: Value::Null,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool { self.error.is_none() }
}

/// A registered task handler.
///
/// Handlers map a payload to an output value, and hold no mutable
/// state of their own.  Any `Fn(Value) -> anyhow::Result<Value>`
/// closure is a handler.  Handlers are run on the blocking thread
/// pool, one task at a time per worker.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, payload: Value) -> anyhow::Result<Value>;
}

impl<F> Handler for F
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn handle(&self, payload: Value) -> anyhow::Result<Value> { self(payload) }
}

/// A handler as it is stored in a handler registry.
pub type SharedHandler = Arc<dyn Handler>;

/// Wraps a handler for storage in a registry.
pub fn shared<H: Handler>(handler: H) -> SharedHandler { Arc::new(handler) }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_unique() {
        let ids = (0..1000)
            .map(|_| TaskId::generate())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn task_type_serializes_as_type() {
        let task = Task::with_id("abc".into(), "double", json!(21));
        let value = serde_json::to_value(&task).expect("to_value");
        assert_eq!(value, json!({ "id": "abc", "type": "double", "payload": 21 }));
    }

    #[test]
    fn closures_are_handlers() {
        let handler = shared(|payload: Value| Ok(json!(payload.as_i64().unwrap_or(0) * 2)));
        assert_eq!(handler.handle(json!(21)).expect("handle"), json!(42));
    }

    #[test]
    fn failure_carries_no_payload() {
        let result = TaskResult::failure("abc".into(), "boom");
        assert!(!result.is_success());
        assert_eq!(result.payload, Value::Null);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
