//! # **Flow** **Q**ueue.
//!
//! An embeddable task queue for Rust.  A task queue can be described
//! by the following parts:
//!
//! 1. A registry of handlers, each keyed by the task type it handles;
//! 2. A broker, which carries submitted tasks to whoever executes
//!    them, and carries their results back;
//! 3. A pool of workers, each pulling tasks off the broker, running
//!    the matching handler, and submitting the result;
//! 4. A results store, in which results wait until someone asks for
//!    them.
//!
//! The [`Orchestrator`] ties all of these together.  Tasks are
//! submitted with [`Orchestrator::push`], which hands back a
//! [`TaskId`], and their results are looked up, without blocking,
//! with [`Orchestrator::get_result`].
//!
//! ## Usage
//!
//! By default, everything lives in-process: the brokers are bounded
//! channels ([`ChannelBroker`]), and the stores are in-memory maps
//! ([`MemoryStore`]).  This is the **local** mode.
//!
//! The brokers are pluggable, though, and with the `redis` feature
//! enabled, a Redis list can stand in for either of them (see
//! [`redis`]).  That allows the **distributed** mode, where one
//! process submits tasks and collects results without running any
//! workers of its own (a [`Config::workers`] of zero), and other
//! processes run [`WorkerPool`]s against the same Redis keys.
//!
//! Anything crossing a process boundary is encoded as JSON; see
//! [`codec`].

pub mod broker;
pub mod codec;
mod config;
mod error;
mod orchestrator;
#[cfg(feature = "redis")]
pub mod redis;
mod store;
mod task;
mod worker;

pub use self::broker::{Broker, BrokerError, ChannelBroker, Dequeuer, Inbox, Submitter};
pub use self::config::Config;
pub use self::error::Error;
pub use self::orchestrator::{HandlerStore, Orchestrator, OrchestratorBuilder, ResultStore};
pub use self::store::{KvStore, MemoryStore};
pub use self::task::{shared, Handler, SharedHandler, Task, TaskId, TaskResult};
pub use self::worker::{Worker, WorkerPool};
