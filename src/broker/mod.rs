//! # Brokers
//!
//! A broker is the queue between whoever submits items and whoever
//! consumes them.  It is generic over the item, so the same broker
//! implementations carry [`Task`][crate::Task]s to workers and
//! [`TaskResult`][crate::TaskResult]s back to the orchestrator.
//!
//! There are two halves to a broker, which are separate traits so
//! that a component can be handed only the half it needs: the
//! [`Submitter`], which enqueues a single item, and the [`Dequeuer`],
//! which hands out an [`Inbox`] to receive items from.  Anything that
//! implements both is a [`Broker`].
//!
//! Every item is delivered to exactly one receiver, no matter how
//! many clones of an inbox are being read from concurrently.

mod channel;

pub use self::channel::ChannelBroker;

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BrokerError {
    #[error("failed to serialize the item: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize the item: {source}")]
    Deserialization {
        #[source]
        source: serde_json::Error,
    },
    #[cfg(feature = "redis")]
    #[error("failed to open the redis client: {source}")]
    Open {
        #[source]
        source: redis::RedisError,
    },
    #[cfg(feature = "redis")]
    #[error("failed to connect to redis: {source}")]
    Connection {
        #[source]
        source: bb8::RunError<redis::RedisError>,
    },
    #[cfg(feature = "redis")]
    #[error("failed to push item onto {key}: {source}")]
    Push {
        key: Arc<str>,
        #[source]
        source: redis::RedisError,
    },
}

/// The submitting half of a broker.
#[async_trait::async_trait]
pub trait Submitter<T: Send + 'static>: Send + Sync {
    /// Enqueues a single item.
    ///
    /// Cancellation of `cancel` while waiting to enqueue is not an
    /// error: the item is simply not enqueued, and `Ok(())` is
    /// returned.  Any other failure to enqueue is returned to the
    /// caller.
    async fn submit(&self, cancel: &CancellationToken, item: T) -> Result<(), BrokerError>;
}

/// The consuming half of a broker.
pub trait Dequeuer<T: Send + 'static>: Send + Sync {
    /// Returns the inbox that items from this broker arrive on.
    ///
    /// Every call returns a handle to the same underlying inbox, so
    /// that all consumers share it.  Implementations that need
    /// background work to fill the inbox tie that work to `cancel`.
    fn dequeue(&self, cancel: &CancellationToken) -> Inbox<T>;
}

/// A full broker; both [`Submitter`] and [`Dequeuer`].
pub trait Broker<T: Send + 'static>: Submitter<T> + Dequeuer<T> {}

impl<T: Send + 'static, B: Submitter<T> + Dequeuer<T> + ?Sized> Broker<T> for B {}

#[async_trait::async_trait]
impl<T: Send + 'static, S: Submitter<T> + ?Sized> Submitter<T> for Arc<S> {
    async fn submit(&self, cancel: &CancellationToken, item: T) -> Result<(), BrokerError> {
        (**self).submit(cancel, item).await
    }
}

impl<T: Send + 'static, D: Dequeuer<T> + ?Sized> Dequeuer<T> for Arc<D> {
    fn dequeue(&self, cancel: &CancellationToken) -> Inbox<T> { (**self).dequeue(cancel) }
}

/// A shared, receive-only handle onto a broker's queue.
///
/// Cloning an inbox does not duplicate items; every clone competes
/// for the same items, and each item is received by exactly one of
/// them.
pub struct Inbox<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Inbox<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue has been closed and drained.
    /// This is cancel safe: dropping the future before it completes
    /// never loses an item.
    pub async fn recv(&self) -> Option<T> { self.rx.lock().await.recv().await }

    /// Takes the next item if one is already buffered, without waiting.
    ///
    /// Returns `None` if the queue is empty, or if another receiver is
    /// in the middle of waiting on it.
    pub fn try_recv(&self) -> Option<T> { self.rx.try_lock().ok()?.try_recv().ok() }

    /// Empties the queue of everything buffered in it.
    ///
    /// Waits up to `patience` for other receivers to let go of the
    /// queue first; if they don't, nothing is taken.
    #[cfg(feature = "redis")]
    pub(crate) async fn drain(&self, patience: std::time::Duration) -> Vec<T> {
        let Ok(mut rx) = tokio::time::timeout(patience, self.rx.lock()).await else {
            return Vec::new();
        };

        let mut drained = Vec::new();
        while let Ok(item) = rx.try_recv() {
            drained.push(item);
        }
        drained
    }
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> std::fmt::Debug for Inbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox").finish_non_exhaustive()
    }
}
