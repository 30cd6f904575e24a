use crate::broker::{BrokerError, Dequeuer, Inbox, Submitter};
use crate::codec;
use bb8_redis::RedisConnectionManager;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
/// How much longer than the pop's own timeout we wait for its reply.
const REPLY_GRACE: Duration = Duration::from_secs(1);

/// Where a broker's background poller is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PollState {
    /// Nothing has dequeued from the broker yet.
    NotStarted,
    Polling,
    /// The poller observed cancellation and exited.  Terminal.
    Stopped,
}

/// A broker backed by a redis list.
///
/// See the [module-level documentation](crate::redis) for how items
/// move through redis.
pub struct RedisBroker<T> {
    client: redis::Client,
    pool: bb8::Pool<RedisConnectionManager>,
    key: Arc<str>,
    poll_timeout: Duration,
    state: Arc<Mutex<PollState>>,
    /// Taken by the poller when it starts.
    tx: Mutex<Option<mpsc::Sender<T>>>,
    inbox: Inbox<T>,
}

impl<T> RedisBroker<T> {
    /// Creates a new redis broker over the list at `key`.
    ///
    /// The pool is used to submit; the client is used to open the
    /// poller's dedicated connection, once something dequeues.
    /// Neither connects to the server yet.
    #[must_use = "a broker does nothing unless used"]
    pub fn new<K: Into<String>>(
        client: redis::Client,
        pool: bb8::Pool<RedisConnectionManager>,
        key: K,
    ) -> Self {
        // The poller republishes one item at a time; any more and items
        // would sit popped in our memory instead of in redis.
        let (tx, rx) = mpsc::channel(1);

        Self {
            client,
            pool,
            key: Arc::from(key.into()),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            state: Arc::new(Mutex::new(PollState::NotStarted)),
            tx: Mutex::new(Some(tx)),
            inbox: Inbox::new(rx),
        }
    }

    /// Opens a client and a connection pool against `url`, and
    /// creates a broker over the list at `key` from them.
    pub async fn connect<K: Into<String>>(url: &str, key: K) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url).map_err(|source| BrokerError::Open { source })?;
        let manager =
            RedisConnectionManager::new(url).map_err(|source| BrokerError::Open { source })?;
        let pool = bb8::Pool::builder()
            .build(manager)
            .await
            .map_err(|source| BrokerError::Open { source })?;

        Ok(Self::new(client, pool, key))
    }

    /// Sets how long each `BRPOP` waits before trying again.
    #[must_use]
    pub fn with_poll_timeout(self, poll_timeout: Duration) -> Self {
        Self {
            poll_timeout,
            ..self
        }
    }

    pub fn key(&self) -> &str { &self.key }

    pub fn poll_state(&self) -> PollState { *self.state.lock() }
}

#[async_trait::async_trait]
impl<T> Submitter<T> for RedisBroker<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
{
    /// Serializes and pushes the item.
    ///
    /// This does not watch `cancel`; a push is a single round trip,
    /// and a result pushed while shutting down is better kept.
    async fn submit(&self, _cancel: &CancellationToken, item: T) -> Result<(), BrokerError> {
        let serialized = codec::encode(&item)?;
        let mut connection = self
            .pool
            .get()
            .await
            .map_err(|source| BrokerError::Connection { source })?;

        let _: i64 = redis::cmd("LPUSH")
            .arg(&*self.key)
            .arg(serialized)
            .query_async(&mut *connection)
            .await
            .map_err(|source| BrokerError::Push {
                key: Arc::clone(&self.key),
                source,
            })?;

        Ok(())
    }
}

impl<T> Dequeuer<T> for RedisBroker<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
{
    fn dequeue(&self, cancel: &CancellationToken) -> Inbox<T> {
        let mut state = self.state.lock();

        if *state == PollState::NotStarted {
            if let Some(tx) = self.tx.lock().take() {
                *state = PollState::Polling;
                let poller = Poller {
                    client: self.client.clone(),
                    key: Arc::clone(&self.key),
                    poll_timeout: self.poll_timeout,
                    tx,
                    inbox: self.inbox.clone(),
                    state: Arc::clone(&self.state),
                };
                tokio::spawn(poller.run(cancel.clone()));
            }
        }

        self.inbox.clone()
    }
}

impl<T> std::fmt::Debug for RedisBroker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("key", &self.key)
            .field("poll_timeout", &self.poll_timeout)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

/// The background half of a [`RedisBroker`].
struct Poller<T> {
    client: redis::Client,
    key: Arc<str>,
    poll_timeout: Duration,
    tx: mpsc::Sender<T>,
    /// Our own handle on the consumers' inbox, for returning whatever is
    /// left in it once we stop.
    inbox: Inbox<T>,
    state: Arc<Mutex<PollState>>,
}

impl<T> Poller<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned + Send,
{
    #[tracing::instrument(skip_all, name = "queue.poll", fields(queue = %self.key))]
    async fn run(self, cancel: CancellationToken) {
        tracing::info!("started polling");
        let mut connection: Option<redis::aio::MultiplexedConnection> = None;
        // Popped from redis, but never handed to a consumer.
        let mut unclaimed: Option<Vec<u8>> = None;

        while !cancel.is_cancelled() {
            if connection.is_none() {
                let connected = tokio::select! {
                    () = cancel.cancelled() => break,
                    connected = self.client.get_multiplexed_async_connection() => connected,
                };

                match connected {
                    Ok(conn) => connection = Some(conn),
                    Err(error) => {
                        tracing::warn!(%error, "failed to connect to redis");
                        if wait_out(&cancel, self.poll_timeout).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let Some(conn) = connection.as_mut() else {
                continue;
            };

            // The pop is never raced against cancellation.  Once sent, it
            // runs to completion, so whatever it takes is accounted for.
            let popped = tokio::time::timeout(
                self.poll_timeout + REPLY_GRACE,
                brpop(conn, &self.key, self.poll_timeout),
            )
            .await;

            let data = match popped {
                Ok(Ok(Some(data))) => data,
                Ok(Ok(None)) => continue,
                Ok(Err(error)) if error.is_timeout() => continue,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "failed to pop from redis");
                    connection = None;
                    if wait_out(&cancel, self.poll_timeout).await {
                        break;
                    }
                    continue;
                }
                Err(_elapsed) => {
                    tracing::warn!("redis did not answer a pop in time");
                    connection = None;
                    continue;
                }
            };

            let item = match codec::decode::<T>(&data) {
                Ok(item) => item,
                Err(error) => {
                    tracing::warn!(%error, bytes = data.len(), "dropping malformed item");
                    continue;
                }
            };

            // Reserve first, so that a cancelled hand-off leaves the item
            // with us instead of inside a dropped send.
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = self.tx.reserve() => permit.ok(),
            };

            match permit {
                Some(permit) => permit.send(item),
                None => {
                    unclaimed = Some(data);
                    break;
                }
            }
        }

        let mut pending = self
            .inbox
            .drain(self.poll_timeout)
            .await
            .iter()
            .filter_map(|item| match codec::encode(item) {
                Ok(data) => Some(data),
                Err(error) => {
                    tracing::error!(%error, "failed to re-encode a buffered item; it is lost");
                    None
                }
            })
            .collect::<Vec<_>>();
        pending.extend(unclaimed);

        if !pending.is_empty() {
            requeue(&self.client, connection, &self.key, &pending).await;
        }

        *self.state.lock() = PollState::Stopped;
        tracing::info!("stopped polling");
    }
}

/// Pushes `items` back onto the pop end of the list.
///
/// `items` are in the order they were originally popped, and will be
/// popped again in that same order, ahead of anything else on the list.
async fn requeue(
    client: &redis::Client,
    connection: Option<redis::aio::MultiplexedConnection>,
    key: &str,
    items: &[Vec<u8>],
) {
    let count = items.len();
    let mut connection = match connection {
        Some(connection) => connection,
        None => match client.get_multiplexed_async_connection().await {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!(
                    %error,
                    count,
                    "failed to connect to return unclaimed items; they are lost"
                );
                return;
            }
        },
    };

    // RPUSH leaves its last argument at the very end of the list.
    let mut command = redis::cmd("RPUSH");
    command.arg(key);
    for item in items.iter().rev() {
        command.arg(item.as_slice());
    }

    let pushed: redis::RedisResult<i64> = command.query_async(&mut connection).await;
    match pushed {
        Ok(_) => tracing::info!(count, "returned unclaimed items to the queue"),
        Err(error) => {
            tracing::error!(%error, count, "failed to return unclaimed items; they are lost");
        }
    }
}

/// Blocks on the right end of the list for up to `timeout`.
///
/// A `None` means the pop timed out with nothing to show for it.
async fn brpop(
    connection: &mut redis::aio::MultiplexedConnection,
    key: &str,
    timeout: Duration,
) -> redis::RedisResult<Option<Vec<u8>>> {
    let reply: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
        .arg(key)
        .arg(timeout.as_secs_f64())
        .query_async(connection)
        .await?;

    Ok(reply.map(|(_, data)| data))
}

/// Sleeps for `duration`, returning early (with `true`) if cancelled.
async fn wait_out(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        () = cancel.cancelled() => true,
        () = tokio::time::sleep(duration) => false,
    }
}
