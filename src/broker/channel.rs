use super::{BrokerError, Dequeuer, Inbox, Submitter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An in-process broker backed by a bounded channel.
///
/// Submitting to a full broker waits until a consumer makes room, or
/// until the submission is cancelled.  Items are handed out in FIFO
/// order to whichever consumer asks next.
pub struct ChannelBroker<T> {
    tx: mpsc::Sender<T>,
    inbox: Inbox<T>,
    capacity: usize,
}

impl<T> ChannelBroker<T> {
    /// Creates a broker that buffers up to `capacity` items.
    ///
    /// A capacity of zero is treated as one; there is no rendezvous
    /// channel, so a single item can always be parked in the broker.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            tx,
            inbox: Inbox::new(rx),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize { self.capacity }
}

#[async_trait::async_trait]
impl<T: Send + 'static> Submitter<T> for ChannelBroker<T> {
    async fn submit(&self, cancel: &CancellationToken, item: T) -> Result<(), BrokerError> {
        tokio::select! {
            biased;
            // A cancelled submission enqueues nothing, even if there's room.
            () = cancel.cancelled() => {
                tracing::debug!("submission cancelled; item not enqueued");
            }
            sent = self.tx.send(item) => {
                // We hold the receiving half ourselves, so the channel
                // can't be closed while we're alive.
                debug_assert!(sent.is_ok(), "channel broker receiver dropped");
            }
        }

        Ok(())
    }
}

impl<T: Send + 'static> Dequeuer<T> for ChannelBroker<T> {
    fn dequeue(&self, _cancel: &CancellationToken) -> Inbox<T> { self.inbox.clone() }
}

impl<T> std::fmt::Debug for ChannelBroker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBroker")
            .field("capacity", &self.capacity)
            .field("queued", &(self.capacity - self.tx.capacity()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn places_the_item_on_the_queue() {
        let broker = ChannelBroker::new(1);
        let cancel = CancellationToken::new();

        broker.submit(&cancel, "item").await.expect("submit");

        assert_eq!(broker.dequeue(&cancel).recv().await, Some("item"));
    }

    #[tokio::test]
    async fn zero_capacity_still_buffers_one_item() {
        let broker = ChannelBroker::new(0);
        assert_eq!(broker.capacity(), 1);

        tokio::time::timeout(
            Duration::from_secs(1),
            broker.submit(&CancellationToken::new(), 1),
        )
        .await
        .expect("submit blocked")
        .expect("submit");
    }

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let broker = ChannelBroker::new(4);
        let cancel = CancellationToken::new();

        for i in 0..4 {
            broker.submit(&cancel, i).await.expect("submit");
        }

        let inbox = broker.dequeue(&cancel);
        for i in 0..4 {
            assert_eq!(inbox.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn full_queue_blocks_until_space_frees() {
        let broker = std::sync::Arc::new(ChannelBroker::<i32>::new(1));
        let cancel = CancellationToken::new();

        broker.submit(&cancel, 1).await.expect("submit");

        let blocked = tokio::spawn({
            let broker = std::sync::Arc::clone(&broker);
            let cancel = cancel.clone();
            async move { broker.submit(&cancel, 2).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "submit returned on a full queue");

        let inbox = broker.dequeue(&cancel);
        assert_eq!(inbox.recv().await, Some(1));

        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("submit never unblocked")
            .expect("join")
            .expect("submit");
        assert_eq!(inbox.recv().await, Some(2));
    }

    #[tokio::test]
    async fn exits_without_enqueuing_when_already_cancelled() {
        let broker = ChannelBroker::new(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), broker.submit(&cancel, 1))
            .await
            .expect("submit did not return after cancellation")
            .expect("cancellation is not an error");

        let inbox = broker.dequeue(&cancel);
        let nothing = tokio::time::timeout(Duration::from_millis(50), inbox.recv()).await;
        assert!(nothing.is_err(), "a cancelled submission was enqueued");
    }

    #[tokio::test]
    async fn exits_when_cancelled_while_blocked() {
        let broker = std::sync::Arc::new(ChannelBroker::<i32>::new(1));
        let cancel = CancellationToken::new();
        broker.submit(&cancel, 1).await.expect("submit");

        let blocked = tokio::spawn({
            let broker = std::sync::Arc::clone(&broker);
            let cancel = cancel.clone();
            async move { broker.submit(&cancel, 2).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("submit did not return after cancellation")
            .expect("join")
            .expect("cancellation is not an error");

        let inbox = broker.dequeue(&cancel);
        assert_eq!(inbox.recv().await, Some(1));
        let nothing = tokio::time::timeout(Duration::from_millis(50), inbox.recv()).await;
        assert!(nothing.is_err(), "a cancelled submission was enqueued");
    }
}
