//! Per-table change feeds.
//!
//! Writers hold the feed's gate across the store write and the publish, so the sequence of
//! events seen by any subscriber matches commit order. Nothing orders one feed against another.

use tokio::{
    sync::{Mutex, MutexGuard, broadcast},
    task::JoinHandle,
};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Row inserted.
    Created,
    /// Row replaced.
    Updated,
    /// Row removed.
    Deleted,
}

/// A committed change and the record snapshot after it.
#[derive(Debug, Clone)]
pub struct Change<T> {
    /// What happened.
    pub kind: ChangeKind,
    /// Record after the change; the last snapshot for deletions.
    pub record: T,
    /// Position of the change in its feed, starting at 1.
    pub sequence: u64,
}

/// What a subscriber callback receives.
#[derive(Debug, Clone)]
pub enum Delivery<T> {
    /// A change passed the filter.
    Change(Change<T>),
    /// The subscriber fell behind and `skipped` changes were dropped; reload from the store.
    Gap {
        /// Number of events that were dropped.
        skipped: u64,
    },
}

/// Broadcast feed of changes to one table.
pub struct ChangeFeed<T> {
    tx: broadcast::Sender<Change<T>>,
    gate: Mutex<u64>,
}

/// Exclusive write access to a feed, held while a change is committed.
pub struct FeedWriter<'a, T> {
    sequence: MutexGuard<'a, u64>,
    tx: &'a broadcast::Sender<Change<T>>,
}

impl<T> FeedWriter<'_, T> {
    /// Publish a committed change. Having no subscribers is not an error.
    pub fn publish(&mut self, kind: ChangeKind, record: T) {
        *self.sequence += 1;
        let _ = self.tx.send(Change {
            kind,
            record,
            sequence: *self.sequence,
        });
    }
}

impl<T> ChangeFeed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Feed buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            gate: Mutex::new(0),
        }
    }

    /// Take the write gate. Keep it across the store write and the matching publish.
    pub async fn lock(&self) -> FeedWriter<'_, T> {
        FeedWriter {
            sequence: self.gate.lock().await,
            tx: &self.tx,
        }
    }

    /// Deliver every future change whose record passes `filter` to `on_change`.
    ///
    /// The receiver is registered before this returns, so no change committed after the call
    /// can be missed.
    pub fn subscribe<F, C>(&self, filter: F, mut on_change: C) -> Subscription
    where
        F: Fn(&T) -> bool + Send + 'static,
        C: FnMut(Delivery<T>) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if filter(&change.record) {
                            on_change(Delivery::Change(change));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        on_change(Delivery::Gap { skipped });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Subscription { task }
    }

    /// Receivers currently attached to the feed.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle to a live subscription. Dropping it cancels delivery.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivery. No callback runs after the subscription task observes the abort.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the forwarding task still runs.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{sync::mpsc, time::timeout};

    use super::*;

    fn collecting(
        feed: &ChangeFeed<u32>,
        filter: impl Fn(&u32) -> bool + Send + 'static,
    ) -> (Subscription, mpsc::UnboundedReceiver<Delivery<u32>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = feed.subscribe(filter, move |delivery| {
            let _ = tx.send(delivery);
        });
        (sub, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Delivery<u32>>) -> Option<Delivery<u32>> {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn delivers_in_commit_order_with_filter() {
        let feed = ChangeFeed::new(16);
        let (_sub, mut rx) = collecting(&feed, |value| value % 2 == 0);

        for value in 1..=6 {
            feed.lock().await.publish(ChangeKind::Created, value);
        }

        let mut seen = Vec::new();
        while let Some(Delivery::Change(change)) = next(&mut rx).await {
            seen.push((change.record, change.sequence));
            if seen.len() == 3 {
                break;
            }
        }
        assert_eq!(seen, vec![(2, 2), (4, 4), (6, 6)]);
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_delivery() {
        let feed = ChangeFeed::new(16);
        let (sub, mut rx) = collecting(&feed, |_| true);

        feed.lock().await.publish(ChangeKind::Updated, 1);
        assert!(matches!(next(&mut rx).await, Some(Delivery::Change(_))));

        sub.cancel();
        tokio::task::yield_now().await;
        feed.lock().await.publish(ChangeKind::Updated, 2);
        assert!(next(&mut rx).await.is_none());
        assert!(!sub.is_active());
    }

    #[tokio::test]
    async fn dropping_subscription_releases_receiver() {
        let feed = ChangeFeed::<u32>::new(16);
        let (sub, _rx) = collecting(&feed, |_| true);
        assert_eq!(feed.subscriber_count(), 1);

        drop(sub);
        timeout(Duration::from_secs(1), async {
            while feed.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn lagging_subscriber_is_told_about_the_gap() {
        let feed = ChangeFeed::new(2);
        let (_sub, mut rx) = collecting(&feed, |_| true);

        // The single-threaded test runtime does not poll the subscriber until we yield.
        for value in 0..6 {
            feed.lock().await.publish(ChangeKind::Created, value);
        }

        match next(&mut rx).await {
            Some(Delivery::Gap { skipped }) => assert_eq!(skipped, 4),
            other => panic!("expected a gap, got {other:?}"),
        }
        assert!(matches!(
            next(&mut rx).await,
            Some(Delivery::Change(Change { record: 4, .. }))
        ));
    }
}
