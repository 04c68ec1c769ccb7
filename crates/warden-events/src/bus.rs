//! In-process broadcast of journal records.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use warden_core::SubscriptionId;
use warden_journal::SequencedRecord;

/// Default bound on each subscription's queue.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 256;

/// Broadcasts journal records to all live subscriptions and hands each one
/// to the webhook queue.
///
/// Publishing never blocks the producer: slow subscribers lag and are
/// closed, and a full webhook queue drops deliveries with a warning.
#[derive(Debug)]
pub struct FanoutBus {
    sender: broadcast::Sender<Arc<SequencedRecord>>,
    webhook_tx: Option<mpsc::Sender<Arc<SequencedRecord>>>,
    capacity: usize,
}

impl FanoutBus {
    /// Create a bus with the default per-subscription capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIPTION_CAPACITY)
    }

    /// Create a bus with an explicit per-subscription capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            webhook_tx: None,
            capacity,
        }
    }

    /// Attach the webhook delivery queue.
    #[must_use]
    pub fn with_webhook_queue(mut self, tx: mpsc::Sender<Arc<SequencedRecord>>) -> Self {
        self.webhook_tx = Some(tx);
        self
    }

    /// Publish a record to every live subscription and the webhook queue.
    ///
    /// Returns the number of live subscriptions that received it.
    pub fn publish(&self, record: SequencedRecord) -> usize {
        let record = Arc::new(record);
        trace!(cursor = record.cursor, kind = record.record.kind(), "publishing record");

        if let Some(tx) = &self.webhook_tx {
            if let Err(e) = tx.try_send(Arc::clone(&record)) {
                warn!(error = %e, "webhook queue full, delivery dropped");
            }
        }

        self.sender.send(record).unwrap_or(0)
    }

    /// Open a new subscription.
    #[must_use]
    pub fn subscribe(&self) -> (SubscriptionId, EventStream) {
        let id = SubscriptionId::new();
        debug!(subscription = %id, "subscription opened");
        (
            id,
            EventStream {
                id,
                receiver: self.sender.subscribe(),
            },
        )
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Per-subscription queue bound.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscription's ordered stream of records.
pub struct EventStream {
    id: SubscriptionId,
    receiver: broadcast::Receiver<Arc<SequencedRecord>>,
}

impl EventStream {
    /// This subscription's id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next record.
    ///
    /// Returns `None` when the subscription is over: either the bus is gone
    /// or this subscriber overflowed its queue. An overflowed subscriber
    /// must reconnect and resync via the journal's `tail` cursor, because
    /// records were dropped.
    pub async fn recv(&mut self) -> Option<Arc<SequencedRecord>> {
        match self.receiver.recv().await {
            Ok(record) => Some(record),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(subscription = %self.id, skipped, "subscription overflowed, closing");
                None
            },
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{ActionEvent, AgentId, EventId, Timestamp, Verdict};
    use warden_journal::JournalRecord;

    fn record(cursor: u64) -> SequencedRecord {
        SequencedRecord {
            cursor,
            record: JournalRecord::Event {
                event: ActionEvent {
                    id: EventId::new(format!("evt_{cursor}")),
                    ts: Timestamp::from_millis(i64::try_from(cursor).unwrap()).unwrap(),
                    agent: AgentId::new("a"),
                    intent: "llm.chat".to_string(),
                    target: None,
                    metadata: None,
                    token: None,
                    cost_usd: None,
                },
                status: Verdict::Allow,
                policy: None,
            },
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = FanoutBus::new();
        let (_, mut one) = bus.subscribe();
        let (_, mut two) = bus.subscribe();

        assert_eq!(bus.publish(record(1)), 2);
        assert_eq!(one.recv().await.unwrap().cursor, 1);
        assert_eq!(two.recv().await.unwrap().cursor, 1);
    }

    #[tokio::test]
    async fn test_records_delivered_in_order() {
        let bus = FanoutBus::new();
        let (_, mut stream) = bus.subscribe();

        for cursor in 1..=5 {
            bus.publish(record(cursor));
        }
        for expected in 1..=5 {
            assert_eq!(stream.recv().await.unwrap().cursor, expected);
        }
    }

    #[tokio::test]
    async fn test_no_subscribers_is_fine() {
        let bus = FanoutBus::new();
        assert_eq!(bus.publish(record(1)), 0);
    }

    #[tokio::test]
    async fn test_overflow_closes_subscription() {
        let bus = FanoutBus::with_capacity(4);
        let (_, mut stream) = bus.subscribe();

        // Flood well past the queue bound without draining.
        for cursor in 1..=32 {
            bus.publish(record(cursor));
        }

        // The lagged subscription closes instead of silently skipping.
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_webhook_queue_receives_publishes() {
        let (tx, mut rx) = mpsc::channel(8);
        let bus = FanoutBus::new().with_webhook_queue(tx);

        bus.publish(record(1));
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.cursor, 1);
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let bus = FanoutBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let (_, stream) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(stream);
    }
}
