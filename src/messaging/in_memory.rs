use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::TransportError;

use super::transport::{Delivery, QueueTransport, QueuedMessage, Subscription};

// ============================================================================
// In-Memory Queue Transport
// ============================================================================
//
// A broker that lives inside the process. Cloning shares the same queues, so
// a test can hold one handle for the publisher, one for the consumer and one
// for assertions. `set_reachable(false)` makes declare, publish and
// subscribe fail with Unreachable. `fail_next_acks(n)` makes the next n
// acks fail and leaves those deliveries unacked.
//
// ============================================================================

#[derive(Default)]
struct QueueState {
    ready: VecDeque<(QueuedMessage, bool)>,
    unacked: HashMap<u64, QueuedMessage>,
}

struct Broker {
    queues: Mutex<HashMap<String, QueueState>>,
    reachable: AtomicBool,
    next_tag: AtomicU64,
    failing_acks: AtomicU32,
    arrivals: Notify,
}

#[derive(Clone)]
pub struct InMemoryTransport {
    broker: Arc<Broker>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self {
            broker: Arc::new(Broker {
                queues: Mutex::new(HashMap::new()),
                reachable: AtomicBool::new(true),
                next_tag: AtomicU64::new(1),
                failing_acks: AtomicU32::new(0),
                arrivals: Notify::new(),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.broker.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn fail_next_acks(&self, count: u32) {
        self.broker.failing_acks.store(count, Ordering::SeqCst);
    }

    /// Messages waiting to be delivered
    pub fn depth(&self, queue: &str) -> usize {
        self.queues().get(queue).map_or(0, |q| q.ready.len())
    }

    /// Messages delivered but neither acked nor requeued
    pub fn in_flight(&self, queue: &str) -> usize {
        self.queues().get(queue).map_or(0, |q| q.unacked.len())
    }

    /// Snapshot of the waiting messages, front first
    pub fn messages(&self, queue: &str) -> Vec<QueuedMessage> {
        self.queues()
            .get(queue)
            .map(|q| q.ready.iter().map(|(m, _)| m.clone()).collect())
            .unwrap_or_default()
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.broker.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_reachable(&self) -> Result<(), TransportError> {
        if self.broker.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Unreachable("in-memory broker is offline".to_string()))
        }
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn declare(&self, queue: &str) -> Result<(), TransportError> {
        self.ensure_reachable()?;
        self.queues().entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, message: QueuedMessage) -> Result<(), TransportError> {
        self.ensure_reachable()?;
        {
            let mut queues = self.queues();
            let state = queues
                .get_mut(queue)
                .ok_or_else(|| TransportError::QueueNotDeclared(queue.to_string()))?;
            state.ready.push_back((message, false));
        }
        self.broker.arrivals.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn Subscription>, TransportError> {
        self.declare(queue).await?;
        Ok(Box::new(InMemorySubscription {
            transport: self.clone(),
            queue: queue.to_string(),
            outstanding: Vec::new(),
            closed: false,
        }))
    }
}

pub struct InMemorySubscription {
    transport: InMemoryTransport,
    queue: String,
    outstanding: Vec<u64>,
    closed: bool,
}

impl InMemorySubscription {
    fn try_take(&mut self) -> Option<Delivery> {
        let mut queues = self.transport.queues();
        let state = queues.get_mut(&self.queue)?;
        let (message, redelivered) = state.ready.pop_front()?;

        let delivery_tag = self.transport.broker.next_tag.fetch_add(1, Ordering::SeqCst);
        state.unacked.insert(delivery_tag, message.clone());
        self.outstanding.push(delivery_tag);

        Some(Delivery {
            message,
            delivery_tag,
            partition: 0,
            redelivered,
        })
    }

    fn settle(&mut self, delivery_tag: u64) -> Result<QueuedMessage, TransportError> {
        self.outstanding.retain(|tag| *tag != delivery_tag);
        self.transport
            .queues()
            .get_mut(&self.queue)
            .and_then(|state| state.unacked.remove(&delivery_tag))
            .ok_or(TransportError::UnknownDelivery(delivery_tag))
    }

    fn return_to_front(&self, message: QueuedMessage) {
        if let Some(state) = self.transport.queues().get_mut(&self.queue) {
            state.ready.push_front((message, true));
        }
        self.transport.broker.arrivals.notify_waiters();
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, TransportError> {
        loop {
            if self.closed {
                return Ok(None);
            }

            // Register interest before looking, so a publish in between
            // still wakes us.
            let broker = self.transport.broker.clone();
            let arrival = broker.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            if let Some(delivery) = self.try_take() {
                return Ok(Some(delivery));
            }

            arrival.await;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let injected = self
            .transport
            .broker
            .failing_acks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::Broker("injected ack failure".to_string()));
        }
        self.settle(delivery.delivery_tag).map(|_| ())
    }

    async fn requeue(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let message = self.settle(delivery.delivery_tag)?;
        self.return_to_front(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        // Newest first, so the oldest unacked message ends up at the front.
        for delivery_tag in std::mem::take(&mut self.outstanding).into_iter().rev() {
            let message = self
                .transport
                .queues()
                .get_mut(&self.queue)
                .and_then(|state| state.unacked.remove(&delivery_tag));
            if let Some(message) = message {
                self.return_to_front(message);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use uuid::Uuid;

    fn message(key: &str) -> QueuedMessage {
        QueuedMessage {
            message_id: Uuid::new_v4(),
            key: key.to_string(),
            event_type: "OrderPlaced".to_string(),
            payload: b"{}".to_vec(),
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_requires_declared_queue() {
        let transport = InMemoryTransport::new();

        let err = transport.publish("orders", message("a")).await.unwrap_err();

        assert!(matches!(err, TransportError::QueueNotDeclared(_)));
    }

    #[tokio::test]
    async fn test_unreachable_broker_rejects_publish() {
        let transport = InMemoryTransport::new();
        transport.declare("orders").await.unwrap();
        transport.set_reachable(false);

        let err = transport.publish("orders", message("a")).await.unwrap_err();

        assert!(matches!(err, TransportError::Unreachable(_)));
        transport.set_reachable(true);
        assert_eq!(transport.depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_deliveries_in_publish_order() {
        let transport = InMemoryTransport::new();
        transport.declare("orders").await.unwrap();
        for key in ["a", "b", "c"] {
            transport.publish("orders", message(key)).await.unwrap();
        }

        let mut subscription = transport.subscribe("orders").await.unwrap();
        let mut keys = Vec::new();
        for _ in 0..3 {
            let delivery = subscription.next().await.unwrap().unwrap();
            subscription.ack(&delivery).await.unwrap();
            keys.push(delivery.message.key);
        }

        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(transport.depth("orders"), 0);
        assert_eq!(transport.in_flight("orders"), 0);
    }

    #[tokio::test]
    async fn test_requeue_redelivers_first() {
        let transport = InMemoryTransport::new();
        transport.declare("orders").await.unwrap();
        transport.publish("orders", message("a")).await.unwrap();
        transport.publish("orders", message("b")).await.unwrap();

        let mut subscription = transport.subscribe("orders").await.unwrap();
        let first = subscription.next().await.unwrap().unwrap();
        subscription.requeue(&first).await.unwrap();

        let again = subscription.next().await.unwrap().unwrap();
        assert_eq!(again.message.key, "a");
        assert!(again.redelivered);
        assert_ne!(again.delivery_tag, first.delivery_tag);

        let err = subscription.ack(&first).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownDelivery(_)));
    }

    #[tokio::test]
    async fn test_close_returns_unacked_messages() {
        let transport = InMemoryTransport::new();
        transport.declare("orders").await.unwrap();
        transport.publish("orders", message("a")).await.unwrap();
        transport.publish("orders", message("b")).await.unwrap();

        let mut subscription = transport.subscribe("orders").await.unwrap();
        subscription.next().await.unwrap().unwrap();
        subscription.next().await.unwrap().unwrap();
        subscription.close().await.unwrap();

        assert!(subscription.next().await.unwrap().is_none());
        let keys: Vec<_> = transport.messages("orders").into_iter().map(|m| m.key).collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[tokio::test]
    async fn test_next_wakes_on_publish() {
        let transport = InMemoryTransport::new();
        let mut subscription = transport.subscribe("orders").await.unwrap();

        let publisher = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("orders", message("late")).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.message.key, "late");
    }

    #[tokio::test]
    async fn test_failed_ack_leaves_delivery_unacked() {
        let transport = InMemoryTransport::new();
        transport.declare("orders").await.unwrap();
        transport.publish("orders", message("a")).await.unwrap();
        transport.fail_next_acks(1);

        let mut subscription = transport.subscribe("orders").await.unwrap();
        let delivery = subscription.next().await.unwrap().unwrap();

        assert!(matches!(subscription.ack(&delivery).await, Err(TransportError::Broker(_))));
        assert_eq!(transport.in_flight("orders"), 1);

        subscription.ack(&delivery).await.unwrap();
        assert_eq!(transport.in_flight("orders"), 0);
    }
}
