use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::DomainEvent;
use crate::error::TransportError;

// ============================================================================
// Queue Transport
// ============================================================================
//
// The seam between the pipeline and a durable queue. Two implementations:
// InMemoryTransport (tests, --in-memory) and RedpandaTransport.
//
// Delivery contract: a message handed out by `next` stays owned by the
// subscription until it is acked (removed for good) or requeued (handed
// out again later, flagged `redelivered`). Closing a subscription returns
// every unacked message to the queue.
//
// ============================================================================

/// Wire form of a domain event sitting on a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub message_id: Uuid,
    /// Business identifier; messages with the same key keep their order
    pub key: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn from_event(event: &DomainEvent) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_id: Uuid::now_v7(),
            key: event.key().to_string(),
            event_type: event.event_type().to_string(),
            payload: event.to_bytes()?,
            enqueued_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueuedMessage,
    /// Transport-assigned handle used to ack or requeue this delivery
    pub delivery_tag: u64,
    pub partition: i32,
    pub redelivered: bool,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Create the queue if it does not exist yet.
    async fn declare(&self, queue: &str) -> Result<(), TransportError>;

    async fn publish(&self, queue: &str, message: QueuedMessage) -> Result<(), TransportError>;

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn Subscription>, TransportError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery. `None` once the subscription is closed.
    async fn next(&mut self) -> Result<Option<Delivery>, TransportError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), TransportError>;

    async fn requeue(&mut self, delivery: &Delivery) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
