use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::DomainEvent;
use crate::error::TransportError;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

use super::transport::{QueueTransport, QueuedMessage};

/// Hands a committed domain event to the durable queue.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<(), TransportError>;
}

// ============================================================================
// Broker Publisher
// ============================================================================
//
// Declares the queue on first use, then appends one QueuedMessage per event.
// Every broker call goes through a circuit breaker so a dead broker fails
// fast instead of stalling each command for the full send timeout.
//
// ============================================================================

pub struct BrokerPublisher {
    transport: Arc<dyn QueueTransport>,
    queue: String,
    declared: AtomicBool,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl BrokerPublisher {
    pub fn new(transport: Arc<dyn QueueTransport>, queue: impl Into<String>) -> Self {
        Self {
            transport,
            queue: queue.into(),
            declared: AtomicBool::new(false),
            circuit_breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            metrics: None,
        }
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = CircuitBreaker::new(config);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn send(&self, message: QueuedMessage) -> Result<(), TransportError> {
        if !self.declared.load(Ordering::Acquire) {
            self.transport.declare(&self.queue).await?;
            self.declared.store(true, Ordering::Release);
        }
        self.transport.publish(&self.queue, message).await
    }
}

#[async_trait]
impl EventPublisher for BrokerPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), TransportError> {
        let message = QueuedMessage::from_event(event)?;
        let message_id = message.message_id;

        let result = match self.circuit_breaker.call(self.send(message)).await {
            Ok(()) => Ok(()),
            Err(CircuitBreakerError::CircuitOpen) => Err(TransportError::CircuitOpen),
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_broker_publish(event.event_type(), result.is_ok(), self.circuit_state());
        }

        match &result {
            Ok(()) => tracing::debug!(
                queue = %self.queue,
                event_type = event.event_type(),
                key = %event.key(),
                message_id = %message_id,
                "Event queued"
            ),
            Err(e) => tracing::error!(
                queue = %self.queue,
                event_type = event.event_type(),
                key = %event.key(),
                error = %e,
                "Failed to queue event"
            ),
        }

        result
    }
}
