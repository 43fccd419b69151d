use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::DomainEvent;
use crate::error::{MalformedMessageError, TransportError};
use crate::metrics::Metrics;
use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

use super::sink::EventSink;
use super::transport::{Delivery, QueueTransport, Subscription};

// ============================================================================
// Broker Consumer
// ============================================================================
//
// One long-lived task per queue:
//
//   Stopped --start()--> Listening --stop()--> Stopped
//
// Per delivery:
//   1. Decode. Unknown event type or missing field => ack, drop, park on
//      the dead-letter queue if one is configured. Never retried.
//   2. Persist through the sink, retrying with backoff.
//   3. Ack only after the write committed. If every attempt failed the
//      delivery is requeued and will come back (at-least-once).
//
// Shutdown is only observed while waiting for the next delivery or while
// pausing before a redelivery; a message already being processed always
// runs to completion.
//
// ============================================================================

const TRANSPORT_ERROR_PAUSE: Duration = Duration::from_millis(500);
const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_millis(250);
const MIN_REDELIVERY_DELAY: Duration = Duration::from_millis(10);
const MALFORMED_LABEL: &str = "malformed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Stopped,
    Listening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Persisted,
    Dropped,
    Requeued,
    /// Ack or requeue failed; the broker still owns the delivery
    Unsettled,
}

impl ProcessOutcome {
    fn as_label(self) -> &'static str {
        match self {
            ProcessOutcome::Persisted => "persisted",
            ProcessOutcome::Dropped => "malformed",
            ProcessOutcome::Requeued => "requeued",
            ProcessOutcome::Unsettled => "unsettled",
        }
    }
}

/// Live counters, readable while the consumer runs.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    received: AtomicU64,
    persisted: AtomicU64,
    dropped: AtomicU64,
    requeued: AtomicU64,
    unsettled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConsumerStatsSnapshot {
    pub received: u64,
    pub persisted: u64,
    pub dropped: u64,
    pub requeued: u64,
    pub unsettled: u64,
}

impl ConsumerStats {
    pub fn snapshot(&self) -> ConsumerStatsSnapshot {
        ConsumerStatsSnapshot {
            received: self.received.load(Ordering::SeqCst),
            persisted: self.persisted.load(Ordering::SeqCst),
            dropped: self.dropped.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
            unsettled: self.unsettled.load(Ordering::SeqCst),
        }
    }

    fn record(&self, outcome: ProcessOutcome) {
        let counter = match outcome {
            ProcessOutcome::Persisted => &self.persisted,
            ProcessOutcome::Dropped => &self.dropped,
            ProcessOutcome::Requeued => &self.requeued,
            ProcessOutcome::Unsettled => &self.unsettled,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl ConsumerStatsSnapshot {
    /// Deliveries that left the queue for good
    pub fn settled(&self) -> u64 {
        self.persisted + self.dropped
    }
}

// ============================================================================
// Message Processor - one delivery, start to finish
// ============================================================================

#[derive(Clone)]
struct MessageProcessor {
    sink: Arc<dyn EventSink>,
    retry: RetryConfig,
    dead_letters: Option<(Arc<dyn QueueTransport>, String)>,
    metrics: Option<Arc<Metrics>>,
    stats: Arc<ConsumerStats>,
}

impl MessageProcessor {
    /// Every delivery ends in exactly one recorded outcome, including the
    /// ones whose ack or requeue failed.
    async fn process(&self, subscription: &mut dyn Subscription, delivery: Delivery) -> ProcessOutcome {
        let started = Instant::now();
        self.stats.received.fetch_add(1, Ordering::SeqCst);

        let (event_type, settled) = match DomainEvent::from_bytes(&delivery.message.payload) {
            Ok(event) => (event.event_type(), self.persist(subscription, &delivery, &event).await),
            Err(e) => {
                let malformed = MalformedMessageError {
                    message_id: delivery.message.message_id,
                    reason: e.to_string(),
                };
                (MALFORMED_LABEL, self.drop_malformed(subscription, &delivery, malformed).await)
            }
        };

        let outcome = settled.unwrap_or_else(|e| {
            tracing::error!(
                message_id = %delivery.message.message_id,
                delivery_tag = delivery.delivery_tag,
                error = %e,
                "Failed to settle delivery, broker will redeliver"
            );
            ProcessOutcome::Unsettled
        });

        self.stats.record(outcome);
        if let Some(metrics) = &self.metrics {
            metrics.record_consumed(event_type, outcome.as_label(), started.elapsed().as_secs_f64());
        }

        outcome
    }

    async fn persist(
        &self,
        subscription: &mut dyn Subscription,
        delivery: &Delivery,
        event: &DomainEvent,
    ) -> Result<ProcessOutcome, TransportError> {
        let result = retry_with_backoff("persist_event", &self.retry, |attempt| {
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_persist_retry(event.event_type());
                }
            }
            self.sink.persist(event)
        })
        .await;

        match result {
            RetryResult::Success(()) => {
                subscription.ack(delivery).await?;
                tracing::info!(
                    event_type = event.event_type(),
                    key = %event.key(),
                    message_id = %delivery.message.message_id,
                    redelivered = delivery.redelivered,
                    "Event persisted"
                );
                Ok(ProcessOutcome::Persisted)
            }
            RetryResult::Exhausted { error, attempts } => {
                subscription.requeue(delivery).await?;
                tracing::warn!(
                    event_type = event.event_type(),
                    key = %event.key(),
                    message_id = %delivery.message.message_id,
                    attempts,
                    error = %error,
                    "Persist failed, message returned to queue"
                );
                Ok(ProcessOutcome::Requeued)
            }
        }
    }

    async fn drop_malformed(
        &self,
        subscription: &mut dyn Subscription,
        delivery: &Delivery,
        malformed: MalformedMessageError,
    ) -> Result<ProcessOutcome, TransportError> {
        tracing::warn!(
            message_id = %malformed.message_id,
            event_type = %delivery.message.event_type,
            error = %malformed,
            "Dropping malformed message"
        );

        if let Some((transport, queue)) = &self.dead_letters {
            let parked = async {
                transport.declare(queue).await?;
                transport.publish(queue, delivery.message.clone()).await?;
                Ok::<(), TransportError>(())
            };
            match parked.await {
                Ok(()) => tracing::info!(
                    message_id = %malformed.message_id,
                    dead_letter_queue = %queue,
                    "Malformed message parked"
                ),
                Err(e) => tracing::error!(
                    message_id = %malformed.message_id,
                    dead_letter_queue = %queue,
                    error = %e,
                    "Failed to park malformed message"
                ),
            }
        }

        subscription.ack(delivery).await?;
        Ok(ProcessOutcome::Dropped)
    }
}

// ============================================================================
// Consumer lifecycle
// ============================================================================

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct BrokerConsumer {
    transport: Arc<dyn QueueTransport>,
    queue: String,
    processor: MessageProcessor,
    redelivery_delay: Duration,
    stats: Arc<ConsumerStats>,
    running: Mutex<Option<Running>>,
}

impl BrokerConsumer {
    pub fn new(transport: Arc<dyn QueueTransport>, queue: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        let stats = Arc::new(ConsumerStats::default());
        Self {
            transport,
            queue: queue.into(),
            processor: MessageProcessor {
                sink,
                retry: RetryConfig::default(),
                dead_letters: None,
                metrics: None,
                stats: stats.clone(),
            },
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
            stats,
            running: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.processor.retry = retry;
        self
    }

    /// Pause before taking the next delivery after a requeue. Clamped to a
    /// small minimum so a store that keeps failing cannot spin the loop.
    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay.max(MIN_REDELIVERY_DELAY);
        self
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.processor.dead_letters = Some((self.transport.clone(), queue.into()));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.processor.metrics = Some(metrics);
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn state(&self) -> ConsumerState {
        match self.running.lock().await.as_ref() {
            Some(running) if !running.handle.is_finished() => ConsumerState::Listening,
            _ => ConsumerState::Stopped,
        }
    }

    /// Subscribe and spawn the consume loop. Starting a consumer that is
    /// already listening is a no-op.
    pub async fn start(&self) -> Result<(), TransportError> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                tracing::debug!(queue = %self.queue, "Consumer already listening");
                return Ok(());
            }
        }

        let subscription = self.transport.subscribe(&self.queue).await?;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(consume_loop(
            self.queue.clone(),
            subscription,
            Arc::new(self.processor.clone()),
            self.redelivery_delay,
            shutdown_rx,
        ));

        *running = Some(Running { shutdown, handle });
        tracing::info!(queue = %self.queue, "Consumer listening");
        Ok(())
    }

    /// Signal shutdown and wait for the loop to finish its current message.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if let Err(e) = running.handle.await {
            tracing::error!(queue = %self.queue, error = %e, "Consumer task ended abnormally");
        }
        tracing::info!(queue = %self.queue, stats = ?self.stats(), "Consumer stopped");
    }

    /// Wait until at least `count` deliveries have settled (persisted or
    /// dropped). Returns false on timeout.
    pub async fn wait_for_settled(&self, count: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.stats().settled() < count {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

async fn consume_loop(
    queue: String,
    mut subscription: Box<dyn Subscription>,
    processor: Arc<MessageProcessor>,
    redelivery_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = subscription.next() => next,
        };

        let pause = match next {
            Ok(Some(delivery)) => match processor.process(subscription.as_mut(), delivery).await {
                ProcessOutcome::Requeued => Some(redelivery_delay),
                ProcessOutcome::Unsettled => Some(TRANSPORT_ERROR_PAUSE),
                ProcessOutcome::Persisted | ProcessOutcome::Dropped => None,
            },
            Ok(None) => break,
            Err(e) => {
                tracing::error!(queue = %queue, error = %e, "Failed to receive from queue");
                Some(TRANSPORT_ERROR_PAUSE)
            }
        };

        if let Some(pause) = pause {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    if let Err(e) = subscription.close().await {
        tracing::warn!(queue = %queue, error = %e, "Failed to close subscription");
    }
}
