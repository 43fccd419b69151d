use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::metrics::Metrics;

// ============================================================================
// Notification Bus - in-process fan-out
// ============================================================================
//
// Subscribers run one after another, in registration order, on the
// publisher's task. A failing subscriber is logged and skipped; it never
// stops the rest and never fails the publish.
//
// ============================================================================

/// A fact broadcast to every subscriber registered for its type.
pub trait Notification: Send + Sync + 'static {
    const NAME: &'static str;
}

#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync {
    async fn handle(&self, notification: &N) -> anyhow::Result<()>;
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

// Each entry holds an `Arc<dyn NotificationHandler<N>>` for the N keyed by TypeId.
type ErasedSubscriber = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct NotificationBus {
    subscribers: RwLock<HashMap<TypeId, Vec<ErasedSubscriber>>>,
    metrics: Option<Arc<Metrics>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: RwLock::default(),
            metrics: Some(metrics),
        }
    }

    pub fn subscribe<N, H>(&self, subscriber: Arc<H>)
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        let subscriber: Arc<dyn NotificationHandler<N>> = subscriber;
        let mut table = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let entry = table.entry(TypeId::of::<N>()).or_default();
        entry.push(Arc::new(subscriber));

        tracing::debug!(
            event_type = N::NAME,
            subscribers = entry.len(),
            "Registered notification subscriber"
        );
    }

    pub fn subscriber_count<N: Notification>(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<N>())
            .map_or(0, Vec::len)
    }

    pub async fn publish<N: Notification>(&self, notification: &N) -> PublishReport {
        let subscribers = self.subscribers_for::<N>();
        let mut report = PublishReport::default();

        for (position, subscriber) in subscribers.iter().enumerate() {
            match subscriber.handle(notification).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        event_type = N::NAME,
                        subscriber = position,
                        error = %e,
                        "Local subscriber failed, continuing with the rest"
                    );
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_notification(N::NAME, report.failed);
        }

        tracing::debug!(
            event_type = N::NAME,
            delivered = report.delivered,
            failed = report.failed,
            "Published notification locally"
        );

        report
    }

    // Snapshot taken so no lock is held across subscriber awaits.
    fn subscribers_for<N: Notification>(&self) -> Vec<Arc<dyn NotificationHandler<N>>> {
        let table = self.subscribers.read().unwrap_or_else(PoisonError::into_inner);
        table
            .get(&TypeId::of::<N>())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|erased| erased.downcast_ref::<Arc<dyn NotificationHandler<N>>>())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
