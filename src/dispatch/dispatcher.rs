use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::PipelineError;
use crate::metrics::Metrics;

use super::notification::{Notification, NotificationBus, NotificationHandler, PublishReport};
use super::request::{Request, RequestHandler};

// ============================================================================
// Request Dispatcher
// ============================================================================
//
// Registration table: request TypeId -> the single handler for that type.
// Notifications are delegated to a NotificationBus that handlers can also
// hold directly, so a handler never needs a reference back to the
// dispatcher that owns it.
//
// ============================================================================

// Each entry holds an `Arc<dyn RequestHandler<R>>` for the R keyed by TypeId.
type ErasedHandler = Arc<dyn Any + Send + Sync>;

pub struct Dispatcher {
    handlers: RwLock<HashMap<TypeId, ErasedHandler>>,
    notifications: Arc<NotificationBus>,
    metrics: Option<Arc<Metrics>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::default(),
            notifications: Arc::new(NotificationBus::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self {
            handlers: RwLock::default(),
            notifications: Arc::new(NotificationBus::with_metrics(metrics.clone())),
            metrics: Some(metrics),
        }
    }

    /// The bus behind `publish`, for handlers that emit events.
    pub fn notifications(&self) -> Arc<NotificationBus> {
        self.notifications.clone()
    }

    pub fn register_handler<R, H>(&self, handler: H) -> Result<(), PipelineError>
    where
        R: Request,
        H: RequestHandler<R> + 'static,
    {
        let handler: Arc<dyn RequestHandler<R>> = Arc::new(handler);
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);

        match table.entry(TypeId::of::<R>()) {
            Entry::Occupied(_) => {
                tracing::error!(request = R::NAME, "Duplicate handler registration rejected");
                Err(PipelineError::DuplicateHandler(R::NAME))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(handler));
                tracing::debug!(request = R::NAME, "Registered request handler");
                Ok(())
            }
        }
    }

    pub fn register_subscriber<N, H>(&self, subscriber: Arc<H>)
    where
        N: Notification,
        H: NotificationHandler<N> + 'static,
    {
        self.notifications.subscribe::<N, H>(subscriber);
    }

    pub fn has_handler<R: Request>(&self) -> bool {
        self.handler_for::<R>().is_some()
    }

    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response, PipelineError> {
        let Some(handler) = self.handler_for::<R>() else {
            tracing::error!(request = R::NAME, "No handler registered");
            self.record(R::NAME, false);
            return Err(PipelineError::NoHandler(R::NAME));
        };

        let result = handler.handle(request).await;

        if let Err(ref e) = result {
            tracing::debug!(request = R::NAME, error = %e, "Request failed");
        }
        self.record(R::NAME, result.is_ok());

        result
    }

    pub async fn publish<N: Notification>(&self, notification: &N) -> PublishReport {
        self.notifications.publish(notification).await
    }

    fn handler_for<R: Request>(&self) -> Option<Arc<dyn RequestHandler<R>>> {
        let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        table
            .get(&TypeId::of::<R>())
            .and_then(|erased| erased.downcast_ref::<Arc<dyn RequestHandler<R>>>())
            .cloned()
    }

    fn record(&self, request: &str, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_request(request, success);
        }
    }
}
