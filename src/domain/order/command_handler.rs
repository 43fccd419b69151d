use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::dispatch::RequestHandler;
use crate::domain::events::EventEmitter;
use crate::error::PipelineError;
use crate::persistence::{Repository, UnitOfWork};

use super::commands::{GetOrderById, PlaceOrder};
use super::events::OrderPlaced;
use super::value_objects::Order;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Order → Unit of Work → commit → OrderPlaced
//
// The event is only emitted after a successful commit. A failed commit
// surfaces as a persistence error and nothing is published.
//
// ============================================================================

pub struct PlaceOrderHandler<R: Repository> {
    repository: Arc<R>,
    emitter: Arc<EventEmitter>,
}

impl<R: Repository> PlaceOrderHandler<R> {
    pub fn new(repository: Arc<R>, emitter: Arc<EventEmitter>) -> Self {
        Self { repository, emitter }
    }
}

#[async_trait]
impl<R: Repository> RequestHandler<PlaceOrder> for PlaceOrderHandler<R> {
    async fn handle(&self, command: PlaceOrder) -> Result<Uuid, PipelineError> {
        let (customer_name, items) = command.into_parts();
        let order = Order::new(customer_name, items);

        let mut unit_of_work = self.repository.begin();
        unit_of_work.add(&order)?;
        unit_of_work.commit().await?;

        tracing::info!(
            order_id = %order.id,
            customer = %order.customer_name,
            items = order.items.len(),
            "Order committed"
        );

        let handoff = self.emitter.emit(OrderPlaced::from(&order)).await;
        tracing::debug!(order_id = %order.id, ?handoff, "OrderPlaced emitted");

        Ok(order.id)
    }
}

pub struct GetOrderByIdHandler<R: Repository> {
    repository: Arc<R>,
}

impl<R: Repository> GetOrderByIdHandler<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: Repository> RequestHandler<GetOrderById> for GetOrderByIdHandler<R> {
    async fn handle(&self, query: GetOrderById) -> Result<Option<Order>, PipelineError> {
        Ok(self.repository.get_by_id::<Order>(query.order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{NotificationBus, NotificationHandler};
    use crate::messaging::{BrokerPublisher, InMemoryTransport};
    use crate::persistence::InMemoryRepository;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<OrderPlaced>>,
    }

    #[async_trait]
    impl NotificationHandler<OrderPlaced> for Recorder {
        async fn handle(&self, event: &OrderPlaced) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn setup() -> (PlaceOrderHandler<InMemoryRepository>, Arc<InMemoryRepository>, Arc<Recorder>, InMemoryTransport) {
        let repository = Arc::new(InMemoryRepository::new());
        let bus = Arc::new(NotificationBus::new());
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<OrderPlaced, _>(recorder.clone());

        let transport = InMemoryTransport::new();
        let publisher = Arc::new(BrokerPublisher::new(Arc::new(transport.clone()), "orders"));
        let emitter = Arc::new(EventEmitter::new(bus, publisher));

        (PlaceOrderHandler::new(repository.clone(), emitter), repository, recorder, transport)
    }

    #[tokio::test]
    async fn test_place_order_commits_then_emits() {
        let (handler, repository, recorder, transport) = setup();
        let command = PlaceOrder::new("Asha", vec!["A".to_string(), "B".to_string()]).unwrap();

        let order_id = handler.handle(command).await.unwrap();

        let stored: Order = repository.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(stored.customer_name, "Asha");
        assert_eq!(stored.items, vec!["A", "B"]);

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].order_id, order_id);
        assert_eq!(transport.depth("orders"), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_emits_nothing() {
        let (handler, repository, recorder, transport) = setup();
        repository.fail_next_commits(1);
        let command = PlaceOrder::new("Asha", vec!["A".to_string()]).unwrap();

        let err = handler.handle(command).await.unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(repository.count::<Order>(), 0);
        assert!(recorder.seen.lock().unwrap().is_empty());
        assert_eq!(transport.depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_unreachable_broker_still_succeeds() {
        let (handler, repository, recorder, transport) = setup();
        transport.set_reachable(false);
        let command = PlaceOrder::new("Asha", vec!["A".to_string()]).unwrap();

        let order_id = handler.handle(command).await.unwrap();

        assert!(repository.get_by_id::<Order>(order_id).await.unwrap().is_some());
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
        assert_eq!(transport.depth("orders"), 0);
    }

    #[tokio::test]
    async fn test_get_order_by_id() {
        let (handler, repository, _, _) = setup();
        let command = PlaceOrder::new("Asha", vec!["A".to_string()]).unwrap();
        let order_id = handler.handle(command).await.unwrap();

        let query = GetOrderByIdHandler::new(repository);
        let found = query.handle(GetOrderById { order_id }).await.unwrap();
        let missing = query.handle(GetOrderById { order_id: Uuid::new_v4() }).await.unwrap();

        assert_eq!(found.map(|o| o.id), Some(order_id));
        assert!(missing.is_none());
    }
}
