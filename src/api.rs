use std::sync::Arc;

use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::domain::loan::{
    ApplicationReceipt, CheckEligibility, CheckEligibilityHandler, EligibilityResult, GetOfferById,
    GetOfferByIdHandler, ListOffers, ListOffersHandler, LoanApplicationSubmitted, Offer, OfferCatalog,
    SubmitLoanApplication, SubmitLoanApplicationHandler, UserProfile,
};
use crate::domain::order::{GetOrderById, GetOrderByIdHandler, Order, OrderPlaced, PlaceOrder, PlaceOrderHandler};
use crate::domain::EventEmitter;
use crate::error::PipelineError;
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::notifications::ConfirmationOutbox;
use crate::persistence::Repository;

// ============================================================================
// Command API - the command side, fully wired
// ============================================================================
//
// Builds one dispatcher per command side with every handler and local
// subscriber registered, then exposes typed entry points. Commands are
// validated here, before dispatch.
//
// ============================================================================

pub struct CommandApi {
    dispatcher: Arc<Dispatcher>,
    outbox: Arc<ConfirmationOutbox>,
}

impl CommandApi {
    pub fn build<R: Repository>(
        repository: Arc<R>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, PipelineError> {
        let dispatcher = match metrics {
            Some(metrics) => Dispatcher::with_metrics(metrics),
            None => Dispatcher::new(),
        };

        let outbox = Arc::new(ConfirmationOutbox::new());
        dispatcher.register_subscriber::<OrderPlaced, _>(outbox.clone());
        dispatcher.register_subscriber::<LoanApplicationSubmitted, _>(outbox.clone());

        let emitter = Arc::new(EventEmitter::new(dispatcher.notifications(), publisher));
        let catalog = Arc::new(OfferCatalog::seeded());

        dispatcher.register_handler::<PlaceOrder, _>(PlaceOrderHandler::new(repository.clone(), emitter.clone()))?;
        dispatcher.register_handler::<GetOrderById, _>(GetOrderByIdHandler::new(repository.clone()))?;
        dispatcher.register_handler::<SubmitLoanApplication, _>(SubmitLoanApplicationHandler::new(repository, emitter))?;
        dispatcher.register_handler::<CheckEligibility, _>(CheckEligibilityHandler::new(catalog.clone()))?;
        dispatcher.register_handler::<ListOffers, _>(ListOffersHandler::new(catalog.clone()))?;
        dispatcher.register_handler::<GetOfferById, _>(GetOfferByIdHandler::new(catalog))?;

        tracing::info!("Command side wired");

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            outbox,
        })
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn outbox(&self) -> &Arc<ConfirmationOutbox> {
        &self.outbox
    }

    pub async fn place_order(&self, customer_name: &str, items: Vec<String>) -> Result<Uuid, PipelineError> {
        let command = PlaceOrder::new(customer_name, items)?;
        self.dispatcher.send(command).await
    }

    pub async fn submit_loan_application(
        &self,
        applicant: &str,
        loan_type: &str,
        bank: &str,
    ) -> Result<ApplicationReceipt, PipelineError> {
        let command = SubmitLoanApplication::new(applicant, loan_type, bank)?;
        self.dispatcher.send(command).await
    }

    pub async fn check_eligibility(&self, profile: UserProfile) -> Result<Vec<EligibilityResult>, PipelineError> {
        self.dispatcher.send(CheckEligibility { profile }).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, PipelineError> {
        self.dispatcher.send(GetOrderById { order_id }).await
    }

    pub async fn list_offers(&self) -> Result<Vec<Offer>, PipelineError> {
        self.dispatcher.send(ListOffers).await
    }

    pub async fn get_offer(&self, id: u32) -> Result<Option<Offer>, PipelineError> {
        self.dispatcher.send(GetOfferById { id }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loan::LoanApplication;
    use crate::domain::BrokerHandoff;
    use crate::error::ValidationError;
    use crate::messaging::{BrokerConsumer, BrokerPublisher, InMemoryTransport, RepositorySink};
    use crate::persistence::InMemoryRepository;
    use crate::utils::RetryConfig;
    use std::time::Duration;

    const QUEUE: &str = "domain-events";

    struct Pipeline {
        api: CommandApi,
        command_repository: Arc<InMemoryRepository>,
        consumer_repository: Arc<InMemoryRepository>,
        transport: InMemoryTransport,
        consumer: BrokerConsumer,
    }

    fn pipeline() -> Pipeline {
        let transport = InMemoryTransport::new();
        let command_repository = Arc::new(InMemoryRepository::new());
        let consumer_repository = Arc::new(InMemoryRepository::new());

        let publisher = Arc::new(BrokerPublisher::new(Arc::new(transport.clone()), QUEUE));
        let api = CommandApi::build(command_repository.clone(), publisher, None).unwrap();
        let consumer = BrokerConsumer::new(
            Arc::new(transport.clone()),
            QUEUE,
            Arc::new(RepositorySink::new(consumer_repository.clone())),
        )
        .with_retry(RetryConfig::no_retry());

        Pipeline {
            api,
            command_repository,
            consumer_repository,
            transport,
            consumer,
        }
    }

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_asha_order_end_to_end() {
        let p = pipeline();

        let order_id = p.api.place_order("Asha", items(&["A", "B"])).await.unwrap();

        assert!(p.api.outbox().contains(order_id));
        assert_eq!(p.api.outbox().sent().len(), 1);
        assert_eq!(p.transport.depth(QUEUE), 1);

        p.consumer.start().await.unwrap();
        assert!(p.consumer.wait_for_settled(1, Duration::from_secs(2)).await);
        p.consumer.stop().await;

        let persisted: Order = p.consumer_repository.get_by_id(order_id).await.unwrap().unwrap();
        assert_eq!(persisted.customer_name, "Asha");
        assert_eq!(persisted.items, vec!["A", "B"]);

        let local = p.api.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(local, persisted);
    }

    #[tokio::test]
    async fn test_loan_application_end_to_end() {
        let p = pipeline();

        let receipt = p
            .api
            .submit_loan_application("Ravi", "Home Loan", "Axis Bank")
            .await
            .unwrap();
        assert_eq!(receipt.broker, BrokerHandoff::Queued);

        p.consumer.start().await.unwrap();
        assert!(p.consumer.wait_for_settled(1, Duration::from_secs(2)).await);
        p.consumer.stop().await;

        let persisted: LoanApplication = p
            .consumer_repository
            .get_by_id(receipt.application_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.applicant, "Ravi");
        assert_eq!(persisted.bank, "Axis Bank");
        assert!(p.api.outbox().contains(receipt.application_id));
    }

    #[tokio::test]
    async fn test_failed_commit_emits_nothing() {
        let p = pipeline();
        p.command_repository.fail_next_commits(1);

        let err = p.api.place_order("Asha", items(&["A"])).await.unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        assert!(p.api.outbox().sent().is_empty());
        assert_eq!(p.transport.depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_broker_down_command_still_succeeds() {
        let p = pipeline();
        p.transport.set_reachable(false);

        let order_id = p.api.place_order("Asha", items(&["A"])).await.unwrap();
        let receipt = p
            .api
            .submit_loan_application("Ravi", "Car Loan", "ICICI")
            .await
            .unwrap();

        assert!(p.api.get_order(order_id).await.unwrap().is_some());
        assert_eq!(receipt.broker, BrokerHandoff::Failed);
        assert_eq!(p.api.outbox().sent().len(), 2);
        p.transport.set_reachable(true);
        assert_eq!(p.transport.depth(QUEUE), 0);
    }

    #[tokio::test]
    async fn test_invalid_command_never_dispatched() {
        let p = pipeline();

        let err = p.api.place_order("Asha", Vec::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Validation(ValidationError::NoItems)));
        assert_eq!(p.command_repository.commit_count(), 0);
        assert!(p.api.outbox().sent().is_empty());
    }

    #[tokio::test]
    async fn test_offer_queries_through_api() {
        let p = pipeline();

        let offers = p.api.list_offers().await.unwrap();
        let home = p.api.get_offer(1).await.unwrap().unwrap();
        let results = p
            .api
            .check_eligibility(UserProfile {
                age: 35,
                income: 29_999.0,
                credit_score: 750.0,
                location: "Delhi".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(offers.len(), 3);
        assert_eq!(home.provider, "Axis Bank");
        assert!(p.api.get_offer(99).await.unwrap().is_none());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.eligible));
    }

    #[tokio::test]
    async fn test_every_request_type_has_a_handler() {
        let p = pipeline();
        let dispatcher = p.api.dispatcher();

        assert!(dispatcher.has_handler::<PlaceOrder>());
        assert!(dispatcher.has_handler::<GetOrderById>());
        assert!(dispatcher.has_handler::<SubmitLoanApplication>());
        assert!(dispatcher.has_handler::<CheckEligibility>());
        assert!(dispatcher.has_handler::<ListOffers>());
        assert!(dispatcher.has_handler::<GetOfferById>());
    }
}
