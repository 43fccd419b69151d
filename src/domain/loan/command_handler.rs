use std::sync::Arc;

use async_trait::async_trait;

use crate::dispatch::RequestHandler;
use crate::domain::events::EventEmitter;
use crate::error::PipelineError;
use crate::persistence::{Repository, UnitOfWork};

use super::catalog::OfferCatalog;
use super::commands::{CheckEligibility, GetOfferById, ListOffers, SubmitLoanApplication};
use super::eligibility;
use super::events::LoanApplicationSubmitted;
use super::value_objects::{ApplicationReceipt, EligibilityResult, LoanApplication, Offer};

// ============================================================================
// Loan Application Command Handler
// ============================================================================
//
// Same shape as placing an order: commit first, then local subscribers,
// then the broker.
//
// ============================================================================

pub struct SubmitLoanApplicationHandler<R: Repository> {
    repository: Arc<R>,
    emitter: Arc<EventEmitter>,
}

impl<R: Repository> SubmitLoanApplicationHandler<R> {
    pub fn new(repository: Arc<R>, emitter: Arc<EventEmitter>) -> Self {
        Self { repository, emitter }
    }
}

#[async_trait]
impl<R: Repository> RequestHandler<SubmitLoanApplication> for SubmitLoanApplicationHandler<R> {
    async fn handle(&self, command: SubmitLoanApplication) -> Result<ApplicationReceipt, PipelineError> {
        let (applicant, loan_type, bank) = command.into_parts();
        let application = LoanApplication::new(applicant, loan_type, bank);

        let mut unit_of_work = self.repository.begin();
        unit_of_work.add(&application)?;
        unit_of_work.commit().await?;

        tracing::info!(
            application_id = %application.id,
            loan_type = %application.loan_type,
            bank = %application.bank,
            "Loan application committed"
        );

        let broker = self
            .emitter
            .emit(LoanApplicationSubmitted::from(&application))
            .await;

        Ok(ApplicationReceipt {
            application_id: application.id,
            broker,
        })
    }
}

// ============================================================================
// Offer Queries
// ============================================================================

pub struct CheckEligibilityHandler {
    catalog: Arc<OfferCatalog>,
}

impl CheckEligibilityHandler {
    pub fn new(catalog: Arc<OfferCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RequestHandler<CheckEligibility> for CheckEligibilityHandler {
    async fn handle(&self, query: CheckEligibility) -> Result<Vec<EligibilityResult>, PipelineError> {
        let results = eligibility::evaluate(&query.profile, self.catalog.all());
        tracing::debug!(
            eligible = eligibility::is_eligible(&query.profile),
            offers = results.len(),
            "Eligibility evaluated"
        );
        Ok(results)
    }
}

pub struct ListOffersHandler {
    catalog: Arc<OfferCatalog>,
}

impl ListOffersHandler {
    pub fn new(catalog: Arc<OfferCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RequestHandler<ListOffers> for ListOffersHandler {
    async fn handle(&self, _query: ListOffers) -> Result<Vec<Offer>, PipelineError> {
        Ok(self.catalog.all().to_vec())
    }
}

pub struct GetOfferByIdHandler {
    catalog: Arc<OfferCatalog>,
}

impl GetOfferByIdHandler {
    pub fn new(catalog: Arc<OfferCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl RequestHandler<GetOfferById> for GetOfferByIdHandler {
    async fn handle(&self, query: GetOfferById) -> Result<Option<Offer>, PipelineError> {
        Ok(self.catalog.get(query.id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NotificationBus;
    use crate::domain::events::BrokerHandoff;
    use crate::domain::loan::UserProfile;
    use crate::messaging::{BrokerPublisher, InMemoryTransport};
    use crate::persistence::InMemoryRepository;

    fn setup() -> (SubmitLoanApplicationHandler<InMemoryRepository>, Arc<InMemoryRepository>, InMemoryTransport) {
        let repository = Arc::new(InMemoryRepository::new());
        let transport = InMemoryTransport::new();
        let publisher = Arc::new(BrokerPublisher::new(Arc::new(transport.clone()), "loans"));
        let emitter = Arc::new(EventEmitter::new(Arc::new(NotificationBus::new()), publisher));

        (
            SubmitLoanApplicationHandler::new(repository.clone(), emitter),
            repository,
            transport,
        )
    }

    #[tokio::test]
    async fn test_submit_commits_and_queues() {
        let (handler, repository, transport) = setup();
        let command = SubmitLoanApplication::new("Ravi", "Home Loan", "Axis Bank").unwrap();

        let receipt = handler.handle(command).await.unwrap();

        assert_eq!(receipt.broker, BrokerHandoff::Queued);
        let stored: LoanApplication = repository.get_by_id(receipt.application_id).await.unwrap().unwrap();
        assert_eq!(stored.bank, "Axis Bank");
        assert_eq!(transport.depth("loans"), 1);
    }

    #[tokio::test]
    async fn test_submit_reports_failed_handoff() {
        let (handler, repository, transport) = setup();
        transport.set_reachable(false);
        let command = SubmitLoanApplication::new("Ravi", "Car Loan", "ICICI").unwrap();

        let receipt = handler.handle(command).await.unwrap();

        assert_eq!(receipt.broker, BrokerHandoff::Failed);
        assert_eq!(repository.count::<LoanApplication>(), 1);
    }

    #[tokio::test]
    async fn test_submit_failed_commit_queues_nothing() {
        let (handler, repository, transport) = setup();
        repository.fail_next_commits(1);
        let command = SubmitLoanApplication::new("Ravi", "Car Loan", "ICICI").unwrap();

        let err = handler.handle(command).await.unwrap_err();

        assert!(matches!(err, PipelineError::Persistence(_)));
        assert_eq!(transport.depth("loans"), 0);
    }

    #[tokio::test]
    async fn test_offer_queries() {
        let catalog = Arc::new(OfferCatalog::seeded());

        let offers = ListOffersHandler::new(catalog.clone()).handle(ListOffers).await.unwrap();
        let offer = GetOfferByIdHandler::new(catalog.clone())
            .handle(GetOfferById { id: 3 })
            .await
            .unwrap();
        let results = CheckEligibilityHandler::new(catalog)
            .handle(CheckEligibility {
                profile: UserProfile {
                    age: 41,
                    income: 40_000.0,
                    credit_score: 720.0,
                    location: "Mumbai".to_string(),
                },
            })
            .await
            .unwrap();

        assert_eq!(offers.len(), 3);
        assert_eq!(offer.map(|o| o.provider), Some("ICICI".to_string()));
        assert!(results.iter().all(|r| r.eligible));
    }
}
