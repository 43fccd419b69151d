use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::loan::LoanApplication;
use crate::domain::order::Order;
use crate::domain::DomainEvent;
use crate::error::PersistenceError;
use crate::persistence::{Repository, UnitOfWork};

/// Where the consumer writes what it reads off the queue.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn persist(&self, event: &DomainEvent) -> Result<(), PersistenceError>;
}

/// Maps each event back to its entity and upserts it by business id, so a
/// redelivered event overwrites the same record.
pub struct RepositorySink<R: Repository> {
    repository: Arc<R>,
}

impl<R: Repository> RepositorySink<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: Repository> EventSink for RepositorySink<R> {
    async fn persist(&self, event: &DomainEvent) -> Result<(), PersistenceError> {
        let mut unit_of_work = self.repository.begin();
        match event {
            DomainEvent::OrderPlaced(e) => unit_of_work.add(&Order::from(e))?,
            DomainEvent::LoanApplicationSubmitted(e) => unit_of_work.add(&LoanApplication::from(e))?,
        }
        unit_of_work.commit().await
    }
}
