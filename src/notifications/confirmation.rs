use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dispatch::NotificationHandler;
use crate::domain::loan::LoanApplicationSubmitted;
use crate::domain::order::OrderPlaced;

// ============================================================================
// Confirmation Outbox
// ============================================================================
//
// Local subscriber standing in for an email/SMS sender: every committed
// order or loan application gets exactly one confirmation, recorded in an
// in-process log.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    pub reference: Uuid,
    pub recipient: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct ConfirmationOutbox {
    sent: Mutex<Vec<Confirmation>>,
}

impl ConfirmationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Confirmation> {
        self.log().clone()
    }

    pub fn contains(&self, reference: Uuid) -> bool {
        self.log().iter().any(|c| c.reference == reference)
    }

    fn log(&self) -> MutexGuard<'_, Vec<Confirmation>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, reference: Uuid, recipient: &str, message: String) {
        tracing::info!(reference = %reference, recipient = %recipient, "Confirmation sent");
        self.log().push(Confirmation {
            reference,
            recipient: recipient.to_string(),
            message,
            sent_at: Utc::now(),
        });
    }
}

#[async_trait]
impl NotificationHandler<OrderPlaced> for ConfirmationOutbox {
    async fn handle(&self, event: &OrderPlaced) -> anyhow::Result<()> {
        self.send(
            event.order_id,
            &event.customer_name,
            format!(
                "Order {} confirmed for {} ({} items)",
                event.order_id,
                event.customer_name,
                event.items.len()
            ),
        );
        Ok(())
    }
}

#[async_trait]
impl NotificationHandler<LoanApplicationSubmitted> for ConfirmationOutbox {
    async fn handle(&self, event: &LoanApplicationSubmitted) -> anyhow::Result<()> {
        self.send(
            event.application_id,
            &event.applicant,
            format!(
                "{} application {} received by {}",
                event.loan_type, event.application_id, event.bank
            ),
        );
        Ok(())
    }
}
