use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::BrokerHandoff;
use crate::persistence::Entity;

use super::events::LoanApplicationSubmitted;

// ============================================================================
// Loan Value Objects
// ============================================================================

/// A static catalog record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: u32,
    pub loan_type: String,
    pub provider: String,
    pub interest_rate: f64,
    pub processing_fee: f64,
}

/// Applicant profile. Only `income` and `credit_score` take part in the
/// decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub age: u32,
    pub income: f64,
    pub credit_score: f64,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityResult {
    pub offer: Offer,
    pub eligible: bool,
    pub reason: String,
}

// ============================================================================
// Loan Application Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: Uuid,
    pub applicant: String,
    pub loan_type: String,
    pub bank: String,
    pub submitted_at: DateTime<Utc>,
}

impl LoanApplication {
    pub fn new(applicant: String, loan_type: String, bank: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            applicant,
            loan_type,
            bank,
            submitted_at: Utc::now(),
        }
    }
}

impl Entity for LoanApplication {
    const KIND: &'static str = "loan_application";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl From<&LoanApplicationSubmitted> for LoanApplication {
    fn from(event: &LoanApplicationSubmitted) -> Self {
        Self {
            id: event.application_id,
            applicant: event.applicant.clone(),
            loan_type: event.loan_type.clone(),
            bank: event.bank.clone(),
            submitted_at: event.submitted_at,
        }
    }
}

/// What the caller gets back for a submitted application. `broker` reports
/// whether the event reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApplicationReceipt {
    pub application_id: Uuid,
    pub broker: BrokerHandoff,
}
