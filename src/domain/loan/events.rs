use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::Notification;

use super::value_objects::LoanApplication;

/// Loan Application Submitted - emitted once the application is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplicationSubmitted {
    #[serde(rename = "id")]
    pub application_id: Uuid,
    pub applicant: String,
    pub loan_type: String,
    pub bank: String,
    #[serde(rename = "timestamp")]
    pub submitted_at: DateTime<Utc>,
}

impl Notification for LoanApplicationSubmitted {
    const NAME: &'static str = "LoanApplicationSubmitted";
}

impl From<&LoanApplication> for LoanApplicationSubmitted {
    fn from(application: &LoanApplication) -> Self {
        Self {
            application_id: application.id,
            applicant: application.applicant.clone(),
            loan_type: application.loan_type.clone(),
            bank: application.bank.clone(),
            submitted_at: application.submitted_at,
        }
    }
}
