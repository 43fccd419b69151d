use crate::dispatch::Request;
use crate::error::ValidationError;

use super::value_objects::{ApplicationReceipt, EligibilityResult, Offer, UserProfile};

// ============================================================================
// Loan Commands & Queries
// ============================================================================

#[derive(Debug, Clone)]
pub struct SubmitLoanApplication {
    applicant: String,
    loan_type: String,
    bank: String,
}

impl SubmitLoanApplication {
    pub fn new(
        applicant: impl Into<String>,
        loan_type: impl Into<String>,
        bank: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            applicant: required("applicant", applicant.into())?,
            loan_type: required("loan_type", loan_type.into())?,
            bank: required("bank", bank.into())?,
        })
    }

    pub fn applicant(&self) -> &str {
        &self.applicant
    }

    pub fn loan_type(&self) -> &str {
        &self.loan_type
    }

    pub fn bank(&self) -> &str {
        &self.bank
    }

    pub(crate) fn into_parts(self) -> (String, String, String) {
        (self.applicant, self.loan_type, self.bank)
    }
}

impl Request for SubmitLoanApplication {
    type Response = ApplicationReceipt;
    const NAME: &'static str = "SubmitLoanApplication";
}

fn required(field: &'static str, value: String) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CheckEligibility {
    pub profile: UserProfile,
}

impl Request for CheckEligibility {
    type Response = Vec<EligibilityResult>;
    const NAME: &'static str = "CheckEligibility";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOffers;

impl Request for ListOffers {
    type Response = Vec<Offer>;
    const NAME: &'static str = "ListOffers";
}

#[derive(Debug, Clone, Copy)]
pub struct GetOfferById {
    pub id: u32,
}

impl Request for GetOfferById {
    type Response = Option<Offer>;
    const NAME: &'static str = "GetOfferById";
}
