// ============================================================================
// Loan Domain
// ============================================================================
//
// - Offer catalog and the eligibility decision
// - LoanApplication entity, SubmitLoanApplication command
// - LoanApplicationSubmitted event
// - Handlers
//
// ============================================================================

pub mod catalog;
pub mod command_handler;
pub mod commands;
pub mod eligibility;
pub mod events;
pub mod value_objects;

pub use catalog::OfferCatalog;
pub use command_handler::*;
pub use commands::*;
pub use events::*;
pub use value_objects::*;
