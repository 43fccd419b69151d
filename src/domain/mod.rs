// ============================================================================
// Domain Layer
// ============================================================================
//
// One subdirectory per business area (value objects, commands, events,
// handlers). `events` holds the broker-facing envelope both areas share.
//
// ============================================================================

pub mod events;
pub mod loan;
pub mod order;

pub use events::{BrokerHandoff, DomainEvent, EventEmitter};
