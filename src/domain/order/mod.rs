// ============================================================================
// Order Domain
// ============================================================================
//
// - Order entity
// - PlaceOrder command, GetOrderById query
// - OrderPlaced event
// - Handlers
//
// ============================================================================

pub mod command_handler;
pub mod commands;
pub mod events;
pub mod value_objects;

pub use command_handler::*;
pub use commands::*;
pub use events::*;
pub use value_objects::*;
