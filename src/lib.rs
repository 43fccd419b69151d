// ============================================================================
// command_pipeline
// ============================================================================
//
// Command side:   CommandApi -> Dispatcher -> handler -> commit
//                 -> local subscribers -> broker queue
// Consumer side:  queue -> BrokerConsumer -> decode -> upsert -> ack
//
// ============================================================================

pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod metrics;
pub mod notifications;
pub mod persistence;
pub mod utils;

pub use api::CommandApi;
pub use error::PipelineError;
