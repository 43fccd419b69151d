// ============================================================================
// Messaging - durable hand-off between the command side and the consumer
// ============================================================================

mod consumer;
mod in_memory;
mod publisher;
mod redpanda;
mod sink;
mod transport;

pub use consumer::{BrokerConsumer, ConsumerState, ConsumerStats, ConsumerStatsSnapshot, ProcessOutcome};
pub use in_memory::{InMemorySubscription, InMemoryTransport};
pub use publisher::{BrokerPublisher, EventPublisher};
pub use redpanda::{RedpandaSubscription, RedpandaTransport};
pub use sink::{EventSink, RepositorySink};
pub use transport::{Delivery, QueueTransport, QueuedMessage, Subscription};
