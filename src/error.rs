use uuid::Uuid;

// ============================================================================
// Pipeline Errors
// ============================================================================
//
// One enum for everything a caller of the dispatcher can observe. Each
// failure domain (validation, storage, broker, wire decoding) has its own
// error type that converts into PipelineError.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No handler registered for request type {0}")]
    NoHandler(&'static str),

    #[error("A handler is already registered for request type {0}")]
    DuplicateHandler(&'static str),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Malformed(#[from] MalformedMessageError),
}

/// Malformed command input. Raised while building a command, before any
/// handler runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    EmptyField(&'static str),

    #[error("Order must contain at least one item")]
    NoItems,

    #[error("Order item at position {0} is blank")]
    BlankItem(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to (de)serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Queue {0} has not been declared")]
    QueueNotDeclared(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(u64),

    #[error("Circuit breaker open, broker calls suspended")]
    CircuitOpen,

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(String),
}

/// A queued payload that can never be decoded into a domain event.
#[derive(Debug, thiserror::Error)]
#[error("Malformed message {message_id}: {reason}")]
pub struct MalformedMessageError {
    pub message_id: Uuid,
    pub reason: String,
}
