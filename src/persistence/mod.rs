// ============================================================================
// Persistence - Repository and Unit of Work
// ============================================================================
//
// Entities are stored as JSON documents keyed by (kind, id). Writes are
// staged on a UnitOfWork and only become visible on `commit`, which is
// all-or-nothing. Writing an entity whose id already exists replaces it, so
// replaying the same write is harmless.
//
// Each process (command side, consumer side) opens its own Repository; they
// never share a session.
//
// ============================================================================

mod in_memory;
mod scylla_store;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::PersistenceError;

pub use self::in_memory::{InMemoryRepository, InMemoryUnitOfWork};
pub use self::scylla_store::{ScyllaRepository, ScyllaUnitOfWork};

/// Something the repository can store.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage namespace, e.g. "order"
    const KIND: &'static str;

    fn id(&self) -> Uuid;
}

#[async_trait]
pub trait Repository: Send + Sync + 'static {
    type UnitOfWork: UnitOfWork;

    /// Start a unit of work. Nothing is written until it is committed.
    fn begin(&self) -> Self::UnitOfWork;

    async fn get_by_id<T: Entity>(&self, id: Uuid) -> Result<Option<T>, PersistenceError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    fn add<T: Entity>(&mut self, entity: &T) -> Result<(), PersistenceError>;

    /// Apply every staged write atomically.
    async fn commit(self) -> Result<(), PersistenceError>;
}

/// A serialized write waiting for commit.
#[derive(Debug, Clone)]
struct StagedWrite {
    kind: &'static str,
    id: Uuid,
    body: String,
}

impl StagedWrite {
    fn from_entity<T: Entity>(entity: &T) -> Result<Self, PersistenceError> {
        Ok(Self {
            kind: T::KIND,
            id: entity.id(),
            body: serde_json::to_string(entity)?,
        })
    }
}
