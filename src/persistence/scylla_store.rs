use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::batch::Batch;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::PersistenceError;

use super::{Entity, Repository, StagedWrite, UnitOfWork};

// ============================================================================
// ScyllaDB Repository - durable storage
// ============================================================================
//
// One document table for every entity kind. CQL INSERT is an upsert, so a
// redelivered event rewriting the same (kind, id) row is idempotent by
// construction. A commit is a single LOGGED batch, which ScyllaDB applies
// all-or-nothing.
//
// ============================================================================

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS entities (
    kind text,
    id uuid,
    body text,
    updated_at timestamp,
    PRIMARY KEY ((kind, id))
)";

const UPSERT: &str = "INSERT INTO entities (kind, id, body, updated_at) VALUES (?, ?, ?, ?)";

const SELECT_BY_ID: &str = "SELECT body FROM entities WHERE kind = ? AND id = ?";

fn backend<E: std::fmt::Display>(error: E) -> PersistenceError {
    PersistenceError::Backend(error.to_string())
}

#[derive(Clone)]
pub struct ScyllaRepository {
    session: Arc<Session>,
}

impl ScyllaRepository {
    /// Open a new session and make sure the keyspace and table exist.
    pub async fn connect(config: &StorageConfig) -> Result<Self, PersistenceError> {
        tracing::info!(node = %config.known_node, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session: Session = SessionBuilder::new()
            .known_node(&config.known_node)
            .build()
            .await
            .map_err(backend)?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    config.keyspace
                ),
                &[],
            )
            .await
            .map_err(backend)?;

        session
            .use_keyspace(&config.keyspace, false)
            .await
            .map_err(backend)?;

        session
            .query_unpaged(CREATE_TABLE, &[])
            .await
            .map_err(backend)?;

        Ok(Self { session: Arc::new(session) })
    }
}

#[async_trait]
impl Repository for ScyllaRepository {
    type UnitOfWork = ScyllaUnitOfWork;

    fn begin(&self) -> ScyllaUnitOfWork {
        ScyllaUnitOfWork {
            session: self.session.clone(),
            staged: Vec::new(),
        }
    }

    async fn get_by_id<T: Entity>(&self, id: Uuid) -> Result<Option<T>, PersistenceError> {
        let result = self
            .session
            .query_unpaged(SELECT_BY_ID, (T::KIND, id))
            .await
            .map_err(backend)?;

        let rows = result.into_rows_result().map_err(backend)?;
        match rows.maybe_first_row::<(String,)>().map_err(backend)? {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}

pub struct ScyllaUnitOfWork {
    session: Arc<Session>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl UnitOfWork for ScyllaUnitOfWork {
    fn add<T: Entity>(&mut self, entity: &T) -> Result<(), PersistenceError> {
        self.staged.push(StagedWrite::from_entity(entity)?);
        Ok(())
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        if self.staged.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut batch = Batch::default();
        let mut values = Vec::with_capacity(self.staged.len());

        for write in &self.staged {
            batch.append_statement(UPSERT);
            values.push((write.kind.to_string(), write.id, write.body.clone(), now));
        }

        self.session.batch(&batch, values).await.map_err(|e| {
            tracing::error!(error = %e, writes = self.staged.len(), "ScyllaDB batch commit failed");
            PersistenceError::CommitRejected(e.to_string())
        })?;

        tracing::debug!(writes = self.staged.len(), "Committed unit of work to ScyllaDB");
        Ok(())
    }
}
