use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PersistenceError;

use super::{Entity, Repository, StagedWrite, UnitOfWork};

// ============================================================================
// In-Memory Repository
// ============================================================================
//
// Explicit, instance-owned storage for tests and the --in-memory demo mode.
// Supports failure injection: `fail_next_commits(n)` makes the next n
// commits fail without writing anything.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    rows: RwLock<HashMap<(&'static str, Uuid), String>>,
    failing_commits: AtomicU32,
    commits: AtomicU64,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    tables: Arc<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_commits(&self, count: u32) {
        self.tables.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.tables.commits.load(Ordering::SeqCst)
    }

    pub fn count<T: Entity>(&self) -> usize {
        self.read_rows()
            .keys()
            .filter(|(kind, _)| *kind == T::KIND)
            .count()
    }

    pub fn all<T: Entity>(&self) -> Result<Vec<T>, PersistenceError> {
        self.read_rows()
            .iter()
            .filter(|((kind, _), _)| *kind == T::KIND)
            .map(|(_, body)| serde_json::from_str(body).map_err(PersistenceError::from))
            .collect()
    }

    fn read_rows(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(&'static str, Uuid), String>> {
        self.tables.rows.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    type UnitOfWork = InMemoryUnitOfWork;

    fn begin(&self) -> InMemoryUnitOfWork {
        InMemoryUnitOfWork {
            tables: self.tables.clone(),
            staged: Vec::new(),
        }
    }

    async fn get_by_id<T: Entity>(&self, id: Uuid) -> Result<Option<T>, PersistenceError> {
        let body = self.read_rows().get(&(T::KIND, id)).cloned();
        body.map(|body| serde_json::from_str(&body).map_err(PersistenceError::from))
            .transpose()
    }
}

pub struct InMemoryUnitOfWork {
    tables: Arc<Tables>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    fn add<T: Entity>(&mut self, entity: &T) -> Result<(), PersistenceError> {
        self.staged.push(StagedWrite::from_entity(entity)?);
        Ok(())
    }

    async fn commit(self) -> Result<(), PersistenceError> {
        let injected = self
            .tables
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PersistenceError::CommitRejected(
                "injected commit failure".to_string(),
            ));
        }

        let mut rows = self.tables.rows.write().unwrap_or_else(PoisonError::into_inner);
        for write in self.staged {
            rows.insert((write.kind, write.id), write.body);
        }
        drop(rows);

        self.tables.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: Uuid,
        label: String,
    }

    impl Entity for Widget {
        const KIND: &'static str = "widget";

        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn widget(label: &str) -> Widget {
        Widget { id: Uuid::new_v4(), label: label.to_string() }
    }

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let repo = InMemoryRepository::new();
        let item = widget("gear");

        let mut uow = repo.begin();
        uow.add(&item).unwrap();
        assert!(repo.get_by_id::<Widget>(item.id).await.unwrap().is_none());

        uow.commit().await.unwrap();
        assert_eq!(repo.get_by_id::<Widget>(item.id).await.unwrap(), Some(item));
        assert_eq!(repo.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_same_id_is_upserted() {
        let repo = InMemoryRepository::new();
        let mut item = widget("gear");

        for label in ["gear", "sprocket"] {
            item.label = label.to_string();
            let mut uow = repo.begin();
            uow.add(&item).unwrap();
            uow.commit().await.unwrap();
        }

        assert_eq!(repo.count::<Widget>(), 1);
        let stored = repo.get_by_id::<Widget>(item.id).await.unwrap().unwrap();
        assert_eq!(stored.label, "sprocket");
    }

    #[tokio::test]
    async fn test_injected_failure_writes_nothing() {
        let repo = InMemoryRepository::new();
        repo.fail_next_commits(1);

        let item = widget("gear");
        let mut uow = repo.begin();
        uow.add(&item).unwrap();
        let err = uow.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::CommitRejected(_)));
        assert_eq!(repo.count::<Widget>(), 0);

        // only the requested number of commits fail
        let mut uow = repo.begin();
        uow.add(&item).unwrap();
        uow.commit().await.unwrap();
        assert_eq!(repo.count::<Widget>(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let repo = InMemoryRepository::new();
        let view = repo.clone();

        let mut uow = repo.begin();
        uow.add(&widget("a")).unwrap();
        uow.add(&widget("b")).unwrap();
        uow.commit().await.unwrap();

        assert_eq!(view.all::<Widget>().unwrap().len(), 2);
    }
}
