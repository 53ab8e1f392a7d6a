//! In-memory run store for single-process deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use runhub_core::{Page, PageRequest, Run, RunId, RunStatus, Sort};

use super::{RunStore, StoreError};

#[derive(Default)]
struct Inner {
    runs: HashMap<RunId, Run>,
    /// Ids in first-insertion order.
    order: Vec<RunId>,
}

/// Run store backed by a `HashMap` behind a `RwLock`.
#[derive(Default)]
pub struct InMemoryRunStore {
    inner: RwLock<Inner>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: Run) -> Result<Run, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.runs.contains_key(&run.id) {
            inner.order.push(run.id.clone());
        }
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    async fn insert(&self, run: Run) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.runs.contains_key(&run.id) {
            return Ok(false);
        }
        inner.order.push(run.id.clone());
        inner.runs.insert(run.id.clone(), run);
        Ok(true)
    }

    async fn replace(&self, expected: &Run, run: Run) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.runs.get_mut(&expected.id) {
            Some(current) if current == expected && run.id == expected.id => {
                *current = run;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_by_id(&self, id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.inner.read().await.runs.get(id).cloned())
    }

    async fn find_all(&self, request: PageRequest) -> Result<Page<Run>, StoreError> {
        let inner = self.inner.read().await;

        let mut runs: Vec<&Run> = inner
            .order
            .iter()
            .filter_map(|id| inner.runs.get(id))
            .collect();
        if request.sort == Sort::CreatedAtDesc {
            // Stable sort keeps insertion order among equal timestamps.
            runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }

        let content = runs
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .cloned()
            .collect();

        Ok(Page {
            content,
            page: request.page,
            size: request.size,
            total: inner.runs.len(),
        })
    }

    async fn delete_by_id(&self, id: &RunId) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.runs.remove(id).is_none() {
            return Ok(false);
        }
        inner.order.retain(|existing| existing != id);
        Ok(true)
    }

    async fn transition(
        &self,
        id: &RunId,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<Option<Run>, StoreError> {
        let mut inner = self.inner.write().await;
        match inner.runs.get_mut(id) {
            Some(run) if run.status == from => {
                run.status = to;
                run.updated_at = Utc::now();
                Ok(Some(run.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use runhub_core::{Kind, Metadata, SpecDocument, TaskId};

    fn run(id: &str) -> Run {
        let kind = Kind::parse("dbt:transform").unwrap();
        let now = Utc::now();
        Run {
            id: RunId::new(id),
            task_id: TaskId::new("t1"),
            kind: kind.run_kind(),
            task_kind: kind,
            spec: SpecDocument::new(),
            status: RunStatus::Created,
            metadata: Metadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn empty_store_lists_empty_page() {
        let store = InMemoryRunStore::new();
        let page = store.find_all(PageRequest::new(0, 10)).await.unwrap();
        assert!(page.content.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = InMemoryRunStore::new();
        store.save(run("a")).await.unwrap();

        let mut updated = run("a");
        updated.status = RunStatus::Submitted;
        store.save(updated).await.unwrap();

        assert_eq!(store.len().await, 1);
        let found = store.find_by_id(&RunId::new("a")).await.unwrap().unwrap();
        assert_eq!(found.status, RunStatus::Submitted);
    }

    #[tokio::test]
    async fn listing_follows_insertion_order_and_pages() {
        let store = InMemoryRunStore::new();
        for id in ["a", "b", "c", "d", "e"] {
            store.save(run(id)).await.unwrap();
        }
        // Re-saving must not move a run to the back.
        store.save(run("a")).await.unwrap();

        let first = store.find_all(PageRequest::new(0, 2)).await.unwrap();
        let ids: Vec<&str> = first.content.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(first.total, 5);
        assert_eq!(first.total_pages(), 3);

        let last = store.find_all(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(last.content.len(), 1);
        assert_eq!(last.content[0].id.as_str(), "e");

        let beyond = store.find_all(PageRequest::new(9, 2)).await.unwrap();
        assert!(beyond.content.is_empty());
    }

    #[tokio::test]
    async fn listing_by_creation_time_desc() {
        let store = InMemoryRunStore::new();
        let mut older = run("older");
        older.created_at = Utc::now() - Duration::minutes(5);
        store.save(older).await.unwrap();
        store.save(run("newer")).await.unwrap();

        let page = store
            .find_all(PageRequest::new(0, 10).with_sort(Sort::CreatedAtDesc))
            .await
            .unwrap();
        let ids: Vec<&str> = page.content.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newer", "older"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryRunStore::new();
        store.save(run("a")).await.unwrap();

        assert!(store.delete_by_id(&RunId::new("a")).await.unwrap());
        assert!(!store.delete_by_id(&RunId::new("a")).await.unwrap());
        assert!(store.find_by_id(&RunId::new("a")).await.unwrap().is_none());
        assert_eq!(store.find_all(PageRequest::new(0, 10)).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn insert_never_overwrites() {
        let store = InMemoryRunStore::new();
        assert!(store.insert(run("a")).await.unwrap());

        let mut other = run("a");
        other.status = RunStatus::Stopped;
        assert!(!store.insert(other).await.unwrap());

        let found = store.find_by_id(&RunId::new("a")).await.unwrap().unwrap();
        assert_eq!(found.status, RunStatus::Created);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn replace_requires_the_expected_record() {
        let store = InMemoryRunStore::new();
        let original = run("a");
        store.save(original.clone()).await.unwrap();

        let mut first = original.clone();
        first.metadata.name = Some("first".into());
        assert!(store.replace(&original, first.clone()).await.unwrap());

        // A writer still holding the old record loses.
        let mut second = original.clone();
        second.metadata.name = Some("second".into());
        assert!(!store.replace(&original, second).await.unwrap());

        let found = store.find_by_id(&RunId::new("a")).await.unwrap().unwrap();
        assert_eq!(found, first);
        assert!(!store.replace(&run("zz"), run("zz")).await.unwrap());
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let store = InMemoryRunStore::new();
        store.save(run("a")).await.unwrap();
        let id = RunId::new("a");

        let moved = store
            .transition(&id, RunStatus::Created, RunStatus::Submitted)
            .await
            .unwrap();
        assert_eq!(moved.map(|r| r.status), Some(RunStatus::Submitted));

        let stale = store
            .transition(&id, RunStatus::Created, RunStatus::Submitted)
            .await
            .unwrap();
        assert!(stale.is_none());

        let missing = store
            .transition(&RunId::new("zz"), RunStatus::Created, RunStatus::Submitted)
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
