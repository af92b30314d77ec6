//! Task reads and writes wired through the result cache and change notifier.
//!
//! Reads: cache, then store on miss, then fill. Writes: store, then
//! invalidate every affected key, then broadcast. Both orders are fixed here
//! so handlers cannot get them wrong.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::web::notifier::{ChangeEvent, ChangeNotifier};
use crate::web::result_cache::{CacheKey, Lookup, ResultCache};
use crate::web::task_store::{NewTask, StoreError, Task, TaskPatch, TaskStore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("title required")]
    TitleRequired,
    #[error("not found")]
    NotFound(u64),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => TaskError::NotFound(id),
            other => TaskError::Store(other),
        }
    }
}

/// List query. Only the canonical (unfiltered) shape is cacheable.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub search: Option<String>,
}

impl TaskQuery {
    fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase)
    }

    pub fn cache_key(&self) -> Option<CacheKey> {
        match self.needle() {
            None => Some(CacheKey::TaskList),
            Some(_) => None,
        }
    }
}

pub struct TaskBoard {
    store: Arc<dyn TaskStore>,
    cache: ResultCache<CacheKey, Arc<Vec<Task>>>,
    notifier: Arc<ChangeNotifier>,
    ttl: Duration,
}

impl TaskBoard {
    pub fn new(store: Arc<dyn TaskStore>, notifier: Arc<ChangeNotifier>, ttl: Duration) -> Self {
        Self { store, cache: ResultCache::new(), notifier, ttl }
    }

    pub fn cache(&self) -> &ResultCache<CacheKey, Arc<Vec<Task>>> {
        &self.cache
    }

    pub async fn list(&self, query: &TaskQuery) -> Result<Arc<Vec<Task>>, TaskError> {
        let Some(key) = query.cache_key() else {
            let needle = query.needle().unwrap_or_default();
            tracing::debug!(search = %needle, "filtered task list bypasses cache");
            let rows = self.store.list().await?;
            let rows = rows
                .into_iter()
                .filter(|task| task.title.to_lowercase().contains(&needle))
                .collect();
            return Ok(Arc::new(rows));
        };

        let ticket = match self.cache.lookup(&key) {
            Lookup::Hit(rows) => return Ok(rows),
            Lookup::Miss(ticket) => ticket,
        };
        tracing::debug!("loading task list from store");
        let rows = Arc::new(self.store.list().await?);
        if self.cache.fill(ticket, rows.clone(), self.ttl) {
            tracing::debug!(count = rows.len(), "task list cached");
        }
        Ok(rows)
    }

    pub async fn create(&self, task: NewTask) -> Result<Task, TaskError> {
        let title = task.title.trim().to_string();
        if title.is_empty() {
            return Err(TaskError::TitleRequired);
        }
        let task = NewTask { title, ..task };
        let created = self.store.create(task).await?;
        tracing::info!(task_id = created.id, "task created");
        self.after_write();
        Ok(created)
    }

    pub async fn update(&self, id: u64, mut patch: TaskPatch) -> Result<Task, TaskError> {
        if let Some(title) = patch.title.take() {
            let title = title.trim();
            if title.is_empty() {
                return Err(TaskError::TitleRequired);
            }
            patch.title = Some(title.to_string());
        }
        let updated = self.store.update(id, patch).await?;
        tracing::info!(task_id = id, "task updated");
        self.after_write();
        Ok(updated)
    }

    /// Idempotent: deleting a missing task succeeds without side effects.
    pub async fn delete(&self, id: u64) -> Result<(), TaskError> {
        if self.store.delete(id).await? {
            tracing::info!(task_id = id, "task deleted");
            self.after_write();
        }
        Ok(())
    }

    /// Runs after a committed write, before the response goes out.
    fn after_write(&self) {
        self.cache.invalidate_all(CacheKey::TASK_WRITES);
        self.notifier.broadcast(&ChangeEvent::Update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::result_cache::SlotPhase;
    use crate::web::task_store::{InMemoryTaskStore, TaskPriority, TaskStatus};

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            module: None,
        }
    }

    fn board() -> (TaskBoard, Arc<ChangeNotifier>) {
        let notifier = Arc::new(ChangeNotifier::default());
        let board = TaskBoard::new(
            Arc::new(InMemoryTaskStore::new()),
            notifier.clone(),
            Duration::from_secs(60),
        );
        (board, notifier)
    }

    #[test]
    fn test_only_unfiltered_queries_are_cacheable() {
        assert_eq!(TaskQuery::default().cache_key(), Some(CacheKey::TaskList));
        let blank = TaskQuery { search: Some("  ".to_string()) };
        assert_eq!(blank.cache_key(), Some(CacheKey::TaskList));
        let filtered = TaskQuery { search: Some("milk".to_string()) };
        assert_eq!(filtered.cache_key(), None);
    }

    #[tokio::test]
    async fn test_read_populates_and_write_invalidates() {
        let (board, _) = board();
        board.create(new_task("first")).await.unwrap();
        assert_eq!(board.cache().phase(&CacheKey::TaskList), SlotPhase::Stale);

        assert_eq!(board.list(&TaskQuery::default()).await.unwrap().len(), 1);
        assert_eq!(board.cache().phase(&CacheKey::TaskList), SlotPhase::Fresh);

        board.create(new_task("second")).await.unwrap();
        assert_eq!(board.cache().phase(&CacheKey::TaskList), SlotPhase::Stale);
        assert_eq!(board.list(&TaskQuery::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_filtered_list_bypasses_cache() {
        let (board, _) = board();
        board.create(new_task("Buy milk")).await.unwrap();
        board.create(new_task("Write report")).await.unwrap();
        let query = TaskQuery { search: Some("MILK".to_string()) };
        let rows = board.list(&query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Buy milk");
        assert_eq!(board.cache().phase(&CacheKey::TaskList), SlotPhase::Stale);
    }

    #[tokio::test]
    async fn test_writes_notify_subscribers() {
        let (board, notifier) = board();
        let mut sub = notifier.subscribe();
        let task = board.create(new_task("a")).await.unwrap();
        board
            .update(task.id, TaskPatch { status: Some(TaskStatus::Doing), ..Default::default() })
            .await
            .unwrap();
        board.delete(task.id).await.unwrap();
        for _ in 0..3 {
            assert_eq!(sub.events.recv().await.as_deref(), Some(r#"{"event":"update"}"#));
        }
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_writes_leave_cache_and_subscribers_alone() {
        let (board, notifier) = board();
        board.list(&TaskQuery::default()).await.unwrap();
        let mut sub = notifier.subscribe();

        assert_eq!(board.create(new_task("   ")).await, Err(TaskError::TitleRequired));
        assert_eq!(
            board.update(42, TaskPatch::default()).await,
            Err(TaskError::NotFound(42))
        );
        board.delete(42).await.unwrap();

        assert_eq!(board.cache().phase(&CacheKey::TaskList), SlotPhase::Fresh);
        assert!(sub.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_trims_title() {
        let (board, _) = board();
        let task = board.create(new_task("  padded  ")).await.unwrap();
        assert_eq!(task.title, "padded");
    }
}
