//! Task persistence behind a pluggable trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub module: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub module: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "double_option")]
    pub module: Option<Option<String>>,
}

/// Distinguishes an absent `module` from an explicit `null`.
fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(u64),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn list(&self) -> Result<Vec<Task>, StoreError>;
    async fn create(&self, task: NewTask) -> Result<Task, StoreError>;
    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task, StoreError>;
    /// Returns whether a row was removed.
    async fn delete(&self, id: u64) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct TaskTable {
    rows: BTreeMap<u64, Task>,
    last_id: u64,
}

/// Process-local task table, ordered by id.
#[derive(Default)]
pub struct InMemoryTaskStore {
    table: RwLock<TaskTable>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn create(&self, task: NewTask) -> Result<Task, StoreError> {
        let mut table = self.table.write().await;
        table.last_id += 1;
        let row = Task {
            id: table.last_id,
            title: task.title,
            status: task.status,
            priority: task.priority,
            module: task.module,
            created_at: chrono::Utc::now().timestamp(),
        };
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: u64, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut table = self.table.write().await;
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = patch.title {
            row.title = title;
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(priority) = patch.priority {
            row.priority = priority;
        }
        if let Some(module) = patch.module {
            row.module = module;
        }
        Ok(row.clone())
    }

    async fn delete(&self, id: u64) -> Result<bool, StoreError> {
        Ok(self.table.write().await.rows.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            module: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryTaskStore::new();
        let a = store.create(new_task("a")).await.unwrap();
        let b = store.create(new_task("b")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(a.status, TaskStatus::Todo);
        assert_eq!(a.priority, TaskPriority::Medium);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let store = InMemoryTaskStore::new();
        let a = store.create(new_task("a")).await.unwrap();
        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        let b = store.create(new_task("b")).await.unwrap();
        assert_eq!(b.id, 2);
    }

    #[tokio::test]
    async fn test_update_applies_only_given_fields() {
        let store = InMemoryTaskStore::new();
        let mut task = new_task("a");
        task.module = Some("core".to_string());
        let a = store.create(task).await.unwrap();
        let patch = TaskPatch { status: Some(TaskStatus::Done), ..Default::default() };
        let updated = store.update(a.id, patch).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, "a");
        assert_eq!(updated.module.as_deref(), Some("core"));
        assert_eq!(store.update(99, TaskPatch::default()).await, Err(StoreError::NotFound(99)));
    }

    #[test]
    fn test_patch_distinguishes_null_module() {
        let cleared: TaskPatch = serde_json::from_str(r#"{"module":null}"#).unwrap();
        assert_eq!(cleared.module, Some(None));
        let untouched: TaskPatch = serde_json::from_str(r#"{"title":"x","id":5}"#).unwrap();
        assert_eq!(untouched.module, None);
    }
}
