//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use mediarun_core::{CoreError, TaskId, TaskRecord};
use mediarun_engine::Runner;

/// Maximum page size for task listings.
const MAX_PAGE_SIZE: usize = 10;

/// Shared application state.
///
/// The task store is the persistence boundary: the engine never calls
/// it, and swapping in a relational backend stays behind these three
/// methods.
pub struct AppState {
    /// Finished task records indexed by TaskId.
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,

    /// The streaming execution engine.
    pub runner: Runner,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: RwLock::new(HashMap::new()),
            runner: Runner::new(),
        })
    }

    /// Store a finished task's metadata. Rejects records without any
    /// log content.
    pub async fn save_task(&self, record: TaskRecord) -> Result<TaskRecord, CoreError> {
        if record.full_log.is_empty() {
            return Err(CoreError::EmptyLog);
        }
        let mut tasks = self.tasks.write().await;
        tasks.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    /// Fetch one task record by id.
    pub async fn get_task(&self, task_id: &TaskId) -> Result<TaskRecord, CoreError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .cloned()
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))
    }

    /// List task records, oldest first, with pagination. The page size
    /// is clamped to [`MAX_PAGE_SIZE`].
    pub async fn list_tasks(&self, offset: usize, limit: usize) -> Vec<TaskRecord> {
        let tasks = self.tasks.read().await;
        let mut records: Vec<TaskRecord> = tasks.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
            .into_iter()
            .skip(offset)
            .take(limit.min(MAX_PAGE_SIZE))
            .collect()
    }
}
