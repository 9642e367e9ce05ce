//! Task status repository trait.

use crate::error::MetadataResult;
use async_trait::async_trait;
use shipwright_core::{TaskId, TaskStatus};
use time::OffsetDateTime;

/// Repository for background task heartbeats.
#[async_trait]
pub trait TaskStatusRepo: Send + Sync {
    /// Upsert the status row for `task_id`.
    async fn set_task_status(
        &self,
        task_id: TaskId,
        status: &str,
        message: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Current status, or the empty sentinel when absent or stale at `now`.
    async fn get_task_status(
        &self,
        task_id: TaskId,
        now: OffsetDateTime,
    ) -> MetadataResult<TaskStatus>;

    async fn clear_task_status(&self, task_id: TaskId) -> MetadataResult<()>;
}
