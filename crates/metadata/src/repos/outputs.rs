//! Apply output repository trait.

use crate::error::MetadataResult;
use crate::models::DownstreamOutputRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for apply agent reports.
#[async_trait]
pub trait OutputRepo: Send + Sync {
    /// Insert or replace the report for a downstream version.
    /// Fails with `NotFound` if the version does not exist.
    async fn record_apply_output(&self, output: &DownstreamOutputRow) -> MetadataResult<()>;

    async fn get_apply_output(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
    ) -> MetadataResult<Option<DownstreamOutputRow>>;
}
