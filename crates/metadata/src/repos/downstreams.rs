//! Downstream (delivery target) repository trait.

use crate::error::MetadataResult;
use crate::models::DownstreamRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for the clusters an application is delivered to.
#[async_trait]
pub trait DownstreamRepo: Send + Sync {
    /// Register a cluster for an application. Fails with `AlreadyExists` on a repeat.
    async fn add_downstream(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        name: &str,
    ) -> MetadataResult<DownstreamRow>;

    async fn get_downstream(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> MetadataResult<Option<DownstreamRow>>;

    async fn list_downstreams(&self, app_id: Uuid) -> MetadataResult<Vec<DownstreamRow>>;
}
