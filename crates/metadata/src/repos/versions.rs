//! Version sequencer repository trait (midstream and downstream).

use crate::error::MetadataResult;
use crate::models::{DownstreamVersionRow, MidstreamVersionRow, NewDownstreamVersion};
use async_trait::async_trait;
use shipwright_core::DownstreamStatus;
use time::OffsetDateTime;
use uuid::Uuid;

/// Attempts at allocating a downstream sequence before giving up on a uniqueness race.
pub const MAX_SEQUENCE_ATTEMPTS: u32 = 5;

/// Repository for midstream and per-cluster downstream versions.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Insert or fully replace the midstream version at `(app_id, sequence)`.
    ///
    /// In the same transaction the application's `current_sequence` moves to this
    /// sequence and its name and icon are taken from the version's Application
    /// document (name falls back to the slug). This is the only way the
    /// application's current sequence advances.
    async fn create_or_replace_midstream_version(
        &self,
        version: &MidstreamVersionRow,
    ) -> MetadataResult<()>;

    async fn get_midstream_version(
        &self,
        app_id: Uuid,
        sequence: i64,
    ) -> MetadataResult<Option<MidstreamVersionRow>>;

    async fn get_latest_midstream_sequence(&self, app_id: Uuid) -> MetadataResult<Option<i64>>;

    /// Insert a downstream version at `1 + max(sequence)` for the pair, or 0.
    ///
    /// Read and insert share one transaction. A concurrent writer that takes the
    /// same sequence trips the primary key, in which case the whole attempt is
    /// rolled back and retried up to [`MAX_SEQUENCE_ATTEMPTS`] times.
    async fn create_downstream_version(&self, version: &NewDownstreamVersion)
    -> MetadataResult<i64>;

    async fn get_downstream_version(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
    ) -> MetadataResult<Option<DownstreamVersionRow>>;

    /// Full history for the pair, newest first.
    async fn list_downstream_versions(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> MetadataResult<Vec<DownstreamVersionRow>>;

    /// Versions below the cluster's current sequence, newest first. Empty when
    /// nothing has been deployed.
    async fn list_past_versions(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> MetadataResult<Vec<DownstreamVersionRow>>;

    /// Versions above the cluster's current sequence, newest first. Everything
    /// when nothing has been deployed.
    async fn list_pending_versions(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> MetadataResult<Vec<DownstreamVersionRow>>;

    /// The version at the cluster's current sequence, if any.
    async fn get_current_version(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> MetadataResult<Option<DownstreamVersionRow>>;

    /// Second most recently applied sequence, or `None` with fewer than two deploys.
    ///
    /// `current_sequence` is accepted for interface stability and not consulted.
    async fn get_previously_deployed_sequence(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        current_sequence: Option<i64>,
    ) -> MetadataResult<Option<i64>>;

    async fn set_downstream_version_status(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
        status: DownstreamStatus,
        status_info: Option<&str>,
    ) -> MetadataResult<()>;

    /// Mark a version deployed and make it the cluster's current sequence.
    ///
    /// Any previous apply output for the version is removed so the effective status
    /// reads `deploying` until the agent reports again.
    async fn mark_downstream_version_deployed(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
        applied_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    async fn set_preflight_result(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
        result: &str,
        ignore_permissions: bool,
        at: OffsetDateTime,
    ) -> MetadataResult<()>;

    async fn set_git_commit_url(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
        url: &str,
    ) -> MetadataResult<()>;
}
