//! Database models mapping to the metadata schema.

use shipwright_core::{DownstreamStatus, InstallState, effective_status};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Applications
// =============================================================================

/// Application record. Registry credentials live on the same row but are only
/// read through [`RegistryDetailsRow`].
#[derive(Debug, Clone, FromRow)]
pub struct AppRow {
    pub id: Uuid,
    pub name: String,
    pub icon_uri: Option<String>,
    pub slug: String,
    pub upstream_uri: String,
    /// Last promoted midstream sequence.
    pub current_sequence: Option<i64>,
    pub install_state: String,
    pub is_airgap: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl AppRow {
    pub fn install_state(&self) -> shipwright_core::Result<InstallState> {
        self.install_state.parse()
    }
}

/// Rows removed by an application delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppDeleteStats {
    pub midstream_versions: u64,
    pub downstreams: u64,
    pub downstream_versions: u64,
    pub downstream_outputs: u64,
}

// =============================================================================
// Midstream versions
// =============================================================================

/// Rendered app-wide release, keyed by `(app_id, sequence)`.
#[derive(Debug, Clone, Default, FromRow)]
pub struct MidstreamVersionRow {
    pub app_id: Uuid,
    pub sequence: i64,
    pub update_cursor: Option<String>,
    pub channel_name: Option<String>,
    pub version_label: Option<String>,
    pub release_notes: Option<String>,
    pub encryption_key: Option<String>,
    pub supportbundle_spec: Option<String>,
    pub analyzer_spec: Option<String>,
    pub preflight_spec: Option<String>,
    pub app_spec: Option<String>,
    pub kots_app_spec: Option<String>,
    pub kots_installation_spec: Option<String>,
    pub config_spec: Option<String>,
    pub config_values: Option<String>,
    pub backup_spec: Option<String>,
    pub created_at: Option<OffsetDateTime>,
}

// =============================================================================
// Downstreams
// =============================================================================

/// A cluster registered as a delivery target for an application.
#[derive(Debug, Clone, FromRow)]
pub struct DownstreamRow {
    pub app_id: Uuid,
    pub cluster_id: Uuid,
    pub downstream_name: String,
    /// Sequence currently deployed to the cluster.
    pub current_sequence: Option<i64>,
}

/// Fields for a new downstream version. The sequence is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDownstreamVersion {
    pub app_id: Uuid,
    pub cluster_id: Uuid,
    pub parent_sequence: Option<i64>,
    pub status: DownstreamStatus,
    pub status_info: Option<String>,
    pub source: String,
    pub diff_summary: Option<String>,
    pub diff_summary_error: Option<String>,
    pub git_deployable: bool,
    pub created_at: OffsetDateTime,
}

/// A downstream version joined with its midstream label and apply output.
#[derive(Debug, Clone, FromRow)]
pub struct DownstreamVersionRow {
    pub app_id: Uuid,
    pub cluster_id: Uuid,
    pub sequence: i64,
    pub parent_sequence: Option<i64>,
    /// Label of the parent midstream version, if any.
    pub version_label: Option<String>,
    pub status: Option<String>,
    pub status_info: Option<String>,
    pub source: Option<String>,
    pub diff_summary: Option<String>,
    pub diff_summary_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub applied_at: Option<OffsetDateTime>,
    pub preflight_result: Option<String>,
    pub preflight_result_created_at: Option<OffsetDateTime>,
    pub preflight_ignore_permissions: bool,
    pub git_commit_url: Option<String>,
    pub git_deployable: bool,
    /// `is_error` of the apply output row; `None` when the agent has not reported.
    pub has_error: Option<bool>,
}

impl DownstreamVersionRow {
    /// Status shown to users. Computed on every read, never stored.
    pub fn effective_status(&self) -> DownstreamStatus {
        effective_status(self.status.as_deref(), self.has_error)
    }
}

/// Apply agent report for one downstream version.
#[derive(Debug, Clone, FromRow)]
pub struct DownstreamOutputRow {
    pub app_id: Uuid,
    pub cluster_id: Uuid,
    pub downstream_sequence: i64,
    pub dryrun_stdout: Option<String>,
    pub dryrun_stderr: Option<String>,
    pub apply_stdout: Option<String>,
    pub apply_stderr: Option<String>,
    pub is_error: bool,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Task status
// =============================================================================

/// Heartbeat row for a background task.
#[derive(Debug, Clone, FromRow)]
pub struct TaskStatusRow {
    pub id: String,
    pub updated_at: OffsetDateTime,
    pub current_message: Option<String>,
    pub status: Option<String>,
}

// =============================================================================
// Registry credentials
// =============================================================================

/// Registry settings for one application.
///
/// At most one of `password` (legacy plaintext) and `password_enc` is set once the
/// row has been migrated.
#[derive(Clone, Default, FromRow)]
pub struct RegistryDetailsRow {
    pub app_id: Uuid,
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub password_enc: Option<String>,
    pub namespace: Option<String>,
}

impl std::fmt::Debug for RegistryDetailsRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("RegistryDetailsRow")
            .field("app_id", &self.app_id)
            .field("hostname", &self.hostname)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("password_enc", &redact(&self.password_enc))
            .field("namespace", &self.namespace)
            .finish()
    }
}
