//! Application repository trait.

use crate::error::MetadataResult;
use crate::models::{AppDeleteStats, AppRow};
use async_trait::async_trait;
use shipwright_core::{InstallEvent, InstallState};
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for applications and their install state.
#[async_trait]
pub trait AppRepo: Send + Sync {
    /// Create an application with a unique slug derived from `name`.
    ///
    /// A taken slug gets the first free numeric suffix. The initial install state
    /// comes from the upstream URI scheme and `is_airgap`.
    async fn create_app(
        &self,
        name: &str,
        upstream_uri: &str,
        is_airgap: bool,
        now: OffsetDateTime,
    ) -> MetadataResult<AppRow>;

    async fn get_app(&self, app_id: Uuid) -> MetadataResult<Option<AppRow>>;

    async fn get_app_by_slug(&self, slug: &str) -> MetadataResult<Option<AppRow>>;

    /// All applications ordered by creation time.
    async fn list_apps(&self) -> MetadataResult<Vec<AppRow>>;

    /// Overwrite the install state without checking transitions.
    async fn set_install_state(
        &self,
        app_id: Uuid,
        state: InstallState,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Apply a caller-driven install event and return the new state.
    ///
    /// `Reset` also deletes the install task's status row in the same transaction.
    async fn transition_install_state(
        &self,
        app_id: Uuid,
        event: InstallEvent,
        now: OffsetDateTime,
    ) -> MetadataResult<InstallState>;

    /// Return an errored upload to in-progress, clearing stale task progress.
    async fn reset_install_state(
        &self,
        app_id: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<InstallState> {
        self.transition_install_state(app_id, InstallEvent::Reset, now)
            .await
    }

    /// Delete an application and every child row atomically.
    async fn delete_app(&self, app_id: Uuid) -> MetadataResult<AppDeleteStats>;
}
