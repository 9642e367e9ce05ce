//! Integration tests for the metadata store.

mod common;

use common::{
    REPLICATED_UPSTREAM, TestMetadata, app_with_downstream, application_spec, downstream_version,
    midstream_version,
};
use shipwright_core::{DownstreamStatus, InstallEvent, InstallState, TaskId, TaskStatus};
use shipwright_metadata::models::DownstreamVersionRow;
use shipwright_metadata::repos::{
    AppRepo, DownstreamRepo, OutputRepo, TaskStatusRepo, VersionRepo,
};
use shipwright_metadata::{MetadataError, MetadataStore};
use shipwright_metadata::models::DownstreamOutputRow;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

async fn effective(
    metadata: &dyn MetadataStore,
    app_id: Uuid,
    cluster_id: Uuid,
    sequence: i64,
) -> DownstreamStatus {
    let version: DownstreamVersionRow = metadata
        .get_downstream_version(app_id, cluster_id, sequence)
        .await
        .unwrap()
        .unwrap();
    version.effective_status()
}

fn output(app_id: Uuid, cluster_id: Uuid, sequence: i64, is_error: bool) -> DownstreamOutputRow {
    DownstreamOutputRow {
        app_id,
        cluster_id,
        downstream_sequence: sequence,
        dryrun_stdout: None,
        dryrun_stderr: None,
        apply_stdout: Some("applied".to_string()),
        apply_stderr: is_error.then(|| "error: rollout failed".to_string()),
        is_error,
        created_at: OffsetDateTime::now_utc(),
    }
}

// =============================================================================
// Applications and install state
// =============================================================================

#[tokio::test]
async fn test_create_app_initial_install_states() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();

    let online = metadata
        .create_app("Online", REPLICATED_UPSTREAM, false, now)
        .await
        .unwrap();
    let airgap = metadata
        .create_app("Airgap", REPLICATED_UPSTREAM, true, now)
        .await
        .unwrap();
    let helm = metadata
        .create_app("Helm", "helm://charts/acme", false, now)
        .await
        .unwrap();

    assert_eq!(
        online.install_state().unwrap(),
        InstallState::OnlineUploadPending
    );
    assert_eq!(
        airgap.install_state().unwrap(),
        InstallState::AirgapUploadPending
    );
    assert_eq!(helm.install_state().unwrap(), InstallState::Installed);
    assert!(online.current_sequence.is_none());
}

#[tokio::test]
async fn test_slug_suffixes() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();

    let mut slugs = Vec::new();
    for _ in 0..3 {
        let app = metadata
            .create_app("My App!", REPLICATED_UPSTREAM, false, now)
            .await
            .unwrap();
        slugs.push(app.slug);
    }
    assert_eq!(slugs, vec!["my-app", "my-app-1", "my-app-2"]);

    let found = metadata.get_app_by_slug("my-app-1").await.unwrap().unwrap();
    assert_eq!(found.name, "My App!");
    assert_eq!(metadata.list_apps().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_create_app_rejects_unsluggable_name() {
    let test = TestMetadata::in_memory().await.unwrap();
    let err = test
        .store()
        .create_app("!!!", REPLICATED_UPSTREAM, false, OffsetDateTime::now_utc())
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::Invalid(_)));
}

#[tokio::test]
async fn test_install_state_transitions() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();
    let app = metadata
        .create_app("app", REPLICATED_UPSTREAM, false, now)
        .await
        .unwrap();

    let state = metadata
        .transition_install_state(app.id, InstallEvent::Begin, now)
        .await
        .unwrap();
    assert_eq!(state, InstallState::OnlineUploadInProgress);

    let state = metadata
        .transition_install_state(app.id, InstallEvent::Fail, now)
        .await
        .unwrap();
    assert_eq!(state, InstallState::OnlineUploadError);

    let state = metadata
        .transition_install_state(app.id, InstallEvent::Begin, now)
        .await
        .unwrap();
    assert_eq!(state, InstallState::OnlineUploadInProgress);

    let state = metadata
        .transition_install_state(app.id, InstallEvent::Succeed, now)
        .await
        .unwrap();
    assert_eq!(state, InstallState::Installed);

    let err = metadata
        .transition_install_state(app.id, InstallEvent::Begin, now)
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_reset_clears_install_task() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();
    let app = metadata
        .create_app("airgapped", REPLICATED_UPSTREAM, true, now)
        .await
        .unwrap();

    metadata
        .set_install_state(app.id, InstallState::AirgapUploadError, now)
        .await
        .unwrap();
    metadata
        .set_task_status(TaskId::AirgapInstall, "failed", "bundle is corrupt", now)
        .await
        .unwrap();
    metadata
        .set_task_status(TaskId::ImageRewrite, "running", "pushing images", now)
        .await
        .unwrap();

    let state = metadata.reset_install_state(app.id, now).await.unwrap();
    assert_eq!(state, InstallState::AirgapUploadInProgress);

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM api_task_status WHERE id = 'airgap-install'")
            .fetch_one(test.pool())
            .await
            .unwrap();
    assert_eq!(count, 0);

    let other = metadata
        .get_task_status(TaskId::ImageRewrite, now)
        .await
        .unwrap();
    assert_eq!(other.status, "running");

    let stored = metadata.get_app(app.id).await.unwrap().unwrap();
    assert_eq!(
        stored.install_state().unwrap(),
        InstallState::AirgapUploadInProgress
    );
}

#[tokio::test]
async fn test_reset_only_from_error() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();
    let app = metadata
        .create_app("app", REPLICATED_UPSTREAM, false, now)
        .await
        .unwrap();

    let err = metadata.reset_install_state(app.id, now).await.unwrap_err();
    assert!(matches!(err, MetadataError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_delete_app_cascades() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "doomed").await;

    metadata
        .create_or_replace_midstream_version(&midstream_version(app.id, 0, "1.0.0"))
        .await
        .unwrap();
    let seq = metadata
        .create_downstream_version(&downstream_version(app.id, cluster, Some(0)))
        .await
        .unwrap();
    metadata
        .record_apply_output(&output(app.id, cluster, seq, false))
        .await
        .unwrap();

    let stats = metadata.delete_app(app.id).await.unwrap();
    assert_eq!(stats.midstream_versions, 1);
    assert_eq!(stats.downstreams, 1);
    assert_eq!(stats.downstream_versions, 1);
    assert_eq!(stats.downstream_outputs, 1);

    assert!(metadata.get_app(app.id).await.unwrap().is_none());
    assert!(metadata.list_downstreams(app.id).await.unwrap().is_empty());

    let err = metadata.delete_app(app.id).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

// =============================================================================
// Version sequencing
// =============================================================================

#[tokio::test]
async fn test_midstream_upsert_sets_current_sequence_and_title() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, _) = app_with_downstream(metadata.as_ref(), "acme").await;

    let mut version = midstream_version(app.id, 0, "1.0.0");
    version.kots_app_spec = Some(application_spec("Acme Platform", "https://acme.io/icon.png"));
    metadata
        .create_or_replace_midstream_version(&version)
        .await
        .unwrap();

    let stored = metadata.get_app(app.id).await.unwrap().unwrap();
    assert_eq!(stored.current_sequence, Some(0));
    assert_eq!(stored.name, "Acme Platform");
    assert_eq!(stored.icon_uri.as_deref(), Some("https://acme.io/icon.png"));

    // Replacing the same sequence keeps one row and takes the new label.
    metadata
        .create_or_replace_midstream_version(&midstream_version(app.id, 0, "1.0.1"))
        .await
        .unwrap();
    let replaced = metadata
        .get_midstream_version(app.id, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.version_label.as_deref(), Some("1.0.1"));
    assert_eq!(
        metadata.get_latest_midstream_sequence(app.id).await.unwrap(),
        Some(0)
    );

    // Without an application document the name falls back to the slug.
    let stored = metadata.get_app(app.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "acme");
}

#[tokio::test]
async fn test_midstream_upsert_with_unreadable_application_uses_slug() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, _) = app_with_downstream(metadata.as_ref(), "acme").await;

    let mut version = midstream_version(app.id, 3, "2.0.0");
    version.kots_app_spec = Some(
        "apiVersion: kots.io/v1beta1\nkind: Application\nspec: [not, a, mapping]\n".to_string(),
    );
    metadata
        .create_or_replace_midstream_version(&version)
        .await
        .unwrap();

    let stored = metadata.get_app(app.id).await.unwrap().unwrap();
    assert_eq!(stored.current_sequence, Some(3));
    assert_eq!(stored.name, "acme");
    assert!(stored.icon_uri.is_none());

    let row = metadata.get_midstream_version(app.id, 3).await.unwrap().unwrap();
    assert_eq!(row.kots_app_spec, version.kots_app_spec);
}

#[tokio::test]
async fn test_downstream_sequences_start_at_zero_per_cluster() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, c1) = app_with_downstream(metadata.as_ref(), "app").await;
    let c2 = Uuid::new_v4();
    metadata.add_downstream(app.id, c2, "other").await.unwrap();

    let a = metadata
        .create_downstream_version(&downstream_version(app.id, c1, None))
        .await
        .unwrap();
    let b = metadata
        .create_downstream_version(&downstream_version(app.id, c1, None))
        .await
        .unwrap();
    let c = metadata
        .create_downstream_version(&downstream_version(app.id, c2, None))
        .await
        .unwrap();

    assert_eq!((a, b, c), (0, 1, 0));
}

#[tokio::test]
async fn test_concurrent_downstream_versions_across_workers_get_distinct_sequences() {
    let test = TestMetadata::new().await.unwrap();
    let first = test.store();
    let second = test.open_another().await.unwrap();
    let (app, cluster) = app_with_downstream(first.as_ref(), "app").await;
    let app_id = app.id;

    let mut handles = Vec::new();
    for i in 0..40 {
        let metadata = if i % 2 == 0 {
            Arc::clone(&first)
        } else {
            Arc::clone(&second)
        };
        handles.push(tokio::spawn(async move {
            metadata
                .create_downstream_version(&downstream_version(app_id, cluster, None))
                .await
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        let sequence = handle.await.unwrap().unwrap();
        sequences.push(sequence);
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (0..40).collect::<Vec<i64>>());

    let history = second.list_downstream_versions(app_id, cluster).await.unwrap();
    assert_eq!(history.len(), 40);
}

#[tokio::test]
async fn test_downstream_version_requires_downstream() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, _) = app_with_downstream(metadata.as_ref(), "app").await;

    let err = metadata
        .create_downstream_version(&downstream_version(app.id, Uuid::new_v4(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_add_downstream_twice_conflicts() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;

    let err = metadata
        .add_downstream(app.id, cluster, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_past_and_pending_partition() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;

    for seq in 0..5 {
        metadata
            .create_or_replace_midstream_version(&midstream_version(
                app.id,
                seq,
                &format!("1.{seq}.0"),
            ))
            .await
            .unwrap();
        metadata
            .create_downstream_version(&downstream_version(app.id, cluster, Some(seq)))
            .await
            .unwrap();
    }

    // Before anything is deployed every version is pending.
    assert!(metadata.get_current_version(app.id, cluster).await.unwrap().is_none());
    assert!(metadata.list_past_versions(app.id, cluster).await.unwrap().is_empty());
    assert_eq!(
        metadata
            .list_pending_versions(app.id, cluster)
            .await
            .unwrap()
            .len(),
        5
    );

    metadata
        .mark_downstream_version_deployed(app.id, cluster, 3, OffsetDateTime::now_utc())
        .await
        .unwrap();

    let current = metadata
        .get_current_version(app.id, cluster)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.sequence, 3);
    assert_eq!(current.version_label.as_deref(), Some("1.3.0"));

    let past: Vec<i64> = metadata
        .list_past_versions(app.id, cluster)
        .await
        .unwrap()
        .iter()
        .map(|v| v.sequence)
        .collect();
    let pending: Vec<i64> = metadata
        .list_pending_versions(app.id, cluster)
        .await
        .unwrap()
        .iter()
        .map(|v| v.sequence)
        .collect();
    assert_eq!(past, vec![2, 1, 0]);
    assert_eq!(pending, vec![4]);

    let all = metadata
        .list_downstream_versions(app.id, cluster)
        .await
        .unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(all[0].sequence, 4);
}

#[tokio::test]
async fn test_previously_deployed_sequence() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;
    for _ in 0..3 {
        metadata
            .create_downstream_version(&downstream_version(app.id, cluster, None))
            .await
            .unwrap();
    }

    let t0 = OffsetDateTime::now_utc() - Duration::minutes(10);
    assert_eq!(
        metadata
            .get_previously_deployed_sequence(app.id, cluster, None)
            .await
            .unwrap(),
        None
    );

    metadata
        .mark_downstream_version_deployed(app.id, cluster, 0, t0)
        .await
        .unwrap();
    assert_eq!(
        metadata
            .get_previously_deployed_sequence(app.id, cluster, Some(0))
            .await
            .unwrap(),
        None
    );

    metadata
        .mark_downstream_version_deployed(app.id, cluster, 2, t0 + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(
        metadata
            .get_previously_deployed_sequence(app.id, cluster, Some(2))
            .await
            .unwrap(),
        Some(0)
    );

    // Rolling back to 1 makes 2 the previous deploy.
    metadata
        .mark_downstream_version_deployed(app.id, cluster, 1, t0 + Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(
        metadata
            .get_previously_deployed_sequence(app.id, cluster, Some(1))
            .await
            .unwrap(),
        Some(2)
    );
}

// =============================================================================
// Status projection
// =============================================================================

#[tokio::test]
async fn test_effective_status_follows_apply_output() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;
    let seq = metadata
        .create_downstream_version(&downstream_version(app.id, cluster, None))
        .await
        .unwrap();


    assert_eq!(effective(metadata.as_ref(), app.id, cluster, seq).await, DownstreamStatus::Pending);

    metadata
        .mark_downstream_version_deployed(app.id, cluster, seq, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(effective(metadata.as_ref(), app.id, cluster, seq).await, DownstreamStatus::Deploying);

    metadata
        .record_apply_output(&output(app.id, cluster, seq, false))
        .await
        .unwrap();
    assert_eq!(effective(metadata.as_ref(), app.id, cluster, seq).await, DownstreamStatus::Deployed);

    metadata
        .record_apply_output(&output(app.id, cluster, seq, true))
        .await
        .unwrap();
    assert_eq!(effective(metadata.as_ref(), app.id, cluster, seq).await, DownstreamStatus::Failed);

    // The stored status is never rewritten by the projection.
    let raw: Option<String> = sqlx::query_scalar(
        "SELECT status FROM app_downstream_version WHERE app_id = ? AND cluster_id = ? AND sequence = ?",
    )
    .bind(app.id)
    .bind(cluster)
    .bind(seq)
    .fetch_one(test.pool())
    .await
    .unwrap();
    assert_eq!(raw.as_deref(), Some("deployed"));

    // Redeploying clears the old report.
    metadata
        .mark_downstream_version_deployed(app.id, cluster, seq, OffsetDateTime::now_utc())
        .await
        .unwrap();
    assert_eq!(effective(metadata.as_ref(), app.id, cluster, seq).await, DownstreamStatus::Deploying);
    assert!(
        metadata
            .get_apply_output(app.id, cluster, seq)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_apply_output_for_missing_version_is_rejected() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;

    let err = metadata
        .record_apply_output(&output(app.id, cluster, 7, false))
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_version_status_preflight_and_commit_url() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let (app, cluster) = app_with_downstream(metadata.as_ref(), "app").await;
    let seq = metadata
        .create_downstream_version(&downstream_version(app.id, cluster, None))
        .await
        .unwrap();
    let now = OffsetDateTime::now_utc();

    metadata
        .set_downstream_version_status(
            app.id,
            cluster,
            seq,
            DownstreamStatus::PendingPreflight,
            Some("waiting on preflight checks"),
        )
        .await
        .unwrap();
    metadata
        .set_preflight_result(app.id, cluster, seq, r#"{"results":[]}"#, true, now)
        .await
        .unwrap();
    metadata
        .set_git_commit_url(app.id, cluster, seq, "https://github.com/acme/deploys/commit/abc")
        .await
        .unwrap();

    let version = metadata
        .get_downstream_version(app.id, cluster, seq)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(version.effective_status(), DownstreamStatus::PendingPreflight);
    assert_eq!(
        version.status_info.as_deref(),
        Some("waiting on preflight checks")
    );
    assert!(version.preflight_ignore_permissions);
    assert!(version.preflight_result_created_at.is_some());
    assert!(version.git_commit_url.is_some());

    let err = metadata
        .set_git_commit_url(app.id, cluster, seq + 1, "https://example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

// =============================================================================
// Task liveness
// =============================================================================

#[tokio::test]
async fn test_task_status_goes_stale() {
    let test = TestMetadata::in_memory().await.unwrap();
    let metadata = test.store();
    let written = OffsetDateTime::now_utc();

    metadata
        .set_task_status(TaskId::UpdateDownload, "running", "fetching release", written)
        .await
        .unwrap();

    let fresh = metadata
        .get_task_status(TaskId::UpdateDownload, written + Duration::seconds(5))
        .await
        .unwrap();
    assert_eq!(fresh.status, "running");
    assert_eq!(fresh.current_message, "fetching release");

    let stale = metadata
        .get_task_status(TaskId::UpdateDownload, written + Duration::seconds(11))
        .await
        .unwrap();
    assert_eq!(stale, TaskStatus::default());

    // A new heartbeat revives it.
    let later = written + Duration::seconds(20);
    metadata
        .set_task_status(TaskId::UpdateDownload, "running", "extracting", later)
        .await
        .unwrap();
    let revived = metadata
        .get_task_status(TaskId::UpdateDownload, later)
        .await
        .unwrap();
    assert_eq!(revived.current_message, "extracting");

    metadata
        .clear_task_status(TaskId::UpdateDownload)
        .await
        .unwrap();
    assert!(
        metadata
            .get_task_status(TaskId::UpdateDownload, later)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_task_staleness_window_is_configurable() {
    let temp = tempfile::tempdir().unwrap();
    let store = shipwright_metadata::SqliteStore::new(temp.path().join("meta.db"), None)
        .await
        .unwrap()
        .with_task_stale_after(Duration::seconds(60));
    let written = OffsetDateTime::now_utc();

    store
        .set_task_status(TaskId::ImageRewrite, "running", "pushing", written)
        .await
        .unwrap();
    let status = store
        .get_task_status(TaskId::ImageRewrite, written + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(status.status, "running");
}
