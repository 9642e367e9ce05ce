//! Test fixtures.

use shipwright_core::DownstreamStatus;
use shipwright_metadata::MetadataStore;
use shipwright_metadata::models::{AppRow, MidstreamVersionRow, NewDownstreamVersion};
use shipwright_metadata::repos::{AppRepo, DownstreamRepo};
use time::OffsetDateTime;
use uuid::Uuid;

/// Upstream URI for an app installed from the vendor portal.
#[allow(dead_code)]
pub const REPLICATED_UPSTREAM: &str = "replicated://acme-app";

/// Create an online app with one registered downstream.
#[allow(dead_code)]
pub async fn app_with_downstream(metadata: &dyn MetadataStore, name: &str) -> (AppRow, Uuid) {
    let app = metadata
        .create_app(name, REPLICATED_UPSTREAM, false, OffsetDateTime::now_utc())
        .await
        .expect("Failed to create app");
    let cluster_id = Uuid::new_v4();
    metadata
        .add_downstream(app.id, cluster_id, "this-cluster")
        .await
        .expect("Failed to add downstream");
    (app, cluster_id)
}

/// Midstream version with only a label set.
#[allow(dead_code)]
pub fn midstream_version(app_id: Uuid, sequence: i64, label: &str) -> MidstreamVersionRow {
    MidstreamVersionRow {
        app_id,
        sequence,
        version_label: Some(label.to_string()),
        channel_name: Some("Stable".to_string()),
        created_at: Some(OffsetDateTime::now_utc()),
        ..Default::default()
    }
}

/// Pending downstream version pointing at `parent_sequence`.
#[allow(dead_code)]
pub fn downstream_version(
    app_id: Uuid,
    cluster_id: Uuid,
    parent_sequence: Option<i64>,
) -> NewDownstreamVersion {
    NewDownstreamVersion {
        app_id,
        cluster_id,
        parent_sequence,
        status: DownstreamStatus::Pending,
        status_info: None,
        source: "Upstream Update".to_string(),
        diff_summary: None,
        diff_summary_error: None,
        git_deployable: false,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Application spec document with a title and icon.
#[allow(dead_code)]
pub fn application_spec(title: &str, icon: &str) -> String {
    format!(
        "apiVersion: kots.io/v1beta1\nkind: Application\nmetadata:\n  name: app\nspec:\n  title: {title}\n  icon: {icon}\n"
    )
}
