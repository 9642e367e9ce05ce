//! Metadata store trait and implementations.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AppRepo, DownstreamRepo, OutputRepo, RegistryRepo, TaskStatusRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    AppRepo + DownstreamRepo + VersionRepo + OutputRepo + TaskStatusRepo + RegistryRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    task_stale_after: time::Duration,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // One connection serializes writers; SQLite allows only one at a time anyway.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            task_stale_after: time::Duration::seconds(
                shipwright_core::task::DEFAULT_STALE_AFTER_SECS as i64,
            ),
        };
        store.migrate().await?;

        if let Some(secs) = query_timeout_secs {
            tracing::debug!(
                query_timeout_secs = secs,
                "SQLite query timeout is advisory only"
            );
        }

        Ok(store)
    }

    /// Override the window after which task status rows read as empty.
    pub fn with_task_stale_after(mut self, stale_after: time::Duration) -> Self {
        self.task_stale_after = stale_after;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Open a transaction that takes the write lock up front.
    ///
    /// A deferred `BEGIN` that reads before writing cannot upgrade its lock once
    /// another process has committed, and fails with `SQLITE_BUSY_SNAPSHOT`
    /// instead of waiting on the busy timeout.
    async fn begin_write(&self) -> MetadataResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use crate::repos::MAX_SEQUENCE_ATTEMPTS;
    use shipwright_core::slug::{slugify, unique_slug};
    use shipwright_core::task::is_stale;
    use shipwright_core::{
        DownstreamStatus, InstallEvent, InstallState, ReleaseDocument, TaskId, TaskStatus,
    };
    use time::OffsetDateTime;
    use tracing::{info, warn};
    use uuid::Uuid;

    const MAX_SLUG_ATTEMPTS: u32 = 5;

    /// Downstream versions joined with the parent label and apply output.
    const DOWNSTREAM_VERSION_SELECT: &str = r#"
        SELECT adv.app_id, adv.cluster_id, adv.sequence, adv.parent_sequence,
               av.version_label, adv.status, adv.status_info, adv.source,
               adv.diff_summary, adv.diff_summary_error, adv.created_at, adv.applied_at,
               adv.preflight_result, adv.preflight_result_created_at,
               adv.preflight_ignore_permissions, adv.git_commit_url, adv.git_deployable,
               ado.is_error AS has_error
        FROM app_downstream_version adv
        LEFT JOIN app_version av
            ON av.app_id = adv.app_id AND av.sequence = adv.parent_sequence
        LEFT JOIN app_downstream_output ado
            ON ado.app_id = adv.app_id
            AND ado.cluster_id = adv.cluster_id
            AND ado.downstream_sequence = adv.sequence
        WHERE adv.app_id = ? AND adv.cluster_id = ?
    "#;

    impl SqliteStore {
        /// One allocation attempt: read the max sequence and insert the next one.
        async fn try_create_downstream_version(
            &self,
            version: &NewDownstreamVersion,
        ) -> MetadataResult<i64> {
            let mut tx = self.begin_write().await?;

            let downstream_exists: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM app_downstream WHERE app_id = ? AND cluster_id = ?",
            )
            .bind(version.app_id)
            .bind(version.cluster_id)
            .fetch_optional(&mut *tx)
            .await?;
            if downstream_exists.is_none() {
                return Err(MetadataError::NotFound(format!(
                    "downstream {} for app {}",
                    version.cluster_id, version.app_id
                )));
            }

            let max: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(sequence) FROM app_downstream_version WHERE app_id = ? AND cluster_id = ?",
            )
            .bind(version.app_id)
            .bind(version.cluster_id)
            .fetch_one(&mut *tx)
            .await?;
            let next = max.map_or(0, |m| m + 1);

            sqlx::query(
                r#"
                INSERT INTO app_downstream_version (
                    app_id, cluster_id, sequence, parent_sequence, created_at, status,
                    status_info, source, diff_summary, diff_summary_error, git_deployable
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(version.app_id)
            .bind(version.cluster_id)
            .bind(next)
            .bind(version.parent_sequence)
            .bind(version.created_at)
            .bind(version.status.as_str())
            .bind(&version.status_info)
            .bind(&version.source)
            .bind(&version.diff_summary)
            .bind(&version.diff_summary_error)
            .bind(version.git_deployable)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(next)
        }

        /// The cluster's current sequence; `NotFound` if the downstream is absent.
        async fn downstream_current_sequence(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Option<i64>> {
            let row: Option<Option<i64>> = sqlx::query_scalar(
                "SELECT current_sequence FROM app_downstream WHERE app_id = ? AND cluster_id = ?",
            )
            .bind(app_id)
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or_else(|| {
                MetadataError::NotFound(format!("downstream {cluster_id} for app {app_id}"))
            })
        }

        async fn select_downstream_versions(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            filter: &str,
            sequence: Option<i64>,
        ) -> MetadataResult<Vec<DownstreamVersionRow>> {
            let sql = format!("{DOWNSTREAM_VERSION_SELECT} {filter} ORDER BY adv.sequence DESC");
            let mut query = sqlx::query_as::<_, DownstreamVersionRow>(&sql)
                .bind(app_id)
                .bind(cluster_id);
            if let Some(sequence) = sequence {
                query = query.bind(sequence);
            }
            Ok(query.fetch_all(&self.pool).await?)
        }
    }

    fn ensure_version_updated(
        rows_affected: u64,
        app_id: Uuid,
        cluster_id: Uuid,
        sequence: i64,
    ) -> MetadataResult<()> {
        if rows_affected == 0 {
            return Err(MetadataError::NotFound(format!(
                "downstream version {sequence} for app {app_id} cluster {cluster_id}"
            )));
        }
        Ok(())
    }

    #[async_trait]
    impl AppRepo for SqliteStore {
        async fn create_app(
            &self,
            name: &str,
            upstream_uri: &str,
            is_airgap: bool,
            now: OffsetDateTime,
        ) -> MetadataResult<AppRow> {
            let base = slugify(name)?;
            let install_state = InstallState::initial(upstream_uri, is_airgap);

            for attempt in 1..=MAX_SLUG_ATTEMPTS {
                let mut tx = self.begin_write().await?;

                let taken: Vec<String> =
                    sqlx::query_scalar("SELECT slug FROM app WHERE slug = ? OR slug LIKE ?")
                        .bind(&base)
                        .bind(format!("{base}-%"))
                        .fetch_all(&mut *tx)
                        .await?;
                let slug = unique_slug(&base, &taken);

                let app = AppRow {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    icon_uri: None,
                    slug,
                    upstream_uri: upstream_uri.to_string(),
                    current_sequence: None,
                    install_state: install_state.as_str().to_string(),
                    is_airgap,
                    created_at: now,
                    updated_at: now,
                };

                let inserted = sqlx::query(
                    r#"
                    INSERT INTO app (id, name, icon_uri, slug, upstream_uri, current_sequence,
                                     install_state, is_airgap, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(app.id)
                .bind(&app.name)
                .bind(&app.icon_uri)
                .bind(&app.slug)
                .bind(&app.upstream_uri)
                .bind(app.current_sequence)
                .bind(&app.install_state)
                .bind(app.is_airgap)
                .bind(app.created_at)
                .bind(app.updated_at)
                .execute(&mut *tx)
                .await;

                match inserted {
                    Ok(_) => {
                        tx.commit().await?;
                        if app.slug != base {
                            info!(app_id = %app.id, slug = %app.slug, "slug taken, using suffixed slug");
                        }
                        info!(app_id = %app.id, install_state = %install_state, "created app");
                        return Ok(app);
                    }
                    Err(e) if MetadataError::is_unique_violation(&e) => {
                        warn!(attempt, slug = %app.slug, "slug claimed concurrently, retrying");
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            Err(MetadataError::Constraint(format!(
                "could not allocate a unique slug for '{base}' after {MAX_SLUG_ATTEMPTS} attempts"
            )))
        }

        async fn get_app(&self, app_id: Uuid) -> MetadataResult<Option<AppRow>> {
            let row = sqlx::query_as::<_, AppRow>(&format!("{APP_SELECT} WHERE id = ?"))
                .bind(app_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_app_by_slug(&self, slug: &str) -> MetadataResult<Option<AppRow>> {
            let row = sqlx::query_as::<_, AppRow>(&format!("{APP_SELECT} WHERE slug = ?"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_apps(&self) -> MetadataResult<Vec<AppRow>> {
            let rows =
                sqlx::query_as::<_, AppRow>(&format!("{APP_SELECT} ORDER BY created_at, slug"))
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }

        async fn set_install_state(
            &self,
            app_id: Uuid,
            state: InstallState,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result =
                sqlx::query("UPDATE app SET install_state = ?, updated_at = ? WHERE id = ?")
                    .bind(state.as_str())
                    .bind(now)
                    .bind(app_id)
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("app {app_id}")));
            }
            Ok(())
        }

        async fn transition_install_state(
            &self,
            app_id: Uuid,
            event: InstallEvent,
            now: OffsetDateTime,
        ) -> MetadataResult<InstallState> {
            let mut tx = self.begin_write().await?;

            let stored: Option<String> =
                sqlx::query_scalar("SELECT install_state FROM app WHERE id = ?")
                    .bind(app_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let current: InstallState = stored
                .ok_or_else(|| MetadataError::NotFound(format!("app {app_id}")))?
                .parse()?;
            let next = current.transition(event)?;

            sqlx::query("UPDATE app SET install_state = ?, updated_at = ? WHERE id = ?")
                .bind(next.as_str())
                .bind(now)
                .bind(app_id)
                .execute(&mut *tx)
                .await?;

            if event == InstallEvent::Reset
                && let Some(mode) = current.mode()
            {
                let task_id = mode.task_id();
                let cleared = sqlx::query("DELETE FROM api_task_status WHERE id = ?")
                    .bind(task_id.as_str())
                    .execute(&mut *tx)
                    .await?;
                info!(
                    %app_id,
                    task_id = %task_id,
                    cleared = cleared.rows_affected(),
                    "reset install state, cleared task status"
                );
            }

            tx.commit().await?;
            Ok(next)
        }

        async fn delete_app(&self, app_id: Uuid) -> MetadataResult<AppDeleteStats> {
            let mut tx = self.begin_write().await?;

            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM app WHERE id = ?")
                .bind(app_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(format!("app {app_id}")));
            }

            let downstream_outputs = sqlx::query("DELETE FROM app_downstream_output WHERE app_id = ?")
                .bind(app_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let downstream_versions =
                sqlx::query("DELETE FROM app_downstream_version WHERE app_id = ?")
                    .bind(app_id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
            let downstreams = sqlx::query("DELETE FROM app_downstream WHERE app_id = ?")
                .bind(app_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            let midstream_versions = sqlx::query("DELETE FROM app_version WHERE app_id = ?")
                .bind(app_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            sqlx::query("DELETE FROM app WHERE id = ?")
                .bind(app_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            let stats = AppDeleteStats {
                midstream_versions,
                downstreams,
                downstream_versions,
                downstream_outputs,
            };
            info!(%app_id, ?stats, "deleted app");
            Ok(stats)
        }
    }

    #[async_trait]
    impl DownstreamRepo for SqliteStore {
        async fn add_downstream(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            name: &str,
        ) -> MetadataResult<DownstreamRow> {
            if self.get_app(app_id).await?.is_none() {
                return Err(MetadataError::NotFound(format!("app {app_id}")));
            }

            let inserted = sqlx::query(
                "INSERT INTO app_downstream (app_id, cluster_id, downstream_name, current_sequence) VALUES (?, ?, ?, NULL)",
            )
            .bind(app_id)
            .bind(cluster_id)
            .bind(name)
            .execute(&self.pool)
            .await;

            match inserted {
                Ok(_) => Ok(DownstreamRow {
                    app_id,
                    cluster_id,
                    downstream_name: name.to_string(),
                    current_sequence: None,
                }),
                Err(e) if MetadataError::is_unique_violation(&e) => Err(
                    MetadataError::AlreadyExists(format!("downstream {cluster_id} for app {app_id}")),
                ),
                Err(e) => Err(e.into()),
            }
        }

        async fn get_downstream(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Option<DownstreamRow>> {
            let row = sqlx::query_as::<_, DownstreamRow>(
                "SELECT app_id, cluster_id, downstream_name, current_sequence FROM app_downstream WHERE app_id = ? AND cluster_id = ?",
            )
            .bind(app_id)
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_downstreams(&self, app_id: Uuid) -> MetadataResult<Vec<DownstreamRow>> {
            let rows = sqlx::query_as::<_, DownstreamRow>(
                "SELECT app_id, cluster_id, downstream_name, current_sequence FROM app_downstream WHERE app_id = ? ORDER BY downstream_name",
            )
            .bind(app_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn create_or_replace_midstream_version(
            &self,
            version: &MidstreamVersionRow,
        ) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            let slug: Option<String> = sqlx::query_scalar("SELECT slug FROM app WHERE id = ?")
                .bind(version.app_id)
                .fetch_optional(&mut *tx)
                .await?;
            let slug = slug.ok_or_else(|| MetadataError::NotFound(format!("app {}", version.app_id)))?;

            let created_at = version.created_at.unwrap_or_else(OffsetDateTime::now_utc);
            sqlx::query(
                r#"
                INSERT INTO app_version (
                    app_id, sequence, update_cursor, channel_name, version_label, release_notes,
                    encryption_key, supportbundle_spec, analyzer_spec, preflight_spec, app_spec,
                    kots_app_spec, kots_installation_spec, config_spec, config_values, backup_spec,
                    created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(app_id, sequence) DO UPDATE SET
                    update_cursor = excluded.update_cursor,
                    channel_name = excluded.channel_name,
                    version_label = excluded.version_label,
                    release_notes = excluded.release_notes,
                    encryption_key = excluded.encryption_key,
                    supportbundle_spec = excluded.supportbundle_spec,
                    analyzer_spec = excluded.analyzer_spec,
                    preflight_spec = excluded.preflight_spec,
                    app_spec = excluded.app_spec,
                    kots_app_spec = excluded.kots_app_spec,
                    kots_installation_spec = excluded.kots_installation_spec,
                    config_spec = excluded.config_spec,
                    config_values = excluded.config_values,
                    backup_spec = excluded.backup_spec,
                    created_at = excluded.created_at
                "#,
            )
            .bind(version.app_id)
            .bind(version.sequence)
            .bind(&version.update_cursor)
            .bind(&version.channel_name)
            .bind(&version.version_label)
            .bind(&version.release_notes)
            .bind(&version.encryption_key)
            .bind(&version.supportbundle_spec)
            .bind(&version.analyzer_spec)
            .bind(&version.preflight_spec)
            .bind(&version.app_spec)
            .bind(&version.kots_app_spec)
            .bind(&version.kots_installation_spec)
            .bind(&version.config_spec)
            .bind(&version.config_values)
            .bind(&version.backup_spec)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;

            let document = ReleaseDocument::parse_optional(version.kots_app_spec.as_deref());
            if let Some(ReleaseDocument::Unknown { kind, reason, .. }) = &document {
                warn!(
                    app_id = %version.app_id,
                    sequence = version.sequence,
                    kind = kind.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "application document not readable, app name falls back to slug"
                );
            }
            let application = document.as_ref().and_then(ReleaseDocument::as_application);
            let name = application
                .and_then(|a| a.title.clone())
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(slug);
            let icon_uri = application.and_then(|a| a.icon.clone());

            sqlx::query(
                "UPDATE app SET current_sequence = ?, name = ?, icon_uri = ?, updated_at = ? WHERE id = ?",
            )
            .bind(version.sequence)
            .bind(&name)
            .bind(&icon_uri)
            .bind(OffsetDateTime::now_utc())
            .bind(version.app_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_midstream_version(
            &self,
            app_id: Uuid,
            sequence: i64,
        ) -> MetadataResult<Option<MidstreamVersionRow>> {
            let row = sqlx::query_as::<_, MidstreamVersionRow>(
                "SELECT * FROM app_version WHERE app_id = ? AND sequence = ?",
            )
            .bind(app_id)
            .bind(sequence)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_latest_midstream_sequence(&self, app_id: Uuid) -> MetadataResult<Option<i64>> {
            let max: Option<i64> =
                sqlx::query_scalar("SELECT MAX(sequence) FROM app_version WHERE app_id = ?")
                    .bind(app_id)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(max)
        }

        async fn create_downstream_version(
            &self,
            version: &NewDownstreamVersion,
        ) -> MetadataResult<i64> {
            for attempt in 1..=MAX_SEQUENCE_ATTEMPTS {
                match self.try_create_downstream_version(version).await {
                    Ok(sequence) => return Ok(sequence),
                    Err(MetadataError::Database(e)) if MetadataError::is_write_conflict(&e) => {
                        warn!(
                            attempt,
                            app_id = %version.app_id,
                            cluster_id = %version.cluster_id,
                            error = %e,
                            "downstream sequence contended by a concurrent writer, retrying"
                        );
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(MetadataError::Constraint(format!(
                "could not allocate a downstream sequence for app {} cluster {} after {MAX_SEQUENCE_ATTEMPTS} attempts",
                version.app_id, version.cluster_id
            )))
        }

        async fn get_downstream_version(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
        ) -> MetadataResult<Option<DownstreamVersionRow>> {
            let mut rows = self
                .select_downstream_versions(app_id, cluster_id, "AND adv.sequence = ?", Some(sequence))
                .await?;
            Ok(rows.pop())
        }

        async fn list_downstream_versions(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Vec<DownstreamVersionRow>> {
            self.select_downstream_versions(app_id, cluster_id, "", None)
                .await
        }

        async fn list_past_versions(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Vec<DownstreamVersionRow>> {
            match self.downstream_current_sequence(app_id, cluster_id).await? {
                Some(current) => {
                    self.select_downstream_versions(
                        app_id,
                        cluster_id,
                        "AND adv.sequence < ?",
                        Some(current),
                    )
                    .await
                }
                None => Ok(Vec::new()),
            }
        }

        async fn list_pending_versions(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Vec<DownstreamVersionRow>> {
            match self.downstream_current_sequence(app_id, cluster_id).await? {
                Some(current) => {
                    self.select_downstream_versions(
                        app_id,
                        cluster_id,
                        "AND adv.sequence > ?",
                        Some(current),
                    )
                    .await
                }
                None => self.list_downstream_versions(app_id, cluster_id).await,
            }
        }

        async fn get_current_version(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
        ) -> MetadataResult<Option<DownstreamVersionRow>> {
            match self.downstream_current_sequence(app_id, cluster_id).await? {
                Some(current) => {
                    self.get_downstream_version(app_id, cluster_id, current)
                        .await
                }
                None => Ok(None),
            }
        }

        async fn get_previously_deployed_sequence(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            _current_sequence: Option<i64>,
        ) -> MetadataResult<Option<i64>> {
            let sequence: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT sequence FROM app_downstream_version
                WHERE app_id = ? AND cluster_id = ? AND applied_at IS NOT NULL
                ORDER BY applied_at DESC, sequence DESC
                LIMIT 1 OFFSET 1
                "#,
            )
            .bind(app_id)
            .bind(cluster_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(sequence)
        }

        async fn set_downstream_version_status(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
            status: DownstreamStatus,
            status_info: Option<&str>,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE app_downstream_version SET status = ?, status_info = ? WHERE app_id = ? AND cluster_id = ? AND sequence = ?",
            )
            .bind(status.as_str())
            .bind(status_info)
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .execute(&self.pool)
            .await?;
            ensure_version_updated(result.rows_affected(), app_id, cluster_id, sequence)
        }

        async fn mark_downstream_version_deployed(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
            applied_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            let updated = sqlx::query(
                "UPDATE app_downstream_version SET status = ?, applied_at = ? WHERE app_id = ? AND cluster_id = ? AND sequence = ?",
            )
            .bind(DownstreamStatus::Deployed.as_str())
            .bind(applied_at)
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .execute(&mut *tx)
            .await?;
            ensure_version_updated(updated.rows_affected(), app_id, cluster_id, sequence)?;

            sqlx::query(
                "UPDATE app_downstream SET current_sequence = ? WHERE app_id = ? AND cluster_id = ?",
            )
            .bind(sequence)
            .bind(app_id)
            .bind(cluster_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "DELETE FROM app_downstream_output WHERE app_id = ? AND cluster_id = ? AND downstream_sequence = ?",
            )
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn set_preflight_result(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
            result: &str,
            ignore_permissions: bool,
            at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let updated = sqlx::query(
                r#"
                UPDATE app_downstream_version
                SET preflight_result = ?, preflight_result_created_at = ?, preflight_ignore_permissions = ?
                WHERE app_id = ? AND cluster_id = ? AND sequence = ?
                "#,
            )
            .bind(result)
            .bind(at)
            .bind(ignore_permissions)
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .execute(&self.pool)
            .await?;
            ensure_version_updated(updated.rows_affected(), app_id, cluster_id, sequence)
        }

        async fn set_git_commit_url(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
            url: &str,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE app_downstream_version SET git_commit_url = ? WHERE app_id = ? AND cluster_id = ? AND sequence = ?",
            )
            .bind(url)
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .execute(&self.pool)
            .await?;
            ensure_version_updated(result.rows_affected(), app_id, cluster_id, sequence)
        }
    }

    #[async_trait]
    impl OutputRepo for SqliteStore {
        async fn record_apply_output(&self, output: &DownstreamOutputRow) -> MetadataResult<()> {
            let mut tx = self.begin_write().await?;

            let exists: Option<i64> = sqlx::query_scalar(
                "SELECT 1 FROM app_downstream_version WHERE app_id = ? AND cluster_id = ? AND sequence = ?",
            )
            .bind(output.app_id)
            .bind(output.cluster_id)
            .bind(output.downstream_sequence)
            .fetch_optional(&mut *tx)
            .await?;
            if exists.is_none() {
                return Err(MetadataError::NotFound(format!(
                    "downstream version {} for app {} cluster {}",
                    output.downstream_sequence, output.app_id, output.cluster_id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO app_downstream_output (
                    app_id, cluster_id, downstream_sequence, dryrun_stdout, dryrun_stderr,
                    apply_stdout, apply_stderr, is_error, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(app_id, cluster_id, downstream_sequence) DO UPDATE SET
                    dryrun_stdout = excluded.dryrun_stdout,
                    dryrun_stderr = excluded.dryrun_stderr,
                    apply_stdout = excluded.apply_stdout,
                    apply_stderr = excluded.apply_stderr,
                    is_error = excluded.is_error,
                    created_at = excluded.created_at
                "#,
            )
            .bind(output.app_id)
            .bind(output.cluster_id)
            .bind(output.downstream_sequence)
            .bind(&output.dryrun_stdout)
            .bind(&output.dryrun_stderr)
            .bind(&output.apply_stdout)
            .bind(&output.apply_stderr)
            .bind(output.is_error)
            .bind(output.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn get_apply_output(
            &self,
            app_id: Uuid,
            cluster_id: Uuid,
            sequence: i64,
        ) -> MetadataResult<Option<DownstreamOutputRow>> {
            let row = sqlx::query_as::<_, DownstreamOutputRow>(
                "SELECT * FROM app_downstream_output WHERE app_id = ? AND cluster_id = ? AND downstream_sequence = ?",
            )
            .bind(app_id)
            .bind(cluster_id)
            .bind(sequence)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl TaskStatusRepo for SqliteStore {
        async fn set_task_status(
            &self,
            task_id: TaskId,
            status: &str,
            message: &str,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO api_task_status (id, updated_at, current_message, status)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    current_message = excluded.current_message,
                    status = excluded.status
                "#,
            )
            .bind(task_id.as_str())
            .bind(updated_at)
            .bind(message)
            .bind(status)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_task_status(
            &self,
            task_id: TaskId,
            now: OffsetDateTime,
        ) -> MetadataResult<TaskStatus> {
            let row = sqlx::query_as::<_, TaskStatusRow>(
                "SELECT id, updated_at, current_message, status FROM api_task_status WHERE id = ?",
            )
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

            let Some(row) = row else {
                return Ok(TaskStatus::default());
            };
            if is_stale(row.updated_at, now, self.task_stale_after) {
                return Ok(TaskStatus::default());
            }
            Ok(TaskStatus {
                status: row.status.unwrap_or_default(),
                current_message: row.current_message.unwrap_or_default(),
            })
        }

        async fn clear_task_status(&self, task_id: TaskId) -> MetadataResult<()> {
            sqlx::query("DELETE FROM api_task_status WHERE id = ?")
                .bind(task_id.as_str())
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl RegistryRepo for SqliteStore {
        async fn get_registry_details(
            &self,
            app_id: Uuid,
        ) -> MetadataResult<Option<RegistryDetailsRow>> {
            let row = sqlx::query_as::<_, RegistryDetailsRow>(
                r#"
                SELECT id AS app_id, registry_hostname AS hostname, registry_username AS username,
                       registry_password AS password, registry_password_enc AS password_enc, namespace
                FROM app WHERE id = ?
                "#,
            )
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn update_registry_details(
            &self,
            app_id: Uuid,
            hostname: &str,
            username: &str,
            password: Option<&str>,
            password_enc: Option<&str>,
            namespace: &str,
        ) -> MetadataResult<()> {
            // Never persist both columns.
            let password = if password_enc.is_some() { None } else { password };
            let result = sqlx::query(
                r#"
                UPDATE app
                SET registry_hostname = ?, registry_username = ?, registry_password = ?,
                    registry_password_enc = ?, namespace = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(hostname)
            .bind(username)
            .bind(password)
            .bind(password_enc)
            .bind(namespace)
            .bind(OffsetDateTime::now_utc())
            .bind(app_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("app {app_id}")));
            }
            Ok(())
        }

        async fn set_encrypted_password(
            &self,
            app_id: Uuid,
            ciphertext: &str,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE app SET registry_password_enc = ?, registry_password = NULL WHERE id = ?",
            )
            .bind(ciphertext)
            .bind(app_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("app {app_id}")));
            }
            Ok(())
        }
    }

    const APP_SELECT: &str = r#"
        SELECT id, name, icon_uri, slug, upstream_uri, current_sequence, install_state,
               is_airgap, created_at, updated_at
        FROM app
    "#;
}

const SCHEMA_SQL: &str = r#"
-- Applications, with registry credentials inline
CREATE TABLE IF NOT EXISTS app (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    icon_uri TEXT,
    slug TEXT NOT NULL UNIQUE,
    upstream_uri TEXT NOT NULL,
    current_sequence INTEGER,
    install_state TEXT NOT NULL,
    is_airgap INTEGER NOT NULL DEFAULT 0,
    registry_hostname TEXT,
    registry_username TEXT,
    registry_password TEXT,
    registry_password_enc TEXT,
    namespace TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Midstream versions: one row per (app, sequence), replaced on resubmission
CREATE TABLE IF NOT EXISTS app_version (
    app_id BLOB NOT NULL REFERENCES app(id) ON DELETE CASCADE,
    sequence INTEGER NOT NULL,
    update_cursor TEXT,
    channel_name TEXT,
    version_label TEXT,
    release_notes TEXT,
    encryption_key TEXT,
    supportbundle_spec TEXT,
    analyzer_spec TEXT,
    preflight_spec TEXT,
    app_spec TEXT,
    kots_app_spec TEXT,
    kots_installation_spec TEXT,
    config_spec TEXT,
    config_values TEXT,
    backup_spec TEXT,
    created_at TEXT,
    PRIMARY KEY (app_id, sequence)
);

-- Delivery targets
CREATE TABLE IF NOT EXISTS app_downstream (
    app_id BLOB NOT NULL REFERENCES app(id) ON DELETE CASCADE,
    cluster_id BLOB NOT NULL,
    downstream_name TEXT NOT NULL,
    current_sequence INTEGER,
    PRIMARY KEY (app_id, cluster_id)
);

-- Downstream versions. The primary key rejects a second writer that computed the
-- same next sequence.
CREATE TABLE IF NOT EXISTS app_downstream_version (
    app_id BLOB NOT NULL,
    cluster_id BLOB NOT NULL,
    sequence INTEGER NOT NULL,
    parent_sequence INTEGER,
    created_at TEXT NOT NULL,
    applied_at TEXT,
    status TEXT,
    status_info TEXT,
    source TEXT,
    diff_summary TEXT,
    diff_summary_error TEXT,
    preflight_result TEXT,
    preflight_result_created_at TEXT,
    preflight_ignore_permissions INTEGER NOT NULL DEFAULT 0,
    git_commit_url TEXT,
    git_deployable INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (app_id, cluster_id, sequence),
    FOREIGN KEY (app_id, cluster_id) REFERENCES app_downstream(app_id, cluster_id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_app_downstream_version_applied
    ON app_downstream_version(app_id, cluster_id, applied_at);

-- Apply agent reports
CREATE TABLE IF NOT EXISTS app_downstream_output (
    app_id BLOB NOT NULL,
    cluster_id BLOB NOT NULL,
    downstream_sequence INTEGER NOT NULL,
    dryrun_stdout TEXT,
    dryrun_stderr TEXT,
    apply_stdout TEXT,
    apply_stderr TEXT,
    is_error INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (app_id, cluster_id, downstream_sequence),
    FOREIGN KEY (app_id, cluster_id, downstream_sequence)
        REFERENCES app_downstream_version(app_id, cluster_id, sequence) ON DELETE CASCADE
);

-- Background task heartbeats
CREATE TABLE IF NOT EXISTS api_task_status (
    id TEXT PRIMARY KEY,
    updated_at TEXT NOT NULL,
    current_message TEXT,
    status TEXT
);
"#;
