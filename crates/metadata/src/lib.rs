//! Relational metadata store for Shipwright.
//!
//! This crate provides the durable data model:
//! - Applications, slugs and install state
//! - Midstream versions and per-cluster downstream versions with sequence allocation
//! - Apply agent output joined into the effective deployment status
//! - Background task heartbeats
//! - Registry credentials

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use store::{MetadataStore, SqliteStore};

use shipwright_core::config::{MetadataConfig, TaskConfig};
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(
    config: &MetadataConfig,
    tasks: &TaskConfig,
) -> MetadataResult<Arc<dyn MetadataStore>> {
    tasks.validate().map_err(MetadataError::Config)?;

    match config {
        MetadataConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs)
                .await?
                .with_task_stale_after(tasks.stale_after());
            Ok(Arc::new(store) as Arc<dyn MetadataStore>)
        }
    }
}
