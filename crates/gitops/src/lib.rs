//! GitOps configuration storage for Shipwright.
//!
//! This crate provides:
//! - A key/value resource abstraction with no transactions
//! - Backends: local filesystem and in-memory
//! - The GitOps store: provider registration, per-downstream destinations, errors

pub mod backends;
pub mod error;
pub mod store;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{GitOpsError, GitOpsResult, ResourceError, ResourceResult};
pub use store::{GitOpsStore, ProviderRegistration};
pub use traits::{ResourceData, ResourceKind, ResourceStore};

use shipwright_core::config::{GitOpsConfig, ResourceConfig};
use std::sync::Arc;

/// Create a resource store from configuration.
pub async fn resources_from_config(
    config: &ResourceConfig,
) -> ResourceResult<Arc<dyn ResourceStore>> {
    match config {
        ResourceConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend))
        }
        ResourceConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Create the GitOps store from configuration.
pub async fn from_config(config: &GitOpsConfig) -> GitOpsResult<GitOpsStore> {
    config.validate().map_err(GitOpsError::Invalid)?;
    let resources = resources_from_config(&config.resources).await?;
    Ok(GitOpsStore::with_config(resources, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = GitOpsConfig {
            resources: ResourceConfig::Filesystem {
                path: temp.path().join("resources"),
            },
            ..Default::default()
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert!(!store.is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn from_config_rejects_bad_name() {
        let config = GitOpsConfig {
            resources: ResourceConfig::Memory,
            secret_name: "Bad Name".to_string(),
            ..Default::default()
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(GitOpsError::Invalid(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
