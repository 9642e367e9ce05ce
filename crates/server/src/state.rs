//! Application state shared across handlers.

use crate::registry::RegistryService;
use shipwright_core::config::AppConfig;
use shipwright_crypto::Cipher;
use shipwright_gitops::GitOpsStore;
use shipwright_metadata::MetadataStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// GitOps provider and destination store.
    pub gitops: GitOpsStore,
    /// Registry credentials, encrypted at rest when a key is configured.
    pub registry: RegistryService,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: AppConfig,
        metadata: Arc<dyn MetadataStore>,
        gitops: GitOpsStore,
        cipher: Option<Arc<dyn Cipher>>,
    ) -> Self {
        if cipher.is_none() {
            tracing::warn!(
                "no encryption key configured, registry passwords are stored in plaintext"
            );
        }

        let registry = RegistryService::new(metadata.clone(), cipher);
        Self {
            config: Arc::new(config),
            metadata,
            gitops,
            registry,
        }
    }
}
