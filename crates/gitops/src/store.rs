//! GitOps configuration kept in two key/value resources.
//!
//! The provider resource (secret kind) holds flat keys `provider.{N}.{field}` whose
//! values are base64 text. The destination resource (configmap kind) holds one
//! base64-encoded JSON [`GitOpsDestination`] per `"{app_id}-{cluster_id}"` key.
//!
//! Every write reads the whole resource, edits it and writes it back. There is no
//! concurrency token, so two admins editing different keys at once can lose one
//! update. A missing resource means GitOps is disabled and is never an error.

use crate::error::{GitOpsError, GitOpsResult, ResourceError};
use crate::traits::{ResourceData, ResourceKind, ResourceStore};
use base64::Engine;
use shipwright_core::config::GitOpsConfig;
use shipwright_core::gitops::destination_key;
use shipwright_core::{GitOpsDestination, GitOpsInfo, GitOpsProvider, ProviderType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const PROVIDER_PREFIX: &str = "provider.";

/// Request to register (or refresh) a provider credential set.
#[derive(Clone, Debug)]
pub struct ProviderRegistration {
    pub provider: ProviderType,
    pub repo_uri: String,
    pub hostname: Option<String>,
    pub private_key: String,
    pub public_key: String,
}

/// GitOps provider and destination store.
#[derive(Clone)]
pub struct GitOpsStore {
    resources: Arc<dyn ResourceStore>,
    secret_name: String,
    configmap_name: String,
}

impl GitOpsStore {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        secret_name: impl Into<String>,
        configmap_name: impl Into<String>,
    ) -> Self {
        Self {
            resources,
            secret_name: secret_name.into(),
            configmap_name: configmap_name.into(),
        }
    }

    pub fn with_config(resources: Arc<dyn ResourceStore>, config: &GitOpsConfig) -> Self {
        Self::new(resources, &config.secret_name, &config.configmap_name)
    }

    /// Backend health.
    pub async fn health_check(&self) -> GitOpsResult<()> {
        Ok(self.resources.health_check().await?)
    }

    /// GitOps is enabled once the provider resource exists.
    pub async fn is_enabled(&self) -> GitOpsResult<bool> {
        Ok(self
            .resources
            .get(ResourceKind::Secret, &self.secret_name)
            .await?
            .is_some())
    }

    /// Register a provider, returning its index.
    ///
    /// A registration whose URI matches an existing entry reuses that index and keeps
    /// its stored keys. Otherwise the next index after the highest one is used.
    pub async fn set_up_gitops_repo(&self, req: &ProviderRegistration) -> GitOpsResult<u32> {
        if req.repo_uri.trim().is_empty() {
            return Err(GitOpsError::Invalid("repo uri must not be empty".to_string()));
        }

        let existing = self
            .resources
            .get(ResourceKind::Secret, &self.secret_name)
            .await?;
        let exists = existing.is_some();
        let mut data = existing.unwrap_or_default();

        let mut matched = None;
        let mut max_index = None;
        for (key, value) in &data {
            let Some(index) = provider_field_index(key, "repoUri") else {
                continue;
            };
            max_index = max_index.max(Some(index));
            if decode_text(key, value)? == req.repo_uri {
                matched = Some(index);
            }
        }

        let index = match matched {
            Some(index) => {
                debug!(index, repo_uri = %req.repo_uri, "reusing gitops provider index");
                index
            }
            None => {
                let index = max_index.map_or(0, |max| max + 1);
                put_text(&mut data, &provider_key(index, "privateKey"), &req.private_key);
                put_text(&mut data, &provider_key(index, "publicKey"), &req.public_key);
                info!(index, repo_uri = %req.repo_uri, "assigned gitops provider index");
                index
            }
        };

        put_text(&mut data, &provider_key(index, "type"), req.provider.as_str());
        put_text(&mut data, &provider_key(index, "repoUri"), &req.repo_uri);

        let hostname_key = provider_key(index, "hostname");
        data.remove(&hostname_key);
        if let Some(hostname) = req.hostname.as_deref().filter(|h| !h.is_empty()) {
            put_text(&mut data, &hostname_key, hostname);
        }

        self.write(ResourceKind::Secret, &self.secret_name, exists, &data)
            .await?;
        Ok(index)
    }

    /// All registered providers, ordered by index.
    pub async fn list_providers(&self) -> GitOpsResult<Vec<GitOpsProvider>> {
        let Some(data) = self
            .resources
            .get(ResourceKind::Secret, &self.secret_name)
            .await?
        else {
            return Ok(Vec::new());
        };

        let mut providers = Vec::new();
        for key in data.keys() {
            if let Some(index) = provider_field_index(key, "repoUri") {
                providers.push(read_provider(&data, index)?);
            }
        }
        providers.sort_by_key(|p| p.index);
        Ok(providers)
    }

    /// Set the delivery destination for one downstream.
    ///
    /// `last_error` is carried over from the existing record only when the repo URI
    /// and branch are unchanged. Any `last_error` on `destination` is ignored.
    pub async fn set_downstream_gitops(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        destination: GitOpsDestination,
    ) -> GitOpsResult<GitOpsDestination> {
        let key = destination_key(app_id, cluster_id);
        let existing = self
            .resources
            .get(ResourceKind::ConfigMap, &self.configmap_name)
            .await?;
        let exists = existing.is_some();
        let mut data = existing.unwrap_or_default();

        let previous = match data.get(&key) {
            Some(value) => decode_destination(&key, value).ok(),
            None => None,
        };

        let carried = previous
            .filter(|prev| prev.same_target(&destination))
            .and_then(|prev| prev.last_error);
        let mut destination = destination;
        destination.last_error = carried;

        data.insert(key, encode_destination(&destination)?);
        self.write(ResourceKind::ConfigMap, &self.configmap_name, exists, &data)
            .await?;
        Ok(destination)
    }

    /// The destination for one downstream, if GitOps is configured for it.
    pub async fn get_downstream_gitops(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> GitOpsResult<Option<GitOpsDestination>> {
        let key = destination_key(app_id, cluster_id);
        let Some(data) = self
            .resources
            .get(ResourceKind::ConfigMap, &self.configmap_name)
            .await?
        else {
            return Ok(None);
        };
        data.get(&key)
            .map(|value| decode_destination(&key, value))
            .transpose()
    }

    /// Record the latest delivery error for one downstream.
    ///
    /// Last writer wins against a concurrent [`Self::set_downstream_gitops`]. Does
    /// nothing when no destination is configured.
    pub async fn set_gitops_error(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
        message: &str,
    ) -> GitOpsResult<bool> {
        let key = destination_key(app_id, cluster_id);
        let Some(mut data) = self
            .resources
            .get(ResourceKind::ConfigMap, &self.configmap_name)
            .await?
        else {
            debug!(%app_id, %cluster_id, "gitops disabled, not recording error");
            return Ok(false);
        };
        let Some(value) = data.get(&key) else {
            debug!(%app_id, %cluster_id, "no gitops destination, not recording error");
            return Ok(false);
        };

        let mut destination = decode_destination(&key, value)?;
        destination.last_error = Some(message.to_string());
        data.insert(key, encode_destination(&destination)?);

        self.write(ResourceKind::ConfigMap, &self.configmap_name, true, &data)
            .await?;
        Ok(true)
    }

    /// Remove the destination for one downstream. Returns whether one existed.
    pub async fn disable_downstream_gitops(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> GitOpsResult<bool> {
        let key = destination_key(app_id, cluster_id);
        let Some(mut data) = self
            .resources
            .get(ResourceKind::ConfigMap, &self.configmap_name)
            .await?
        else {
            return Ok(false);
        };
        if data.remove(&key).is_none() {
            return Ok(false);
        }
        self.write(ResourceKind::ConfigMap, &self.configmap_name, true, &data)
            .await?;
        Ok(true)
    }

    /// Resolve destination and provider credentials for one downstream.
    pub async fn get_gitops_info(
        &self,
        app_id: Uuid,
        cluster_id: Uuid,
    ) -> GitOpsResult<GitOpsInfo> {
        let destination = self
            .get_downstream_gitops(app_id, cluster_id)
            .await?
            .ok_or_else(|| {
                GitOpsError::NotFound(format!(
                    "gitops destination {}",
                    destination_key(app_id, cluster_id)
                ))
            })?;

        let provider = self
            .list_providers()
            .await?
            .into_iter()
            .find(|p| p.repo_uri == destination.repo_uri)
            .ok_or_else(|| {
                GitOpsError::NotFound(format!(
                    "gitops provider for repo {}",
                    destination.repo_uri
                ))
            })?;

        Ok(GitOpsInfo {
            provider: provider.provider,
            hostname: provider.hostname,
            public_key: provider.public_key,
            private_key: provider.private_key,
            destination,
        })
    }

    /// Delete both resources, disabling GitOps everywhere.
    pub async fn reset(&self) -> GitOpsResult<()> {
        let secret = self
            .resources
            .delete(ResourceKind::Secret, &self.secret_name)
            .await?;
        let configmap = self
            .resources
            .delete(ResourceKind::ConfigMap, &self.configmap_name)
            .await?;
        info!(secret, configmap, "reset gitops configuration");
        Ok(())
    }

    /// Create the resource if it was absent when read, else replace it.
    async fn write(
        &self,
        kind: ResourceKind,
        name: &str,
        exists: bool,
        data: &ResourceData,
    ) -> GitOpsResult<()> {
        if exists {
            return Ok(self.resources.update(kind, name, data).await?);
        }
        match self.resources.create(kind, name, data).await {
            // Someone else created it between our read and write; overwrite.
            Err(ResourceError::AlreadyExists(_)) => {
                debug!(%kind, name, "resource appeared concurrently, replacing");
                Ok(self.resources.update(kind, name, data).await?)
            }
            other => Ok(other?),
        }
    }
}

fn provider_key(index: u32, field: &str) -> String {
    format!("{PROVIDER_PREFIX}{index}.{field}")
}

/// Parse `provider.{N}.{field}`, returning `N` when the field matches.
fn provider_field_index(key: &str, field: &str) -> Option<u32> {
    let rest = key.strip_prefix(PROVIDER_PREFIX)?;
    let (index, name) = rest.split_once('.')?;
    if name != field {
        return None;
    }
    index.parse().ok()
}

fn read_provider(data: &BTreeMap<String, String>, index: u32) -> GitOpsResult<GitOpsProvider> {
    let field = |name: &str| -> GitOpsResult<Option<String>> {
        let key = provider_key(index, name);
        data.get(&key).map(|v| decode_text(&key, v)).transpose()
    };

    let provider = match field("type")? {
        Some(t) => t.parse()?,
        None => ProviderType::Other(String::new()),
    };

    Ok(GitOpsProvider {
        index,
        provider,
        repo_uri: field("repoUri")?.unwrap_or_default(),
        hostname: field("hostname")?.filter(|h| !h.is_empty()),
        public_key: field("publicKey")?.unwrap_or_default(),
        private_key: field("privateKey")?.unwrap_or_default(),
    })
}

fn put_text(data: &mut ResourceData, key: &str, value: &str) {
    data.insert(
        key.to_string(),
        base64::engine::general_purpose::STANDARD.encode(value),
    );
}

fn decode_text(key: &str, value: &str) -> GitOpsResult<String> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(value)
        .map_err(|e| GitOpsError::Encoding {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    String::from_utf8(raw).map_err(|e| GitOpsError::Encoding {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn encode_destination(destination: &GitOpsDestination) -> GitOpsResult<String> {
    let json = serde_json::to_vec(destination).map_err(|e| GitOpsError::Encoding {
        key: "destination".to_string(),
        message: e.to_string(),
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn decode_destination(key: &str, value: &str) -> GitOpsResult<GitOpsDestination> {
    let json = decode_text(key, value)?;
    serde_json::from_str(&json).map_err(|e| GitOpsError::Encoding {
        key: key.to_string(),
        message: e.to_string(),
    })
}
