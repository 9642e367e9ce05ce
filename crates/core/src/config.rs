//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default name of both GitOps resources.
pub const DEFAULT_GITOPS_RESOURCE_NAME: &str = "kotsadm-gitops";

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8800").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8800".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path (":memory:" for an in-memory database).
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes (advisory only)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Backend holding the GitOps key/value resources.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceConfig {
    /// One JSON document per resource under a directory.
    Filesystem {
        /// Root directory for resources.
        path: PathBuf,
    },
    /// Process-local resources, lost on restart.
    Memory,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/resources"),
        }
    }
}

/// GitOps configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitOpsConfig {
    /// Where the provider and destination resources live.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Name of the secret resource holding provider credentials.
    #[serde(default = "default_gitops_resource_name")]
    pub secret_name: String,
    /// Name of the configmap resource holding per-downstream destinations.
    #[serde(default = "default_gitops_resource_name")]
    pub configmap_name: String,
}

fn default_gitops_resource_name() -> String {
    DEFAULT_GITOPS_RESOURCE_NAME.to_string()
}

impl Default for GitOpsConfig {
    fn default() -> Self {
        Self {
            resources: ResourceConfig::default(),
            secret_name: default_gitops_resource_name(),
            configmap_name: default_gitops_resource_name(),
        }
    }
}

impl GitOpsConfig {
    /// Validate GitOps configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        for (field, name) in [
            ("secret_name", &self.secret_name),
            ("configmap_name", &self.configmap_name),
        ] {
            let valid = !name.is_empty()
                && name.len() <= 253
                && name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
            if !valid {
                return Err(format!(
                    "gitops.{field} must be a lowercase DNS subdomain name, got '{name}'"
                ));
            }
        }
        Ok(())
    }
}

/// Encryption configuration for credentials at rest.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Base64-encoded 32-byte key. When absent, registry passwords stay in plaintext.
    /// WARNING: Prefer SHIPWRIGHT_CRYPTO__ENCRYPTION_KEY env var over storing in config.
    #[serde(default)]
    pub encryption_key: Option<String>,
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Background task heartbeat configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task status rows older than this many seconds read as empty (default: 10).
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    crate::task::DEFAULT_STALE_AFTER_SECS
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl TaskConfig {
    /// Get the staleness window as a Duration.
    pub fn stale_after(&self) -> time::Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.stale_after_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stale_after_secs == 0 {
            return Err("tasks.stale_after_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// GitOps resource configuration.
    #[serde(default)]
    pub gitops: GitOpsConfig,
    /// Credential encryption configuration.
    #[serde(default)]
    pub crypto: CryptoConfig,
    /// Background task heartbeat configuration.
    #[serde(default)]
    pub tasks: TaskConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses in-memory SQLite and in-memory GitOps resources.
    pub fn for_testing() -> Self {
        Self {
            metadata: MetadataConfig::Sqlite {
                path: PathBuf::from(":memory:"),
                query_timeout_secs: None,
            },
            gitops: GitOpsConfig {
                resources: ResourceConfig::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.gitops.validate()?;
        self.tasks.validate()?;
        Ok(())
    }
}
