//! Local filesystem resource backend.
//!
//! Each resource is one JSON object at `<root>/<kind>/<name>.json`.

use crate::error::{ResourceError, ResourceResult};
use crate::traits::{ResourceData, ResourceKind, ResourceStore, validate_name};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Resources stored as JSON files under a root directory.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the kind directories.
    pub async fn new(root: impl AsRef<Path>) -> ResourceResult<Self> {
        let root = root.as_ref().to_path_buf();
        for kind in [ResourceKind::Secret, ResourceKind::ConfigMap] {
            fs::create_dir_all(root.join(kind.as_str())).await?;
        }
        Ok(Self { root })
    }

    fn resource_path(&self, kind: ResourceKind, name: &str) -> ResourceResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(kind.as_str()).join(format!("{name}.json")))
    }

    async fn read(&self, path: &Path, name: &str) -> ResourceResult<Option<ResourceData>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ResourceError::Io(e)),
        };
        let data = serde_json::from_slice(&raw).map_err(|e| ResourceError::Corrupt {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(data))
    }

    /// Write through a uniquely named temp file, fsync, then rename over the target.
    async fn write(&self, path: &Path, data: &ResourceData) -> ResourceResult<()> {
        let body = serde_json::to_vec_pretty(data).map_err(|e| ResourceError::Corrupt {
            name: path.display().to_string(),
            message: e.to_string(),
        })?;

        let temp_path = path.with_extension(format!("json.tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(ResourceError::Io(e));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, kind: ResourceKind, name: &str) -> ResourceResult<Option<ResourceData>> {
        let path = self.resource_path(kind, name)?;
        self.read(&path, name).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", keys = data.len()))]
    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        data: &ResourceData,
    ) -> ResourceResult<()> {
        let path = self.resource_path(kind, name)?;
        // Check-then-write: two concurrent creators can both succeed and the last
        // rename wins.
        if fs::try_exists(&path).await? {
            return Err(ResourceError::AlreadyExists(format!("{kind}/{name}")));
        }
        self.write(&path, data).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", keys = data.len()))]
    async fn update(
        &self,
        kind: ResourceKind,
        name: &str,
        data: &ResourceData,
    ) -> ResourceResult<()> {
        let path = self.resource_path(kind, name)?;
        if !fs::try_exists(&path).await? {
            return Err(ResourceError::NotFound(format!("{kind}/{name}")));
        }
        self.write(&path, data).await
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, kind: ResourceKind, name: &str) -> ResourceResult<bool> {
        let path = self.resource_path(kind, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ResourceError::Io(e)),
        }
    }

    async fn health_check(&self) -> ResourceResult<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ResourceError::Io(std::io::Error::other(format!(
                "resource root is not a directory: {}",
                self.root.display()
            ))));
        }
        Ok(())
    }
}
