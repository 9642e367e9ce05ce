//! In-process resource backend.

use crate::error::{ResourceError, ResourceResult};
use crate::traits::{ResourceData, ResourceKind, ResourceStore, validate_name};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resources held in memory. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    resources: RwLock<HashMap<(ResourceKind, String), ResourceData>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryBackend {
    async fn get(&self, kind: ResourceKind, name: &str) -> ResourceResult<Option<ResourceData>> {
        validate_name(name)?;
        let resources = self.resources.read().await;
        Ok(resources.get(&(kind, name.to_string())).cloned())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        data: &ResourceData,
    ) -> ResourceResult<()> {
        validate_name(name)?;
        let mut resources = self.resources.write().await;
        let key = (kind, name.to_string());
        if resources.contains_key(&key) {
            return Err(ResourceError::AlreadyExists(format!("{kind}/{name}")));
        }
        resources.insert(key, data.clone());
        Ok(())
    }

    async fn update(
        &self,
        kind: ResourceKind,
        name: &str,
        data: &ResourceData,
    ) -> ResourceResult<()> {
        validate_name(name)?;
        let mut resources = self.resources.write().await;
        match resources.get_mut(&(kind, name.to_string())) {
            Some(existing) => {
                *existing = data.clone();
                Ok(())
            }
            None => Err(ResourceError::NotFound(format!("{kind}/{name}"))),
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> ResourceResult<bool> {
        validate_name(name)?;
        let mut resources = self.resources.write().await;
        Ok(resources.remove(&(kind, name.to_string())).is_some())
    }

    async fn health_check(&self) -> ResourceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_lifecycle() {
        let backend = MemoryBackend::new();
        let mut data = ResourceData::new();
        data.insert("k".to_string(), "v".to_string());

        backend
            .create(ResourceKind::ConfigMap, "gitops", &data)
            .await
            .unwrap();
        assert!(matches!(
            backend.create(ResourceKind::ConfigMap, "gitops", &data).await,
            Err(ResourceError::AlreadyExists(_))
        ));
        assert_eq!(
            backend
                .get(ResourceKind::ConfigMap, "gitops")
                .await
                .unwrap(),
            Some(data)
        );
        assert!(
            backend
                .delete(ResourceKind::ConfigMap, "gitops")
                .await
                .unwrap()
        );
        assert!(matches!(
            backend
                .update(ResourceKind::ConfigMap, "gitops", &ResourceData::new())
                .await,
            Err(ResourceError::NotFound(_))
        ));
    }
}
