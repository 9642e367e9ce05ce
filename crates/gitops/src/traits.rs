//! Key/value resource trait definitions.

use crate::error::ResourceResult;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

/// Flat string map held by one resource.
pub type ResourceData = BTreeMap<String, String>;

/// Kind of externally-owned resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Secret-like: values are base64-encoded bytes.
    Secret,
    /// ConfigMap-like: values are base64-encoded JSON documents.
    ConfigMap,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::ConfigMap => "configmap",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store of named key/value resources.
///
/// There are no transactions: callers read a whole resource, modify it, and write the
/// whole resource back. Two writers doing so concurrently can lose one update.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read a resource. Returns `None` if it does not exist.
    async fn get(&self, kind: ResourceKind, name: &str) -> ResourceResult<Option<ResourceData>>;

    /// Create a resource. Fails with `AlreadyExists` if it exists.
    async fn create(&self, kind: ResourceKind, name: &str, data: &ResourceData)
    -> ResourceResult<()>;

    /// Replace the contents of an existing resource. Fails with `NotFound` if absent.
    async fn update(&self, kind: ResourceKind, name: &str, data: &ResourceData)
    -> ResourceResult<()>;

    /// Delete a resource. Returns whether it existed.
    async fn delete(&self, kind: ResourceKind, name: &str) -> ResourceResult<bool>;

    /// Check backend health and connectivity.
    async fn health_check(&self) -> ResourceResult<()>;
}

/// Validate a resource name: lowercase DNS subdomain characters only.
pub fn validate_name(name: &str) -> ResourceResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 253
        && !name.starts_with('.')
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if valid && !name.contains("..") {
        Ok(())
    } else {
        Err(crate::error::ResourceError::InvalidName(name.to_string()))
    }
}
