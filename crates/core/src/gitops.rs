//! GitOps provider and destination types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Git hosting provider for a registered repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProviderType {
    Github,
    GithubEnterprise,
    Gitlab,
    Bitbucket,
    /// Any provider without a known clone convention.
    Other(String),
}

impl ProviderType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Github => "github",
            Self::GithubEnterprise => "github_enterprise",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(crate::Error::InvalidProvider("empty provider type".to_string())),
            "github" => Ok(Self::Github),
            "github_enterprise" => Ok(Self::GithubEnterprise),
            "gitlab" => Ok(Self::Gitlab),
            "bitbucket" => Ok(Self::Bitbucket),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

impl Serialize for ProviderType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Key of a destination entry in the destination resource.
pub fn destination_key(app_id: Uuid, cluster_id: Uuid) -> String {
    format!("{app_id}-{cluster_id}")
}

/// Per-(app, cluster) delivery configuration, stored as JSON.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsDestination {
    pub repo_uri: String,
    pub branch: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl GitOpsDestination {
    /// Whether `other` targets the same repository branch.
    pub fn same_target(&self, other: &GitOpsDestination) -> bool {
        self.repo_uri == other.repo_uri && self.branch == other.branch
    }
}

/// One registered provider credential set.
#[derive(Clone, PartialEq, Eq)]
pub struct GitOpsProvider {
    pub index: u32,
    pub provider: ProviderType,
    pub repo_uri: String,
    pub hostname: Option<String>,
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for GitOpsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitOpsProvider")
            .field("index", &self.index)
            .field("provider", &self.provider)
            .field("repo_uri", &self.repo_uri)
            .field("hostname", &self.hostname)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Resolved delivery settings for one downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitOpsInfo {
    pub provider: ProviderType,
    pub hostname: Option<String>,
    pub public_key: String,
    pub private_key: String,
    pub destination: GitOpsDestination,
}

impl GitOpsInfo {
    /// SSH clone URL for the destination repository.
    pub fn clone_uri(&self) -> String {
        clone_uri(&self.destination.repo_uri, &self.provider)
    }
}

/// Rewrite an HTTPS repository URI into an SSH clone URL.
///
/// Providers without a known convention get the URI back unchanged, which usually
/// cannot be pushed to with a deploy key.
pub fn clone_uri(repo_uri: &str, provider: &ProviderType) -> String {
    let Some((host, segments)) = split_repo_uri(repo_uri) else {
        tracing::warn!(repo_uri, "repository uri is not an http(s) url, using as-is");
        return repo_uri.to_string();
    };

    match provider {
        // github and bitbucket use a fixed owner/repo layout
        ProviderType::Github | ProviderType::GithubEnterprise | ProviderType::Bitbucket
            if segments.len() >= 2 =>
        {
            format!("git@{host}:{}/{}.git", segments[0], segments[1])
        }
        // gitlab allows nested groups
        ProviderType::Gitlab if segments.len() >= 2 => {
            format!("git@{host}:{}.git", segments.join("/"))
        }
        ProviderType::Other(name) => {
            tracing::warn!(
                provider = %name,
                repo_uri,
                "no clone convention for provider, pushing may not work"
            );
            repo_uri.to_string()
        }
        _ => {
            tracing::warn!(provider = %provider, repo_uri, "repository uri is missing owner or name");
            repo_uri.to_string()
        }
    }
}

/// Split `https://host/a/b(.git)` into the host and non-empty path segments.
fn split_repo_uri(repo_uri: &str) -> Option<(&str, Vec<&str>)> {
    let rest = repo_uri
        .strip_prefix("https://")
        .or_else(|| repo_uri.strip_prefix("http://"))?;
    let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
    if host.is_empty() {
        return None;
    }

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let segments = path.split('/').filter(|s| !s.is_empty()).collect();
    Some((host, segments))
}
