//! Downstream deployment status and the effective-status projection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a downstream version.
///
/// Serialized as its plain string. Deserializing only accepts known statuses;
/// [`DownstreamStatus::Other`] is produced when reading rows, never from input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DownstreamStatus {
    Pending,
    PendingClusterManagement,
    PendingConfig,
    PendingPreflight,
    PendingDownload,
    Deploying,
    Deployed,
    Failed,
    Unknown,
    /// A stored status this build does not recognise, kept verbatim.
    Other(String),
}

impl DownstreamStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::PendingClusterManagement => "pending_cluster_management",
            Self::PendingConfig => "pending_config",
            Self::PendingPreflight => "pending_preflight",
            Self::PendingDownload => "pending_download",
            Self::Deploying => "deploying",
            Self::Deployed => "deployed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
            Self::Other(status) => status,
        }
    }
}

impl fmt::Display for DownstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownstreamStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "pending_cluster_management" => Ok(Self::PendingClusterManagement),
            "pending_config" => Ok(Self::PendingConfig),
            "pending_preflight" => Ok(Self::PendingPreflight),
            "pending_download" => Ok(Self::PendingDownload),
            "deploying" => Ok(Self::Deploying),
            "deployed" => Ok(Self::Deployed),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }
}

impl From<DownstreamStatus> for String {
    fn from(status: DownstreamStatus) -> Self {
        match status {
            DownstreamStatus::Other(status) => status,
            known => known.as_str().to_string(),
        }
    }
}

impl TryFrom<String> for DownstreamStatus {
    type Error = crate::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Compute the status shown to users from the stored status and the apply agent's report.
///
/// `has_error` is `None` while no apply output exists for the version. This is a read-time
/// projection over joined rows and must never be persisted.
pub fn effective_status(stored: Option<&str>, has_error: Option<bool>) -> DownstreamStatus {
    if has_error == Some(true) {
        return DownstreamStatus::Failed;
    }

    let Some(stored) = stored else {
        return DownstreamStatus::Unknown;
    };
    // Rows written by other releases may carry statuses this build does not know.
    let stored = stored
        .parse()
        .unwrap_or_else(|_| DownstreamStatus::Other(stored.to_string()));

    match (stored, has_error) {
        (DownstreamStatus::Deployed, None) => DownstreamStatus::Deploying,
        (status, _) => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployed_without_output_is_deploying() {
        assert_eq!(
            effective_status(Some("deployed"), None),
            DownstreamStatus::Deploying
        );
    }

    #[test]
    fn deployed_with_clean_output_is_deployed() {
        assert_eq!(
            effective_status(Some("deployed"), Some(false)),
            DownstreamStatus::Deployed
        );
    }

    #[test]
    fn error_output_overrides_any_status() {
        for stored in [Some("deployed"), Some("pending"), Some("pending_preflight"), None] {
            assert_eq!(effective_status(stored, Some(true)), DownstreamStatus::Failed);
        }
    }

    #[test]
    fn other_statuses_pass_through() {
        assert_eq!(
            effective_status(Some("pending_config"), None),
            DownstreamStatus::PendingConfig
        );
        assert_eq!(
            effective_status(Some("pending"), Some(false)),
            DownstreamStatus::Pending
        );
        assert_eq!(
            effective_status(Some("failed"), None),
            DownstreamStatus::Failed
        );
    }

    #[test]
    fn missing_status_is_unknown() {
        assert_eq!(effective_status(None, None), DownstreamStatus::Unknown);
        assert_eq!(effective_status(None, Some(false)), DownstreamStatus::Unknown);
    }

    #[test]
    fn unrecognised_status_passes_through_verbatim() {
        assert_eq!(
            effective_status(Some("pending_cluster_management"), None),
            DownstreamStatus::PendingClusterManagement
        );
        let status = effective_status(Some("rolling"), None);
        assert_eq!(status, DownstreamStatus::Other("rolling".to_string()));
        assert_eq!(status.as_str(), "rolling");
        assert_eq!(
            effective_status(Some("rolling"), Some(true)),
            DownstreamStatus::Failed
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_value(DownstreamStatus::PendingPreflight).unwrap();
        assert_eq!(json, "pending_preflight");
        let other = serde_json::to_value(DownstreamStatus::Other("rolling".to_string())).unwrap();
        assert_eq!(other, "rolling");

        let parsed: DownstreamStatus = serde_json::from_str("\"deployed\"").unwrap();
        assert_eq!(parsed, DownstreamStatus::Deployed);
        assert!(serde_json::from_str::<DownstreamStatus>("\"rolling\"").is_err());
    }
}
