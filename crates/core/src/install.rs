//! Application install state machine.
//!
//! Transitions are driven entirely by callers; nothing here runs on a timer.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream URI scheme for releases served by the vendor portal.
pub const REPLICATED_SCHEME: &str = "replicated://";

/// Install state of an application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    OnlineUploadPending,
    OnlineUploadInProgress,
    OnlineUploadError,
    AirgapUploadPending,
    AirgapUploadInProgress,
    AirgapUploadError,
    Installed,
    Failed,
}

/// Install mode an upload belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallMode {
    Online,
    Airgap,
}

impl InstallMode {
    /// Task row that tracks progress for uploads in this mode.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Online => TaskId::OnlineInstall,
            Self::Airgap => TaskId::AirgapInstall,
        }
    }
}

/// Caller-driven events that move an application between install states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallEvent {
    /// An upload started.
    Begin,
    /// The upload finished and the app is installed.
    Succeed,
    /// The upload failed.
    Fail,
    /// Retry after an error; returns to in-progress.
    Reset,
}

impl InstallState {
    /// Choose the initial state for a new application.
    pub fn initial(upstream_uri: &str, is_airgap: bool) -> Self {
        if !upstream_uri.starts_with(REPLICATED_SCHEME) {
            Self::Installed
        } else if is_airgap {
            Self::AirgapUploadPending
        } else {
            Self::OnlineUploadPending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnlineUploadPending => "online_upload_pending",
            Self::OnlineUploadInProgress => "online_upload_in_progress",
            Self::OnlineUploadError => "online_upload_error",
            Self::AirgapUploadPending => "airgap_upload_pending",
            Self::AirgapUploadInProgress => "airgap_upload_in_progress",
            Self::AirgapUploadError => "airgap_upload_error",
            Self::Installed => "installed",
            Self::Failed => "failed",
        }
    }

    /// Install mode for upload states; `None` for `installed` and `failed`.
    pub fn mode(&self) -> Option<InstallMode> {
        match self {
            Self::OnlineUploadPending | Self::OnlineUploadInProgress | Self::OnlineUploadError => {
                Some(InstallMode::Online)
            }
            Self::AirgapUploadPending | Self::AirgapUploadInProgress | Self::AirgapUploadError => {
                Some(InstallMode::Airgap)
            }
            Self::Installed | Self::Failed => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::OnlineUploadError | Self::AirgapUploadError)
    }

    /// Apply an event, returning the next state.
    ///
    /// `installed` and `failed` accept no further upload events.
    pub fn transition(self, event: InstallEvent) -> crate::Result<Self> {
        use InstallEvent::*;
        use InstallState::*;

        let next = match (self, event) {
            (OnlineUploadPending | OnlineUploadError, Begin) => Some(OnlineUploadInProgress),
            (AirgapUploadPending | AirgapUploadError, Begin) => Some(AirgapUploadInProgress),
            (OnlineUploadInProgress | AirgapUploadInProgress, Succeed) => Some(Installed),
            (OnlineUploadInProgress, Fail) => Some(OnlineUploadError),
            (AirgapUploadInProgress, Fail) => Some(AirgapUploadError),
            (OnlineUploadError, Reset) => Some(OnlineUploadInProgress),
            (AirgapUploadError, Reset) => Some(AirgapUploadInProgress),
            _ => None,
        };

        next.ok_or_else(|| crate::Error::InvalidTransition {
            from: self.as_str().to_string(),
            to: format!("{event:?}").to_lowercase(),
        })
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online_upload_pending" => Ok(Self::OnlineUploadPending),
            "online_upload_in_progress" => Ok(Self::OnlineUploadInProgress),
            "online_upload_error" => Ok(Self::OnlineUploadError),
            "airgap_upload_pending" => Ok(Self::AirgapUploadPending),
            "airgap_upload_in_progress" => Ok(Self::AirgapUploadInProgress),
            "airgap_upload_error" => Ok(Self::AirgapUploadError),
            "installed" => Ok(Self::Installed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidInstallState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_from_upstream() {
        assert_eq!(
            InstallState::initial("replicated://my-app", false),
            InstallState::OnlineUploadPending
        );
        assert_eq!(
            InstallState::initial("replicated://my-app", true),
            InstallState::AirgapUploadPending
        );
        assert_eq!(
            InstallState::initial("helm://charts/nginx", true),
            InstallState::Installed
        );
    }

    #[test]
    fn upload_lifecycle() {
        let state = InstallState::OnlineUploadPending
            .transition(InstallEvent::Begin)
            .unwrap();
        assert_eq!(state, InstallState::OnlineUploadInProgress);

        let state = state.transition(InstallEvent::Fail).unwrap();
        assert_eq!(state, InstallState::OnlineUploadError);

        let state = state.transition(InstallEvent::Reset).unwrap();
        assert_eq!(state, InstallState::OnlineUploadInProgress);

        let state = state.transition(InstallEvent::Succeed).unwrap();
        assert_eq!(state, InstallState::Installed);
    }

    #[test]
    fn reset_only_from_error() {
        assert!(
            InstallState::AirgapUploadInProgress
                .transition(InstallEvent::Reset)
                .is_err()
        );
        assert!(InstallState::Installed.transition(InstallEvent::Reset).is_err());
        assert_eq!(
            InstallState::AirgapUploadError
                .transition(InstallEvent::Reset)
                .unwrap(),
            InstallState::AirgapUploadInProgress
        );
    }

    #[test]
    fn mode_maps_to_task() {
        assert_eq!(
            InstallState::AirgapUploadError.mode().map(|m| m.task_id()),
            Some(TaskId::AirgapInstall)
        );
        assert_eq!(
            InstallState::OnlineUploadError.mode().map(|m| m.task_id()),
            Some(TaskId::OnlineInstall)
        );
        assert_eq!(InstallState::Installed.mode(), None);
    }

    #[test]
    fn parse_roundtrip_names() {
        for state in [
            InstallState::OnlineUploadPending,
            InstallState::AirgapUploadError,
            InstallState::Installed,
            InstallState::Failed,
        ] {
            assert_eq!(state.as_str().parse::<InstallState>().unwrap(), state);
        }
        assert!("uploading".parse::<InstallState>().is_err());
    }
}
