//! Background task ids and heartbeat staleness.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// Default heartbeat window: status rows older than this read as empty.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 10;

/// Long-running out-of-process operations that report progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskId {
    AirgapInstall,
    OnlineInstall,
    ImageRewrite,
    UpdateDownload,
}

impl TaskId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AirgapInstall => "airgap-install",
            Self::OnlineInstall => "online-install",
            Self::ImageRewrite => "image-rewrite",
            Self::UpdateDownload => "update-download",
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "airgap-install" => Ok(Self::AirgapInstall),
            "online-install" => Ok(Self::OnlineInstall),
            "image-rewrite" => Ok(Self::ImageRewrite),
            "update-download" => Ok(Self::UpdateDownload),
            other => Err(crate::Error::InvalidTaskId(other.to_string())),
        }
    }
}

/// Progress reported by a background task.
///
/// The default value (empty status and message) is the "no status" sentinel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: String,
    pub current_message: String,
}

impl TaskStatus {
    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.current_message.is_empty()
    }
}

/// Whether a heartbeat written at `updated_at` is stale at `now`.
pub fn is_stale(updated_at: OffsetDateTime, now: OffsetDateTime, stale_after: Duration) -> bool {
    updated_at < now - stale_after
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_window() {
        let window = Duration::seconds(DEFAULT_STALE_AFTER_SECS as i64);
        let written = OffsetDateTime::now_utc();

        assert!(!is_stale(written, written, window));
        assert!(!is_stale(written, written + Duration::seconds(9), window));
        assert!(is_stale(written, written + Duration::seconds(11), window));
    }

    #[test]
    fn task_ids_parse() {
        assert_eq!(
            "image-rewrite".parse::<TaskId>().unwrap(),
            TaskId::ImageRewrite
        );
        assert_eq!(TaskId::UpdateDownload.to_string(), "update-download");
        assert!("reindex".parse::<TaskId>().is_err());
    }

    #[test]
    fn default_status_is_empty_sentinel() {
        assert!(TaskStatus::default().is_empty());
        let running = TaskStatus {
            status: "running".to_string(),
            current_message: String::new(),
        };
        assert!(!running.is_empty());
    }
}
