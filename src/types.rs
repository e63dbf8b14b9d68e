//! Core types for export-sync

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::auth::AuthState;
use crate::storage::{FolderHandle, ObjectId};

/// Pipeline stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Automation session acquisition
    Session,
    /// Multi-factor login sequence
    Authenticate,
    /// Export trigger UI actions
    Export,
    /// Download directory polling
    Download,
    /// Archive extraction
    Extract,
    /// Directory tree mirror into remote storage
    Mirror,
    /// Removal of temporary local files
    Cleanup,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Session => "session",
            Stage::Authenticate => "authenticate",
            Stage::Export => "export",
            Stage::Download => "download",
            Stage::Extract => "extract",
            Stage::Mirror => "mirror",
            Stage::Cleanup => "cleanup",
        };
        write!(f, "{name}")
    }
}

/// One completed file in the download directory
///
/// "Completed" means the filename carries no in-progress marker suffix.
/// Identity is the filesystem path; at most one artifact is consumed per
/// export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadArtifact {
    /// Path of the completed file
    pub path: PathBuf,
    /// Modification time used to pick the newest qualifying file
    pub modified: SystemTime,
}

/// Outcome of uploading one local file into remote storage
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// The local file that was uploaded
    pub local_path: PathBuf,
    /// Identity of the created remote object
    pub object_id: ObjectId,
}

/// Terminal artifact of one orchestrator run
///
/// Never reports partial success: if any stage failed, `success` is false
/// even when earlier stages (export, download) completed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Whether every stage completed
    pub success: bool,
    /// Stage name and underlying cause on failure, summary on success
    pub message: String,
    /// Handle of the remote export root (present only on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_root: Option<FolderHandle>,
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stage started
    StageStarted {
        /// The stage that started
        stage: Stage,
    },

    /// A stage completed successfully
    StageComplete {
        /// The stage that completed
        stage: Stage,
    },

    /// The login state machine reached a new state
    AuthStateReached {
        /// The state that was reached
        state: AuthState,
    },

    /// A one-time code was retrieved from the mailbox
    ///
    /// The code itself is transient and never carried in events.
    CodeRetrieved,

    /// A completed download artifact was detected
    DownloadDetected {
        /// Path of the completed file
        path: PathBuf,
    },

    /// The downloaded archive was extracted
    Extracted {
        /// The archive that was unpacked
        archive: PathBuf,
        /// Number of files extracted
        file_count: usize,
    },

    /// A local directory was mirrored into a new remote folder
    FolderMirrored {
        /// The local directory
        local_path: PathBuf,
    },

    /// The run completed successfully
    RunComplete {
        /// Handle of the remote export root
        remote_root: FolderHandle,
        /// Number of files uploaded
        uploaded: usize,
    },

    /// The run failed
    RunFailed {
        /// The stage that failed
        stage: Stage,
        /// Error message
        error: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_is_lowercase() {
        assert_eq!(Stage::Authenticate.to_string(), "authenticate");
        assert_eq!(Stage::Mirror.to_string(), "mirror");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::StageStarted {
            stage: Stage::Export,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "stage_started");
        assert_eq!(json["stage"], "export");
    }

    #[test]
    fn pipeline_result_omits_absent_root() {
        let result = PipelineResult {
            success: false,
            message: "authenticate failed".into(),
            remote_root: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(!json.contains("remote_root"));
    }
}
