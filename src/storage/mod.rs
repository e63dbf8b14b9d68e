//! Remote object storage
//!
//! The mirror depends on a minimal capability interface: create a folder
//! under a parent handle, upload raw bytes under a parent handle. The
//! production implementation targets the Google Drive v3 REST API
//! ([`drive::GoogleDriveStore`]); tests substitute recording fakes.

pub mod drive;

pub use drive::GoogleDriveStore;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote folder
///
/// Returned by folder creation and valid for the duration of one upload
/// pass; handles are never persisted or reused across runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderHandle(pub String);

impl std::fmt::Display for FolderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for FolderHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier of a remote object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Capability interface for hierarchical object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create a folder under `parent` (None = storage root), returning its handle
    async fn create_folder(&self, name: &str, parent: Option<&FolderHandle>)
    -> Result<FolderHandle>;

    /// Upload raw bytes as a new object named `name` under `parent`
    async fn upload_object(&self, name: &str, bytes: Vec<u8>, parent: &FolderHandle)
    -> Result<ObjectId>;
}
