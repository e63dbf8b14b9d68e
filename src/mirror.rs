//! Directory tree mirroring into remote storage
//!
//! Walks a local directory tree with an explicit work list (no call-stack
//! recursion, so depth is bounded by memory, not stack) and replays its
//! structure into the object store: one remote folder per local directory,
//! one uploaded object per local file.
//!
//! A directory's remote folder is created before any of its children are
//! processed. That is a data dependency, not sequential convenience. File
//! uploads within one directory fan out concurrently under a bound; sibling
//! subtrees share no mutable state. The first failure aborts the whole pass
//! and surfaces the failing local path.

use crate::error::{Error, Result};
use crate::storage::{FolderHandle, ObjectStore};
use crate::types::{Event, UploadResult};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Mirror every child of `local_root` into remote storage under `remote_parent`
///
/// Returns one [`UploadResult`] per uploaded file. No partial sync: any
/// folder-creation or upload failure aborts with [`Error::StorageSync`]
/// carrying the failing local path.
pub async fn mirror(
    store: &dyn ObjectStore,
    local_root: &Path,
    remote_parent: &FolderHandle,
    max_concurrent_uploads: usize,
    event_tx: &broadcast::Sender<Event>,
) -> Result<Vec<UploadResult>> {
    let mut results = Vec::new();

    // Local directory path -> its remote folder handle, for the duration of
    // this pass only. Each directory gets exactly one creation call; handles
    // are never reused across runs.
    let mut folders: HashMap<PathBuf, FolderHandle> = HashMap::new();
    folders.insert(local_root.to_path_buf(), remote_parent.clone());

    let mut work: VecDeque<(PathBuf, FolderHandle)> = VecDeque::new();
    work.push_back((local_root.to_path_buf(), remote_parent.clone()));

    while let Some((dir, handle)) = work.pop_front() {
        let (subdirs, files) = partition_children(&dir).await?;
        debug!(
            dir = %dir.display(),
            subdirs = subdirs.len(),
            files = files.len(),
            "mirroring directory"
        );

        // Folders first: children need their parent handle to exist
        for subdir in subdirs {
            let name = node_name(&subdir)?;
            let sub_handle = store
                .create_folder(&name, Some(&handle))
                .await
                .map_err(|e| Error::StorageSync {
                    path: subdir.clone(),
                    reason: e.to_string(),
                })?;

            event_tx
                .send(Event::FolderMirrored {
                    local_path: subdir.clone(),
                })
                .ok();

            folders.insert(subdir.clone(), sub_handle.clone());
            work.push_back((subdir, sub_handle));
        }

        // Bounded fan-out over this directory's files
        let mut uploads = futures::stream::iter(files.into_iter().map(|file| {
            let handle = handle.clone();
            async move { upload_file(store, file, &handle).await }
        }))
        .buffer_unordered(max_concurrent_uploads.max(1));

        while let Some(result) = uploads.next().await {
            // First failure aborts; dropping the stream cancels in-flight
            // sibling uploads
            results.push(result?);
        }
    }

    info!(
        uploaded = results.len(),
        folders = folders.len() - 1,
        "mirror complete"
    );
    Ok(results)
}

async fn upload_file(
    store: &dyn ObjectStore,
    file: PathBuf,
    parent: &FolderHandle,
) -> Result<UploadResult> {
    let name = node_name(&file)?;

    let bytes = tokio::fs::read(&file).await.map_err(|e| Error::StorageSync {
        path: file.clone(),
        reason: format!("failed to read file: {e}"),
    })?;

    let object_id = store
        .upload_object(&name, bytes, parent)
        .await
        .map_err(|e| Error::StorageSync {
            path: file.clone(),
            reason: e.to_string(),
        })?;

    Ok(UploadResult {
        local_path: file,
        object_id,
    })
}

/// Split a directory's children into (subdirectories, files), sorted by path
///
/// Sorting keeps the traversal deterministic; correctness does not depend on
/// order because sibling subtrees are independent.
async fn partition_children(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| Error::StorageSync {
        path: dir.to_path_buf(),
        reason: format!("failed to read directory: {e}"),
    })?;

    let mut subdirs = Vec::new();
    let mut files = Vec::new();

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        match entry.file_type().await {
            Ok(ft) if ft.is_dir() => subdirs.push(path),
            Ok(ft) if ft.is_file() => files.push(path),
            // Symlinks and exotic node types are not part of export archives
            _ => {}
        }
    }

    subdirs.sort();
    files.sort();
    Ok((subdirs, files))
}

fn node_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::StorageSync {
            path: path.to_path_buf(),
            reason: "node has no file name".to_string(),
        })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ObjectId;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Object store that records every call in order and can be told to fail
    /// uploads of one specific name.
    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
        fail_upload_named: Option<String>,
    }

    impl RecordingStore {
        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn create_folder(
            &self,
            name: &str,
            parent: Option<&FolderHandle>,
        ) -> Result<FolderHandle> {
            let parent = parent.map(|p| p.0.clone()).unwrap_or_else(|| "<root>".into());
            self.ops
                .lock()
                .unwrap()
                .push(format!("create_folder {name} in {parent}"));
            Ok(FolderHandle(format!("folder-{name}")))
        }

        async fn upload_object(
            &self,
            name: &str,
            _bytes: Vec<u8>,
            parent: &FolderHandle,
        ) -> Result<ObjectId> {
            if self.fail_upload_named.as_deref() == Some(name) {
                return Err(crate::error::StorageError::Upload {
                    name: name.to_string(),
                    reason: "injected failure".to_string(),
                }
                .into());
            }
            self.ops
                .lock()
                .unwrap()
                .push(format!("upload {name} in {}", parent.0));
            Ok(ObjectId(format!("obj-{name}")))
        }
    }

    fn event_channel() -> broadcast::Sender<Event> {
        broadcast::channel(64).0
    }

    /// root/{a.txt, sub/{b.txt}}
    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"beta").unwrap();
        dir
    }

    #[tokio::test]
    async fn round_trip_preserves_structure_and_ordering() {
        let tree = sample_tree();
        let store = RecordingStore::default();
        let root = FolderHandle("root".into());

        let results = mirror(&store, tree.path(), &root, 1, &event_channel())
            .await
            .unwrap();

        assert_eq!(results.len(), 2, "two files uploaded");

        let ops = store.ops();
        // Exactly one folder created, for sub
        assert_eq!(
            ops.iter().filter(|op| op.starts_with("create_folder")).count(),
            1
        );
        assert!(ops.contains(&"create_folder sub in root".to_string()));
        assert!(ops.contains(&"upload a.txt in root".to_string()));
        assert!(ops.contains(&"upload b.txt in folder-sub".to_string()));

        // The sub folder exists before b.txt is uploaded into it
        let create_pos = ops.iter().position(|op| op.contains("create_folder sub")).unwrap();
        let upload_pos = ops.iter().position(|op| op.contains("upload b.txt")).unwrap();
        assert!(
            create_pos < upload_pos,
            "folder must be created before its children upload: {ops:?}"
        );
    }

    #[tokio::test]
    async fn upload_failure_aborts_and_names_the_path() {
        let tree = sample_tree();
        let store = RecordingStore {
            fail_upload_named: Some("a.txt".to_string()),
            ..Default::default()
        };
        let root = FolderHandle("root".into());

        let err = mirror(&store, tree.path(), &root, 1, &event_channel())
            .await
            .unwrap_err();

        match err {
            Error::StorageSync { path, .. } => {
                assert_eq!(path, tree.path().join("a.txt"));
            }
            other => panic!("expected StorageSync, got {other:?}"),
        }

        // No further files are uploaded after the failure
        assert!(
            !store.ops().iter().any(|op| op.contains("upload b.txt")),
            "mirror must abort before reaching b.txt: {:?}",
            store.ops()
        );
    }

    #[tokio::test]
    async fn deep_tree_chains_handles() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/leaf.txt"), b"x").unwrap();

        let store = RecordingStore::default();
        let root = FolderHandle("root".into());
        mirror(&store, dir.path(), &root, 4, &event_channel())
            .await
            .unwrap();

        let ops = store.ops();
        assert!(ops.contains(&"create_folder a in root".to_string()));
        assert!(ops.contains(&"create_folder b in folder-a".to_string()));
        assert!(ops.contains(&"create_folder c in folder-b".to_string()));
        assert!(ops.contains(&"upload leaf.txt in folder-c".to_string()));
    }

    #[tokio::test]
    async fn empty_tree_mirrors_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RecordingStore::default();
        let root = FolderHandle("root".into());

        let results = mirror(&store, dir.path(), &root, 4, &event_channel())
            .await
            .unwrap();

        assert!(results.is_empty());
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn every_directory_gets_exactly_one_folder_creation() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("x")).unwrap();
        std::fs::create_dir_all(dir.path().join("y")).unwrap();
        std::fs::write(dir.path().join("x/1.txt"), b"1").unwrap();
        std::fs::write(dir.path().join("y/2.txt"), b"2").unwrap();

        let store = RecordingStore::default();
        let root = FolderHandle("root".into());
        mirror(&store, dir.path(), &root, 4, &event_channel())
            .await
            .unwrap();

        let creates: Vec<_> = store
            .ops()
            .into_iter()
            .filter(|op| op.starts_with("create_folder"))
            .collect();
        assert_eq!(creates.len(), 2);
        // No duplicates
        let mut deduped = creates.clone();
        deduped.dedup();
        assert_eq!(creates, deduped);
    }

    #[tokio::test]
    async fn folder_creation_failure_names_the_directory() {
        struct FailingStore;

        #[async_trait]
        impl ObjectStore for FailingStore {
            async fn create_folder(
                &self,
                name: &str,
                _parent: Option<&FolderHandle>,
            ) -> Result<FolderHandle> {
                Err(crate::error::StorageError::FolderCreate {
                    name: name.to_string(),
                    reason: "injected".to_string(),
                }
                .into())
            }

            async fn upload_object(
                &self,
                _name: &str,
                _bytes: Vec<u8>,
                _parent: &FolderHandle,
            ) -> Result<ObjectId> {
                unreachable!("no uploads should happen when folder creation fails")
            }
        }

        let tree = sample_tree();
        let root = FolderHandle("root".into());
        let err = mirror(&FailingStore, tree.path(), &root, 1, &event_channel())
            .await
            .unwrap_err();

        match err {
            Error::StorageSync { path, .. } => assert_eq!(path, tree.path().join("sub")),
            other => panic!("expected StorageSync, got {other:?}"),
        }
    }
}
