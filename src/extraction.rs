//! Archive extraction
//!
//! Unpacks the downloaded export archive into the working directory. Exports
//! are plain ZIP archives; corrupt or unsupported content is fatal for the
//! run, and the orchestrator's cleanup deletes whatever was extracted.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

/// Extract a ZIP archive fully into `dest_dir`
///
/// The destination directory is created if absent. Returns the list of
/// extracted file paths. Runs on the blocking pool: archive decompression is
/// CPU- and disk-bound.
pub async fn extract(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    debug!(?archive_path, ?dest_dir, "extracting archive");

    let archive = archive_path.to_path_buf();
    let dest = dest_dir.to_path_buf();

    let files = spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("extraction task panicked: {e}"),
        })??;

    info!(
        ?archive_path,
        extracted_count = files.len(),
        "extraction successful"
    );
    Ok(files)
}

fn extract_blocking(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest_dir)?;

    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::Extraction {
        archive: archive_path.to_path_buf(),
        reason: format!("failed to read ZIP archive: {e}"),
    })?;

    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| Error::Extraction {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to read ZIP entry: {e}"),
        })?;

        if let Some(path) = extract_entry(entry, dest_dir, archive_path)? {
            extracted_files.push(path);
        }
    }

    Ok(extracted_files)
}

/// Extract a single entry to disk, creating directories as needed
///
/// Entries whose names escape the destination are skipped, not extracted.
fn extract_entry(
    mut entry: zip::read::ZipFile,
    dest_dir: &Path,
    archive_path: &Path,
) -> Result<Option<PathBuf>> {
    let entry_path = match entry.enclosed_name() {
        Some(path) => dest_dir.join(path),
        None => {
            warn!(name = entry.name(), "skipping entry with unsafe path");
            return Ok(None);
        }
    };

    if entry.is_dir() {
        std::fs::create_dir_all(&entry_path)?;
        return Ok(None);
    }

    if let Some(parent) = entry_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut outfile = std::fs::File::create(&entry_path)?;
    std::io::copy(&mut entry, &mut outfile).map_err(|e| Error::Extraction {
        archive: archive_path.to_path_buf(),
        reason: format!("failed to extract {}: {e}", entry_path.display()),
    })?;

    Ok(Some(entry_path))
}
