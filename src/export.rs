//! Export triggering and download waiting
//!
//! Issues the bulk-export UI actions, then polls the local download directory
//! until a completed file appears. Polling is deliberate: the browser's
//! download-completion signal is not observable from here, so the waiter
//! watches for the in-progress marker suffix to disappear. Interval and
//! timeout are explicit, tunable configuration.

use crate::automation::AutomationSurface;
use crate::config::{Config, ExportConfig};
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::types::DownloadArtifact;
use std::path::Path;
use std::time::SystemTime;
use tokio::time::Instant;
use tracing::{debug, info};

/// Issue the export request for the configured resource
///
/// Navigates to the resource's file listing (rate-limited) and performs the
/// select-all / open-menu / download sequence. The download itself is
/// asynchronous; callers follow up with [`wait_for_download`].
pub async fn trigger_export(
    surface: &dyn AutomationSurface,
    rate_limiter: &RateLimiter,
    config: &Config,
) -> Result<()> {
    let selectors = &config.export.selectors;
    let wait = config.automation.element_wait;

    rate_limiter.acquire().await;
    surface
        .navigate(&config.export.listing_url(&config.automation.base_url))
        .await?;

    surface.wait_for(&selectors.listing_container, wait).await?;
    surface.click(&selectors.select_all).await?;
    surface.click(&selectors.actions_menu).await?;
    surface.wait_for(&selectors.download_item, wait).await?;
    surface.click(&selectors.download_item).await?;

    info!(resource_id = config.export.resource_id, "export triggered");
    Ok(())
}

/// Poll the download directory until a completed file appears
///
/// A file is completed when its name carries no in-progress marker suffix.
/// Among qualifying files the one with the most recent modification time
/// wins; ties break deterministically by lexical path order. Fails with
/// [`Error::DownloadTimeout`] if nothing qualifies before the deadline.
pub async fn wait_for_download(config: &ExportConfig) -> Result<DownloadArtifact> {
    let deadline = Instant::now() + config.download_timeout;

    loop {
        if let Some(artifact) =
            newest_completed(&config.download_dir, &config.in_progress_suffixes).await?
        {
            info!(path = %artifact.path.display(), "completed download detected");
            return Ok(artifact);
        }

        if Instant::now() >= deadline {
            return Err(Error::DownloadTimeout {
                dir: config.download_dir.clone(),
                timeout: config.download_timeout,
            });
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

/// Scan the directory for the newest completed file
///
/// A missing directory counts as empty: the browser may not have created it
/// yet when polling starts.
async fn newest_completed(dir: &Path, suffixes: &[String]) -> Result<Option<DownloadArtifact>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut best: Option<DownloadArtifact> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();

        let file_type = match entry.file_type().await {
            Ok(ft) => ft,
            Err(_) => continue,
        };
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_in_progress(name, suffixes) {
            debug!(name, "skipping in-progress download");
            continue;
        }

        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let candidate = DownloadArtifact { path, modified };
        best = Some(match best.take() {
            None => candidate,
            Some(current) => pick_newer(current, candidate),
        });
    }

    Ok(best)
}

/// Whether a filename carries an in-progress marker suffix (case-insensitive)
fn is_in_progress(name: &str, suffixes: &[String]) -> bool {
    let lower = name.to_lowercase();
    suffixes
        .iter()
        .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
}

/// Newest modification time wins; equal times break by lexical path order
fn pick_newer(a: DownloadArtifact, b: DownloadArtifact) -> DownloadArtifact {
    match b.modified.cmp(&a.modified) {
        std::cmp::Ordering::Greater => b,
        std::cmp::Ordering::Less => a,
        std::cmp::Ordering::Equal => {
            if b.path < a.path {
                b
            } else {
                a
            }
        }
    }
}
