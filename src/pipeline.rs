//! Pipeline orchestration
//!
//! Drives the full workflow: acquire automation session → authenticate →
//! trigger export and await download → extract → mirror → cleanup → release
//! session. Cleanup of temporary files and the automation session happens on
//! **every** exit path, including early stage failures and cancellation.
//!
//! The orchestrator produces exactly one [`PipelineResult`] per run and never
//! reports partial success.

use crate::auth::Authenticator;
use crate::automation::{AutomationSurface, SurfaceProvider, WebDriverProvider};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export;
use crate::extraction;
use crate::mailbox::{ImapMailbox, Mailbox, OtpRetriever};
use crate::mirror;
use crate::rate_limiter::RateLimiter;
use crate::storage::{FolderHandle, GoogleDriveStore, ObjectStore};
use crate::types::{Event, PipelineResult, Stage, UploadResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Temporary artifacts of one run, tracked for unconditional cleanup
struct Scratch {
    /// Stage currently executing, for failure attribution
    stage: Stage,
    /// Downloaded archive, once the download stage produced one
    archive: Option<PathBuf>,
    /// Extraction directory, once the extract stage created one
    extract_dir: Option<PathBuf>,
}

/// One-shot export pipeline
///
/// Owns its rate limiter and event channel; nothing is process-global, so
/// embedders needing parallel runs construct independent pipelines. One
/// automation session is opened per [`run`](ExportPipeline::run) and
/// destroyed unconditionally at run end.
pub struct ExportPipeline {
    config: Arc<Config>,
    rate_limiter: RateLimiter,
    surfaces: Arc<dyn SurfaceProvider>,
    mailbox: Arc<dyn Mailbox>,
    store: Arc<dyn ObjectStore>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl ExportPipeline {
    /// Create a pipeline with the production collaborators
    /// (WebDriver surface, IMAP mailbox, Google Drive store)
    pub fn new(config: Config) -> Self {
        let surfaces = Arc::new(WebDriverProvider::new(
            config.automation.clone(),
            config.export.download_dir.clone(),
        ));
        let mailbox = Arc::new(ImapMailbox::new(config.mailbox.clone()));
        let store = Arc::new(GoogleDriveStore::new(config.storage.clone()));
        Self::with_collaborators(config, surfaces, mailbox, store)
    }

    /// Create a pipeline with explicit collaborators
    ///
    /// This is the seam tests use to substitute scripted surfaces, mailboxes,
    /// and stores.
    pub fn with_collaborators(
        config: Config,
        surfaces: Arc<dyn SurfaceProvider>,
        mailbox: Arc<dyn Mailbox>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(256);
        Self {
            rate_limiter: RateLimiter::new(config.rate_limit_interval),
            config: Arc::new(config),
            surfaces,
            mailbox,
            store,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to run events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that aborts an in-flight run when cancelled
    ///
    /// Cancellation interrupts whichever stage is executing; the cleanup path
    /// still runs and the automation session is still released.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one full run
    ///
    /// Always returns a terminal result; stage errors are folded into it
    /// after cleanup. The automation session and any temporary files are
    /// released whether the run succeeds, fails, or is cancelled by the
    /// overall timeout.
    pub async fn run(&self) -> PipelineResult {
        if let Err(e) = self.config.validate() {
            return self.failure(Stage::Session, &e);
        }

        let retriever = match OtpRetriever::new(self.mailbox.clone(), &self.config.otp) {
            Ok(retriever) => retriever,
            Err(e) => return self.failure(Stage::Session, &e),
        };

        if let Err(e) = self.prepare_directories().await {
            return self.failure(Stage::Session, &e);
        }

        self.emit(Event::StageStarted {
            stage: Stage::Session,
        });
        let surface = match self.surfaces.open_surface().await {
            Ok(surface) => surface,
            Err(e) => return self.failure(Stage::Session, &e),
        };
        self.emit(Event::StageComplete {
            stage: Stage::Session,
        });

        let mut scratch = Scratch {
            stage: Stage::Authenticate,
            archive: None,
            extract_dir: None,
        };

        let work = self.run_stages(&*surface, &retriever, &mut scratch);
        let bounded = async {
            match self.config.run_timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or(Err(Error::Cancelled)),
                None => work.await,
            }
        };
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            outcome = bounded => outcome,
        };

        // Unconditional cleanup: temporary files first, then the session
        self.cleanup(&scratch).await;
        if let Err(e) = surface.close().await {
            warn!(error = %e, "failed to close automation session");
        }

        match outcome {
            Ok((remote_root, uploads)) => {
                info!(
                    remote_root = %remote_root,
                    uploaded = uploads.len(),
                    "pipeline run complete"
                );
                self.emit(Event::RunComplete {
                    remote_root: remote_root.clone(),
                    uploaded: uploads.len(),
                });
                PipelineResult {
                    success: true,
                    message: format!(
                        "mirrored {} file(s) into remote folder {remote_root}",
                        uploads.len()
                    ),
                    remote_root: Some(remote_root),
                }
            }
            Err(e) => self.failure(scratch.stage, &e),
        }
    }

    /// Run the externally-paced stages in order
    async fn run_stages(
        &self,
        surface: &dyn AutomationSurface,
        retriever: &OtpRetriever,
        scratch: &mut Scratch,
    ) -> Result<(FolderHandle, Vec<UploadResult>)> {
        // Authenticate
        scratch.stage = Stage::Authenticate;
        self.emit(Event::StageStarted {
            stage: Stage::Authenticate,
        });
        let authenticator = Authenticator::new(
            surface,
            retriever,
            &self.rate_limiter,
            &self.config,
            self.event_tx.clone(),
        );
        authenticator.login().await?;
        self.emit(Event::StageComplete {
            stage: Stage::Authenticate,
        });

        // Trigger the export
        scratch.stage = Stage::Export;
        self.emit(Event::StageStarted {
            stage: Stage::Export,
        });
        export::trigger_export(surface, &self.rate_limiter, &self.config).await?;
        self.emit(Event::StageComplete {
            stage: Stage::Export,
        });

        // Await the download
        scratch.stage = Stage::Download;
        self.emit(Event::StageStarted {
            stage: Stage::Download,
        });
        let artifact = export::wait_for_download(&self.config.export).await?;
        scratch.archive = Some(artifact.path.clone());
        self.emit(Event::DownloadDetected {
            path: artifact.path.clone(),
        });
        self.emit(Event::StageComplete {
            stage: Stage::Download,
        });

        // Extract
        scratch.stage = Stage::Extract;
        self.emit(Event::StageStarted {
            stage: Stage::Extract,
        });
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let extract_dir = self.config.export.work_dir.join(format!("extract-{stamp}"));
        scratch.extract_dir = Some(extract_dir.clone());
        let extracted = extraction::extract(&artifact.path, &extract_dir).await?;
        self.emit(Event::Extracted {
            archive: artifact.path.clone(),
            file_count: extracted.len(),
        });
        self.emit(Event::StageComplete {
            stage: Stage::Extract,
        });

        // Mirror
        scratch.stage = Stage::Mirror;
        self.emit(Event::StageStarted {
            stage: Stage::Mirror,
        });
        let root_name = self
            .config
            .storage
            .root_name
            .clone()
            .unwrap_or_else(|| format!("export-{stamp}"));
        let root_parent = self
            .config
            .storage
            .root_parent
            .clone()
            .map(FolderHandle::from);
        let remote_root = self
            .store
            .create_folder(&root_name, root_parent.as_ref())
            .await
            .map_err(|e| Error::StorageSync {
                path: extract_dir.clone(),
                reason: e.to_string(),
            })?;

        let uploads = mirror::mirror(
            &*self.store,
            &extract_dir,
            &remote_root,
            self.config.storage.max_concurrent_uploads,
            &self.event_tx,
        )
        .await?;
        self.emit(Event::StageComplete {
            stage: Stage::Mirror,
        });

        Ok((remote_root, uploads))
    }

    /// Ensure the download and work directories exist
    async fn prepare_directories(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.export.download_dir).await?;
        tokio::fs::create_dir_all(&self.config.export.work_dir).await?;
        Ok(())
    }

    /// Remove the downloaded archive and the extracted tree
    ///
    /// Runs on every exit path. Failures are logged, never surfaced: cleanup
    /// must not mask a stage error.
    async fn cleanup(&self, scratch: &Scratch) {
        self.emit(Event::StageStarted {
            stage: Stage::Cleanup,
        });

        if let Some(archive) = &scratch.archive {
            match tokio::fs::remove_file(archive).await {
                Ok(()) => debug!(path = %archive.display(), "deleted downloaded archive"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %archive.display(), error = %e, "failed to delete archive"),
            }
        }

        if let Some(dir) = &scratch.extract_dir {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => debug!(path = %dir.display(), "deleted extracted tree"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %dir.display(), error = %e, "failed to delete extracted tree"),
            }
        }

        self.emit(Event::StageComplete {
            stage: Stage::Cleanup,
        });
    }

    fn failure(&self, stage: Stage, err: &Error) -> PipelineResult {
        error!(stage = %stage, error = %err, "pipeline run failed");
        self.emit(Event::RunFailed {
            stage,
            error: err.to_string(),
        });
        PipelineResult {
            success: false,
            message: format!("{stage} failed: {err}"),
            remote_root: None,
        }
    }

    fn emit(&self, event: Event) {
        // send() errs when no one subscribed, which is fine
        self.event_tx.send(event).ok();
    }
}
