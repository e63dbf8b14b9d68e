//! # export-sync
//!
//! Library for automating a session-based export workflow against a
//! third-party web application: authenticate through a multi-factor login
//! (password plus an email-delivered one-time code), trigger a bulk file
//! export, wait for the download to land on disk, unpack it, and mirror the
//! resulting directory tree into a remote object-storage hierarchy.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or HTTP surface, purely a Rust crate for embedding
//! - **Capability seams** - The UI automation surface, mailbox, and object
//!   store are trait interfaces; production implementations (WebDriver, IMAP,
//!   Google Drive) are swappable and scriptable in tests
//! - **One reliable pass** - Externally-paced, failure-prone steps compose
//!   into a single retryable run with unconditional cleanup
//! - **Event-driven** - Consumers subscribe to run events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use export_sync::{Config, ExportPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         // credentials, mailbox, storage settings…
//!         ..Default::default()
//!     };
//!
//!     let pipeline = ExportPipeline::new(config);
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let result = pipeline.run().await;
//!     println!("{}", result.message);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Multi-factor login sequencing
pub mod auth;
/// UI automation surface (WebDriver implementation)
pub mod automation;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export triggering and download waiting
pub mod export;
/// Archive extraction
pub mod extraction;
/// Mailbox access and one-time-code retrieval
pub mod mailbox;
/// Directory tree mirroring into remote storage
pub mod mirror;
/// Pipeline orchestration
pub mod pipeline;
/// Navigation rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote object storage (Google Drive implementation)
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use auth::{AuthState, Authenticator};
pub use automation::{AutomationSurface, SurfaceProvider, WebDriverProvider};
pub use config::Config;
pub use error::{CodeRetrievalError, Error, Result, StorageError};
pub use mailbox::{ImapMailbox, Mailbox, MailboxSession, OtpRetriever, SearchCriteria};
pub use pipeline::ExportPipeline;
pub use rate_limiter::RateLimiter;
pub use storage::{FolderHandle, GoogleDriveStore, ObjectId, ObjectStore};
pub use types::{DownloadArtifact, Event, PipelineResult, Stage, UploadResult};
