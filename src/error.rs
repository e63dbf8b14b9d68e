//! Error types for export-sync
//!
//! This module provides the error handling for the library, including:
//! - Domain-specific error types (authentication, code retrieval, storage sync, etc.)
//! - Context information (pipeline stage, file path, failing selector)
//! - A crate-wide `Result` alias

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::auth::AuthState;

/// Result type alias for export-sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for export-sync
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues without exposing credentials.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "credentials.identity")
        key: Option<String>,
    },

    /// A login sub-step did not complete within its wait bound
    #[error("authentication step failed at {state}: {reason}")]
    AuthenticationStep {
        /// The state machine step that was being attempted
        state: AuthState,
        /// What went wrong during the step
        reason: String,
    },

    /// One-time-code retrieval failed
    #[error("code retrieval error: {0}")]
    CodeRetrieval(#[from] CodeRetrievalError),

    /// No completed file appeared in the download directory before the deadline
    #[error("no completed download appeared in {dir} within {timeout:?}")]
    DownloadTimeout {
        /// The download directory that was polled
        dir: PathBuf,
        /// How long the waiter polled before giving up
        timeout: Duration,
    },

    /// Archive extraction failed
    #[error("extraction failed for {archive}: {reason}")]
    Extraction {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },

    /// Mirroring a local path into remote storage failed
    ///
    /// Carries the failing local path; the first such failure aborts the
    /// entire mirror pass.
    #[error("storage sync failed for {path}: {reason}")]
    StorageSync {
        /// The local path whose folder creation or upload failed
        path: PathBuf,
        /// The reason the sync failed
        reason: String,
    },

    /// Object-storage API error (token exchange, folder create, upload)
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// UI automation surface error (driver session, element lookup, action)
    #[error("automation error: {0}")]
    Automation(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was cancelled or exceeded its overall timeout
    #[error("pipeline run cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// One-time-code retrieval errors
///
/// Each failure mode of the retriever is a distinct kind so the caller can
/// decide which ones are worth another mailbox attempt. The retriever itself
/// never retries.
#[derive(Debug, Error)]
pub enum CodeRetrievalError {
    /// Failed to connect or authenticate to the mailbox
    #[error("failed to connect to mailbox: {0}")]
    Connect(String),

    /// Connected, but the inbox could not be opened
    #[error("failed to open inbox: {0}")]
    OpenInbox(String),

    /// The unseen-message search itself failed
    #[error("mailbox search failed: {0}")]
    Search(String),

    /// Zero unread messages matched the sender/subject criteria
    #[error("no matching verification message found")]
    NoMatch,

    /// A matching message was found but its body could not be fetched
    #[error("failed to fetch message body: {0}")]
    Fetch(String),

    /// The message body matched none of the extraction patterns
    #[error("no code found in message body after trying {patterns_tried} pattern(s)")]
    PatternMismatch {
        /// How many configured patterns were attempted
        patterns_tried: usize,
    },
}

/// Object-storage API errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// OAuth token exchange against the authorization server failed
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// Remote folder creation failed
    #[error("failed to create folder \"{name}\": {reason}")]
    FolderCreate {
        /// The folder name that was being created
        name: String,
        /// The reason creation failed
        reason: String,
    },

    /// Object upload failed
    #[error("failed to upload \"{name}\": {reason}")]
    Upload {
        /// The object name that was being uploaded
        name: String,
        /// The reason the upload failed
        reason: String,
    },
}

impl Error {
    /// Shorthand for a configuration error without a key
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: None,
        }
    }

    /// Shorthand for a configuration error tied to a specific key
    pub fn config_key(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_step_error_names_the_state() {
        let err = Error::AuthenticationStep {
            state: AuthState::OtpPrompted,
            reason: "code entry field never appeared".into(),
        };
        let msg = err.to_string();
        assert!(
            msg.contains("otp_prompted"),
            "error message should identify the failed state, got: {msg}"
        );
        assert!(msg.contains("code entry field never appeared"));
    }

    #[test]
    fn download_timeout_error_names_dir_and_bound() {
        let err = Error::DownloadTimeout {
            dir: PathBuf::from("/data/downloads"),
            timeout: Duration::from_secs(120),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/downloads"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn storage_sync_error_carries_the_failing_path() {
        let err = Error::StorageSync {
            path: PathBuf::from("/work/extracted/sub/b.txt"),
            reason: "upload rejected".into(),
        };
        assert!(err.to_string().contains("/work/extracted/sub/b.txt"));
    }

    #[test]
    fn code_retrieval_kinds_are_distinguishable() {
        let kinds = [
            CodeRetrievalError::Connect("refused".into()).to_string(),
            CodeRetrievalError::OpenInbox("denied".into()).to_string(),
            CodeRetrievalError::Search("bad query".into()).to_string(),
            CodeRetrievalError::NoMatch.to_string(),
            CodeRetrievalError::Fetch("dropped".into()).to_string(),
            CodeRetrievalError::PatternMismatch { patterns_tried: 2 }.to_string(),
        ];
        // Every kind renders a distinct message
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn pattern_mismatch_reports_attempt_count() {
        let err = CodeRetrievalError::PatternMismatch { patterns_tried: 3 };
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn config_shorthands_set_key() {
        let err = Error::config("missing credentials");
        assert!(matches!(err, Error::Config { key: None, .. }));

        let err = Error::config_key("identity is empty", "credentials.identity");
        match err {
            Error::Config { key: Some(k), .. } => assert_eq!(k, "credentials.identity"),
            other => panic!("expected Config with key, got {other:?}"),
        }
    }
}
