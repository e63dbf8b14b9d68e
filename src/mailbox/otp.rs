//! One-time-code retrieval
//!
//! Searches the mailbox for unread verification messages, inspects only the
//! most recent match, and extracts a 6-digit code with an ordered pattern
//! list. This component never retries and never polls: mail delivery latency
//! is the caller's problem (the authentication sequencer wraps `fetch_code`
//! in the retry helper).

use crate::config::OtpConfig;
use crate::error::{CodeRetrievalError, Error, Result};
use crate::mailbox::{Mailbox, SearchCriteria};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Retrieves one-time codes from a mailbox
pub struct OtpRetriever {
    mailbox: Arc<dyn Mailbox>,
    criteria: SearchCriteria,
    patterns: Vec<Regex>,
}

impl OtpRetriever {
    /// Create a retriever for the given mailbox and OTP settings
    ///
    /// The pattern list is compiled up front; an invalid pattern is a
    /// configuration error here, not a retrieval error later.
    pub fn new(mailbox: Arc<dyn Mailbox>, config: &OtpConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::config_key(format!("invalid code pattern {p:?}: {e}"), "otp.patterns")
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            mailbox,
            criteria: SearchCriteria {
                from: config.sender.clone(),
                subject: config.subject.clone(),
            },
            patterns,
        })
    }

    /// Fetch a one-time code from the mailbox
    ///
    /// Connects, selects the inbox, searches unread messages against the
    /// sender/subject criteria, and parses the **most recent** match's body
    /// against the pattern list. Older matches are ignored, not deleted or
    /// marked. Each failure mode surfaces as a distinct
    /// [`CodeRetrievalError`] kind.
    pub async fn fetch_code(&self) -> Result<String> {
        let mailbox = Arc::clone(&self.mailbox);
        let criteria = self.criteria.clone();
        let patterns = self.patterns.clone();

        // The mailbox traits are blocking by design; run the whole pass off
        // the async runtime.
        tokio::task::spawn_blocking(move || fetch_code_blocking(&*mailbox, &criteria, &patterns))
            .await
            .map_err(|e| Error::Other(format!("code retrieval task panicked: {e}")))?
    }
}

fn fetch_code_blocking(
    mailbox: &dyn Mailbox,
    criteria: &SearchCriteria,
    patterns: &[Regex],
) -> Result<String> {
    let mut session = mailbox.connect()?;
    session.select_inbox()?;

    let matches = session.search_unseen(criteria)?;
    debug!(matches = matches.len(), "unseen search complete");

    // Only the message with the highest sequence number is inspected
    let latest = matches
        .into_iter()
        .max()
        .ok_or(CodeRetrievalError::NoMatch)?;

    let body = session.fetch_body(latest)?;

    match extract_code(&body, patterns) {
        Some(code) => {
            info!(seq = latest, "verification code extracted");
            Ok(code)
        }
        None => Err(Error::CodeRetrieval(CodeRetrievalError::PatternMismatch {
            patterns_tried: patterns.len(),
        })),
    }
}

/// Try each pattern in order against the body; first capture wins
fn extract_code(body: &str, patterns: &[Regex]) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}
