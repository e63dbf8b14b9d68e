//! Mailbox access for one-time-code retrieval
//!
//! The core depends on a capability interface (connect, select inbox, search
//! unseen, fetch body), not on a specific mail protocol client. The
//! production implementation is IMAP over TLS ([`imap::ImapMailbox`]).
//!
//! The traits are deliberately blocking: mail client libraries do blocking
//! network I/O, so the retriever drives a whole connect/search/fetch pass
//! inside `spawn_blocking` rather than pretending each call is async.

pub mod imap;
pub mod otp;

pub use imap::ImapMailbox;
pub use otp::OtpRetriever;

use crate::error::Result;

/// Sender/subject predicate for the unseen-message search
#[derive(Clone, Debug, Default)]
pub struct SearchCriteria {
    /// Required sender address, if any
    pub from: Option<String>,
    /// Required subject substring, if any
    pub subject: Option<String>,
}

/// Capability interface for a mailbox account
pub trait Mailbox: Send + Sync {
    /// Connect and authenticate, returning a live session
    ///
    /// Failure kind: [`CodeRetrievalError::Connect`](crate::error::CodeRetrievalError::Connect).
    fn connect(&self) -> Result<Box<dyn MailboxSession>>;
}

/// One authenticated mailbox session
pub trait MailboxSession: Send {
    /// Open the inbox for searching
    ///
    /// Failure kind: [`CodeRetrievalError::OpenInbox`](crate::error::CodeRetrievalError::OpenInbox).
    fn select_inbox(&mut self) -> Result<()>;

    /// Sequence numbers of unread messages matching the criteria
    ///
    /// Matches are returned unordered; callers pick by sequence number.
    fn search_unseen(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>>;

    /// Fetch the text body of one message by sequence number
    ///
    /// Must not alter message flags: older matches stay unread.
    fn fetch_body(&mut self, seq: u32) -> Result<String>;
}
