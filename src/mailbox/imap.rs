//! IMAP-over-TLS mailbox implementation

use crate::config::MailboxConfig;
use crate::error::{CodeRetrievalError, Error, Result};
use crate::mailbox::{Mailbox, MailboxSession, SearchCriteria};
use std::net::TcpStream;
use tracing::debug;

type TlsSession = imap::Session<native_tls::TlsStream<TcpStream>>;

/// IMAP mailbox account (implicit TLS)
///
/// Each [`connect`](Mailbox::connect) call opens a fresh connection; sessions
/// are short-lived, one per code-retrieval attempt.
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    /// Create a mailbox for the given connection parameters
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

impl Mailbox for ImapMailbox {
    fn connect(&self) -> Result<Box<dyn MailboxSession>> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| CodeRetrievalError::Connect(e.to_string()))?;

        debug!(host = self.config.host, port = self.config.port, "connecting to mailbox");

        let client = imap::connect(
            (self.config.host.as_str(), self.config.port),
            self.config.host.as_str(),
            &tls,
        )
        .map_err(|e| CodeRetrievalError::Connect(e.to_string()))?;

        let session = client
            .login(&self.config.username, &self.config.password)
            .map_err(|(e, _client)| CodeRetrievalError::Connect(e.to_string()))?;

        Ok(Box::new(ImapSession { session }))
    }
}

struct ImapSession {
    session: TlsSession,
}

impl MailboxSession for ImapSession {
    fn select_inbox(&mut self) -> Result<()> {
        self.session
            .select("INBOX")
            .map(|_| ())
            .map_err(|e| Error::CodeRetrieval(CodeRetrievalError::OpenInbox(e.to_string())))
    }

    fn search_unseen(&mut self, criteria: &SearchCriteria) -> Result<Vec<u32>> {
        let query = build_search_query(criteria);
        debug!(query, "searching unseen messages");

        let seqs = self
            .session
            .search(&query)
            .map_err(|e| CodeRetrievalError::Search(e.to_string()))?;

        Ok(seqs.into_iter().collect())
    }

    fn fetch_body(&mut self, seq: u32) -> Result<String> {
        // BODY.PEEK keeps the message unread; older matches are never marked
        let messages = self
            .session
            .fetch(seq.to_string(), "BODY.PEEK[]")
            .map_err(|e| CodeRetrievalError::Fetch(e.to_string()))?;

        let message = messages
            .iter()
            .next()
            .ok_or_else(|| CodeRetrievalError::Fetch(format!("message {seq} not returned")))?;

        let raw = message
            .body()
            .ok_or_else(|| CodeRetrievalError::Fetch(format!("message {seq} has no body")))?;

        extract_text(raw)
    }
}

impl Drop for ImapSession {
    fn drop(&mut self) {
        // Best effort; the server reaps dropped connections anyway
        self.session.logout().ok();
    }
}

/// Build an IMAP SEARCH query from the criteria
fn build_search_query(criteria: &SearchCriteria) -> String {
    let mut query = String::from("UNSEEN");
    if let Some(from) = &criteria.from {
        query.push_str(&format!(" FROM \"{from}\""));
    }
    if let Some(subject) = &criteria.subject {
        query.push_str(&format!(" SUBJECT \"{subject}\""));
    }
    query
}

/// Pull the plain-text body out of a raw RFC 822 message
///
/// Multipart messages prefer the first `text/plain` part; a top-level text
/// body is used as-is. HTML-only messages fall back to the first part's
/// decoded body, which is still searchable by the extraction patterns.
fn extract_text(raw: &[u8]) -> Result<String> {
    let parsed =
        mailparse::parse_mail(raw).map_err(|e| CodeRetrievalError::Fetch(e.to_string()))?;

    let body_of = |part: &mailparse::ParsedMail<'_>| {
        part.get_body()
            .map_err(|e| Error::CodeRetrieval(CodeRetrievalError::Fetch(e.to_string())))
    };

    if parsed.subparts.is_empty() {
        return body_of(&parsed);
    }

    if let Some(plain) = parsed
        .subparts
        .iter()
        .find(|p| p.ctype.mimetype.eq_ignore_ascii_case("text/plain"))
    {
        return body_of(plain);
    }

    body_of(&parsed.subparts[0])
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_includes_sender_filter() {
        let criteria = SearchCriteria {
            from: Some("noreply@signin.autodesk.com".into()),
            subject: None,
        };
        assert_eq!(
            build_search_query(&criteria),
            "UNSEEN FROM \"noreply@signin.autodesk.com\""
        );
    }

    #[test]
    fn search_query_includes_subject_filter() {
        let criteria = SearchCriteria {
            from: Some("noreply@example.com".into()),
            subject: Some("verification".into()),
        };
        assert_eq!(
            build_search_query(&criteria),
            "UNSEEN FROM \"noreply@example.com\" SUBJECT \"verification\""
        );
    }

    #[test]
    fn search_query_without_filters_is_unseen_only() {
        assert_eq!(build_search_query(&SearchCriteria::default()), "UNSEEN");
    }

    #[test]
    fn extract_text_reads_simple_message() {
        let raw = b"From: a@example.com\r\nSubject: hi\r\nContent-Type: text/plain\r\n\r\nCode: 482913\r\n";
        let body = extract_text(raw).unwrap();
        assert!(body.contains("Code: 482913"));
    }

    #[test]
    fn extract_text_prefers_plain_part_of_multipart() {
        let raw = concat!(
            "From: a@example.com\r\n",
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>Code: 000000</p>\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Code: 482913\r\n",
            "--b--\r\n",
        )
        .as_bytes();

        let body = extract_text(raw).unwrap();
        assert!(body.contains("Code: 482913"));
        assert!(!body.contains("000000"));
    }
}
