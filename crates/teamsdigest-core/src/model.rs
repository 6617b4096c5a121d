//! Data model shared by every stage of a summary run.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Loose address check: something@domain.tld without whitespace.
static EMAIL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex"));

/// Identifiers needed to look a meeting up in the meetings API.
///
/// Produced by [`crate::links::LinkResolver`]; `meeting_id` is filled in
/// after a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingReference {
    /// The link exactly as supplied.
    pub raw_link: String,
    /// Canonical join URL (unwrapped, tracking parameters removed).
    pub join_url: String,
    /// Decoded thread identifier, e.g. `19:meeting_XXXX@thread.v2`.
    pub thread_id: String,
    /// Organizer object id from the link context, if present.
    pub organizer_id: Option<String>,
    /// Tenant id from the link context, if present.
    pub tenant_id: Option<String>,
    /// Online meeting id, set once the meetings API resolved it.
    pub meeting_id: Option<String>,
}

impl MeetingReference {
    /// Returns a copy with the resolved meeting id recorded.
    #[must_use]
    pub fn with_meeting_id(mut self, meeting_id: impl Into<String>) -> Self {
        self.meeting_id = Some(meeting_id.into());
        self
    }

    /// Returns true if the reference can be used for a meetings API call.
    pub fn is_queryable(&self) -> bool {
        !self.thread_id.trim().is_empty()
    }
}

/// Transcript text of one meeting, as fetched during a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    meeting_id: String,
    raw_text: String,
    fetched_at: DateTime<Utc>,
}

impl Transcript {
    /// Creates a transcript fetched now.
    pub fn new(meeting_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            raw_text: raw_text.into(),
            fetched_at: Utc::now(),
        }
    }

    /// The meeting this transcript belongs to.
    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    /// The flattened transcript text.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// When the transcript was fetched.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Number of whitespace-separated words.
    pub fn word_count(&self) -> usize {
        self.raw_text.split_whitespace().count()
    }

    /// Returns at most `max_chars` characters from the start of the text.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.raw_text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.raw_text[..idx],
            None => &self.raw_text,
        }
    }
}

/// A generated meeting summary, ready to embed in an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Sanitized HTML fragment.
    pub html_body: String,
    /// Meeting the summary was produced from.
    pub source_meeting_id: String,
}

impl Summary {
    /// Creates a summary.
    pub fn new(html_body: impl Into<String>, source_meeting_id: impl Into<String>) -> Self {
        Self {
            html_body: html_body.into(),
            source_meeting_id: source_meeting_id.into(),
        }
    }
}

/// Why a recipient list was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipientError {
    /// No addresses were given.
    #[error("at least one recipient address is required")]
    Empty,

    /// An address does not look like an email address.
    #[error("invalid email address: {0:?}")]
    InvalidAddress(String),

    /// The subject line is blank.
    #[error("email subject must not be empty")]
    EmptySubject,
}

/// Validated, ordered recipient addresses plus the subject line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientList {
    addresses: Vec<String>,
    subject: String,
}

impl RecipientList {
    /// Validates addresses and subject.
    ///
    /// Addresses are trimmed, blanks are skipped and duplicates (compared
    /// case-insensitively) are dropped while keeping the original order.
    pub fn new<I, S>(addresses: I, subject: impl Into<String>) -> Result<Self, RecipientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let subject = subject.into().trim().to_string();
        if subject.is_empty() {
            return Err(RecipientError::EmptySubject);
        }

        let mut seen = std::collections::HashSet::new();
        let mut list = Vec::new();
        for address in addresses {
            let address = address.as_ref().trim();
            if address.is_empty() {
                continue;
            }
            if !EMAIL_REGEX.is_match(address) {
                return Err(RecipientError::InvalidAddress(address.to_string()));
            }
            if seen.insert(address.to_ascii_lowercase()) {
                list.push(address.to_string());
            }
        }

        if list.is_empty() {
            return Err(RecipientError::Empty);
        }

        Ok(Self {
            addresses: list,
            subject,
        })
    }

    /// Parses a comma- or semicolon-separated address list.
    pub fn parse(list: &str, subject: impl Into<String>) -> Result<Self, RecipientError> {
        Self::new(list.split([',', ';']), subject)
    }

    /// The validated addresses, in order.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// The subject line.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
