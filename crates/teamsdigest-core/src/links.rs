//! Teams meeting link resolution.
//!
//! This module turns a link that a human copied out of an invite, a chat or
//! a calendar entry into a [`MeetingReference`]:
//! - Unwraps Microsoft Outlook SafeLinks
//! - Unwraps the Teams web launcher (`/dl/launcher/launcher.html?url=...`)
//! - Extracts and URL-decodes the thread identifier from the `meetup-join` path
//! - Extracts the organizer (`Oid`) and tenant (`Tid`) from the `context` parameter
//! - Builds a canonical join URL with tracking noise removed
//!
//! Resolution is a pure function: it never touches the network.
//!
//! # Example
//!
//! ```
//! use teamsdigest_core::links::resolve_link;
//!
//! let link = "https://teams.microsoft.com/l/meetup-join/19%3ameeting_abc123%40thread.v2/0?context=%7b%22Tid%22%3a%22t1%22%2c%22Oid%22%3a%22o1%22%7d";
//! let reference = resolve_link(link).unwrap();
//! assert_eq!(reference.thread_id, "19:meeting_abc123@thread.v2");
//! assert_eq!(reference.organizer_id.as_deref(), Some("o1"));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::MeetingReference;

/// Regex for finding a URL inside pasted text.
static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\)\]]+"#).expect("Invalid URL regex"));

/// Regex for detecting Microsoft Outlook SafeLinks.
///
/// SafeLinks wrap the original URL in a redirect through `safelinks.protection.outlook.com`.
/// The original URL is encoded in the `url` query parameter.
static SAFELINK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[^/]*safelinks\.protection\.outlook\.com/?\?[^?]*url=([^&]+)")
        .expect("Invalid SafeLink regex")
});

/// A decoded Teams thread identifier, e.g. `19:meeting_XXXX@thread.v2`.
static THREAD_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^19:[^/\s]+@thread\.(v2|skype|tacv2)$").expect("Invalid thread id regex")
});

/// Hosts that serve Teams meeting join links.
const TEAMS_HOSTS: &[&str] = &[
    "teams.microsoft.com",
    "teams.live.com",
    "teams.microsoft.us",
    "gov.teams.microsoft.us",
    "dod.teams.microsoft.us",
];

/// Path segment that precedes the thread identifier.
const MEETUP_JOIN: &str = "meetup-join";

/// Why a link could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Nothing was supplied.
    #[error("meeting link is empty")]
    Empty,

    /// The input is not a parseable URL.
    #[error("not a valid URL: {0}")]
    Malformed(String),

    /// The URL does not point at Microsoft Teams.
    #[error("not a Microsoft Teams link (host: {0})")]
    NotTeams(String),

    /// The URL is a Teams link but carries no meeting thread segment.
    #[error("link has no meeting thread identifier; copy the full 'Join meeting' link from the invite")]
    MissingThread,
}

/// Organizer/tenant context embedded in join links as URL-encoded JSON.
#[derive(Debug, Default, Deserialize)]
struct LinkContext {
    #[serde(rename = "Tid")]
    tid: Option<String>,
    #[serde(rename = "Oid")]
    oid: Option<String>,
}

/// Resolves Teams join links into meeting references.
#[derive(Debug, Default)]
pub struct LinkResolver;

impl LinkResolver {
    /// Creates a new link resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a raw link (or text containing one) into a [`MeetingReference`].
    ///
    /// The returned reference always has a non-empty `thread_id`; `meeting_id`
    /// is left unset until the meetings API has been queried.
    pub fn resolve(&self, raw_link: &str) -> Result<MeetingReference, LinkError> {
        let trimmed = raw_link.trim();
        if trimmed.is_empty() {
            return Err(LinkError::Empty);
        }

        let candidate = extract_candidate(trimmed);
        let unwrapped = unwrap_safelink(&candidate);

        let mut parsed =
            Url::parse(&unwrapped).map_err(|e| LinkError::Malformed(format!("{}: {}", e, unwrapped)))?;

        let host = parsed
            .host_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| LinkError::Malformed(unwrapped.clone()))?;
        if !TEAMS_HOSTS.contains(&host.as_str()) {
            return Err(LinkError::NotTeams(host));
        }

        if parsed.path().starts_with("/dl/launcher/") {
            parsed = unwrap_launcher(&parsed, &host).ok_or(LinkError::MissingThread)?;
        }

        let (raw_segment, tail) = thread_segment(&parsed).ok_or(LinkError::MissingThread)?;
        let thread_id = urlencoding::decode(&raw_segment)
            .map_err(|e| LinkError::Malformed(format!("thread segment is not UTF-8: {}", e)))?
            .into_owned();

        if !THREAD_ID_REGEX.is_match(&thread_id) {
            debug!(thread_id = %thread_id, "segment after meetup-join is not a thread id");
            return Err(LinkError::MissingThread);
        }

        let raw_context = raw_query_value(&parsed, "context");
        let context = parsed
            .query_pairs()
            .find(|(key, _)| key == "context")
            .and_then(|(_, value)| {
                serde_json::from_str::<LinkContext>(&value)
                    .map_err(|e| debug!("ignoring unparseable link context: {}", e))
                    .ok()
            })
            .unwrap_or_default();

        let mut join_url = format!(
            "https://{}/l/{}/{}/{}",
            host,
            MEETUP_JOIN,
            encode_thread_id(&thread_id),
            tail
        );
        if let Some(ctx) = raw_context {
            join_url.push_str("?context=");
            join_url.push_str(&ctx);
        }

        Ok(MeetingReference {
            raw_link: raw_link.to_string(),
            join_url,
            thread_id,
            organizer_id: context.oid.filter(|s| !s.is_empty()),
            tenant_id: context.tid.filter(|s| !s.is_empty()),
            meeting_id: None,
        })
    }
}

/// Convenience function to resolve a single link.
///
/// See [`LinkResolver::resolve`] for details.
pub fn resolve_link(raw_link: &str) -> Result<MeetingReference, LinkError> {
    LinkResolver::new().resolve(raw_link)
}

/// Picks the URL out of the input.
///
/// Input that already starts with a scheme is taken whole, because decoded
/// Teams links contain quotes that would end a regex match early. Scheme-less
/// Teams links get `https://` prepended.
fn extract_candidate(input: &str) -> String {
    if input.starts_with("http://") || input.starts_with("https://") {
        return input.split_whitespace().next().unwrap_or(input).to_string();
    }
    if let Some(m) = URL_REGEX.find(input) {
        return m.as_str().to_string();
    }
    if input.starts_with("teams.") {
        return format!("https://{}", input);
    }
    input.to_string()
}

/// Unwraps a Microsoft Outlook SafeLink to get the original URL.
///
/// If the URL is not a SafeLink, it is returned unchanged.
fn unwrap_safelink(url: &str) -> String {
    if let Some(caps) = SAFELINK_REGEX.captures(url) {
        if let Some(encoded) = caps.get(1) {
            if let Ok(decoded) = urlencoding::decode(encoded.as_str()) {
                return decoded.into_owned();
            }
        }
    }
    url.to_string()
}

/// Unwraps the Teams web launcher, whose `url` parameter holds a
/// fragment-style path such as `/_#/l/meetup-join/19:...`.
fn unwrap_launcher(parsed: &Url, host: &str) -> Option<Url> {
    let inner = parsed
        .query_pairs()
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())?;
    let start = inner.find("/l/")?;
    Url::parse(&format!("https://{}{}", host, &inner[start..])).ok()
}

/// Returns the still-encoded thread segment and whatever path follows it.
fn thread_segment(parsed: &Url) -> Option<(String, String)> {
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();
    let idx = segments.iter().position(|s| *s == MEETUP_JOIN)?;
    let thread = segments.get(idx + 1)?;
    let tail = segments.get(idx + 2).copied().unwrap_or("0");
    Some((thread.to_string(), tail.to_string()))
}

/// Percent-encodes a thread id the way Teams writes it in join links
/// (`19%3ameeting_...%40thread.v2`, lowercase hex).
fn encode_thread_id(thread_id: &str) -> String {
    let encoded = urlencoding::encode(thread_id);
    let mut out = String::with_capacity(encoded.len());
    let mut hex_left = 0;
    for c in encoded.chars() {
        if hex_left > 0 {
            out.push(c.to_ascii_lowercase());
            hex_left -= 1;
        } else {
            if c == '%' {
                hex_left = 2;
            }
            out.push(c);
        }
    }
    out
}

/// Returns a query parameter exactly as encoded in the URL.
fn raw_query_value(parsed: &Url, key: &str) -> Option<String> {
    parsed.query()?.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key && !v.is_empty()).then(|| v.to_string())
    })
}
