//! Error types for the identity, meetings, mail and generation collaborators.
//!
//! Every collaborator reports failures as a [`ProviderError`]. The
//! [`ProviderErrorCode`] carries the kind so callers can tell user-facing
//! conditions (permission denied, transcript not ready) apart from
//! transport problems that the Graph client retries on its own.

use std::fmt;

use teamsdigest_core::LinkError;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// The meeting link could not be parsed.
    InvalidLink,
    /// The device code expired before the user completed sign-in.
    AuthTimeout,
    /// No valid credential is available; the user must sign in again.
    AuthRequired,
    /// The pending sign-in was cancelled by the caller.
    AuthCancelled,
    /// The meeting does not exist or is not visible to the user (404).
    MeetingNotFound,
    /// The user or application lacks permission (403).
    PermissionDenied,
    /// No transcript is available yet for the meeting.
    TranscriptUnavailable,
    /// The generation API failed to produce a summary.
    Summarization,
    /// The mail could not be sent.
    MailSend,
    /// Connection failed, timed out or DNS did not resolve.
    Network,
    /// Too many requests (429).
    RateLimited,
    /// The server answered with a 5xx status.
    ServerError,
    /// The server answered with something we could not parse.
    InvalidResponse,
    /// The request was rejected as malformed (other 4xx).
    BadRequest,
    /// Missing or invalid configuration.
    Configuration,
    /// Unexpected internal state.
    Internal,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the call may be retried
    /// automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::ServerError)
    }

    /// Returns true if the user can reasonably try the same run again later.
    pub fn is_user_retryable(&self) -> bool {
        matches!(
            self,
            Self::TranscriptUnavailable | Self::Summarization | Self::MailSend
        ) || self.is_retryable()
    }

    /// Returns true if the user has to sign in (again) to continue.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired | Self::AuthTimeout | Self::AuthCancelled
        )
    }

    /// Returns a stable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidLink => "invalid_link",
            Self::AuthTimeout => "auth_timeout",
            Self::AuthRequired => "auth_required",
            Self::AuthCancelled => "auth_cancelled",
            Self::MeetingNotFound => "meeting_not_found",
            Self::PermissionDenied => "permission_denied",
            Self::TranscriptUnavailable => "transcript_unavailable",
            Self::Summarization => "summarization_failed",
            Self::MailSend => "mail_send_failed",
            Self::Network => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::BadRequest => "bad_request",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by one of the external collaborators.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The collaborator that raised the error (e.g. "graph", "identity").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn invalid_link(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidLink, message)
    }

    pub fn auth_timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthTimeout, message)
    }

    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthRequired, message)
    }

    pub fn auth_cancelled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthCancelled, message)
    }

    pub fn meeting_not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MeetingNotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::PermissionDenied, message)
    }

    pub fn transcript_unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::TranscriptUnavailable, message)
    }

    pub fn summarization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Summarization, message)
    }

    pub fn mail_send(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MailSend, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Internal, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns a copy with the same code, message and provider.
    ///
    /// The source chain is not cloneable and is dropped.
    pub fn duplicate(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            source: None,
        }
    }

    /// Returns a copy with a different code, keeping message and provider.
    #[must_use]
    pub fn recode(mut self, code: ProviderErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<LinkError> for ProviderError {
    fn from(err: LinkError) -> Self {
        ProviderError::invalid_link(err.to_string()).with_source(err)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_codes_are_retryable() {
        assert!(ProviderErrorCode::Network.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::MeetingNotFound.is_retryable());
        assert!(!ProviderErrorCode::TranscriptUnavailable.is_retryable());
        assert!(!ProviderErrorCode::BadRequest.is_retryable());
    }

    #[test]
    fn user_retryable_codes() {
        assert!(ProviderErrorCode::TranscriptUnavailable.is_user_retryable());
        assert!(ProviderErrorCode::Summarization.is_user_retryable());
        assert!(!ProviderErrorCode::PermissionDenied.is_user_retryable());
        assert!(!ProviderErrorCode::InvalidLink.is_user_retryable());
    }

    #[test]
    fn login_codes() {
        assert!(ProviderErrorCode::AuthRequired.requires_login());
        assert!(ProviderErrorCode::AuthTimeout.requires_login());
        assert!(!ProviderErrorCode::MailSend.requires_login());
    }

    #[test]
    fn error_display() {
        let err = ProviderError::rate_limited("too many requests").with_provider("graph");
        let display = format!("{}", err);
        assert!(display.contains("[graph]"));
        assert!(display.contains("rate_limited"));
        assert!(display.contains("too many requests"));
    }

    #[test]
    fn link_error_converts_to_invalid_link() {
        use std::error::Error;
        let err: ProviderError = LinkError::Empty.into();
        assert_eq!(err.code(), ProviderErrorCode::InvalidLink);
        assert!(err.source().is_some());
    }

    #[test]
    fn duplicate_and_recode() {
        let err = ProviderError::server("boom").with_provider("graph");
        let copy = err.duplicate().recode(ProviderErrorCode::MailSend);
        assert_eq!(copy.code(), ProviderErrorCode::MailSend);
        assert_eq!(copy.message(), "boom");
        assert_eq!(copy.provider(), Some("graph"));
        assert_eq!(err.code(), ProviderErrorCode::ServerError);
    }
}
