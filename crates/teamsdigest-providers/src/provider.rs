//! Trait seams between the pipeline and its external collaborators.
//!
//! - [`IdentityProvider`]: device-code sign-in and token refresh
//! - [`TokenSource`]: hands out access tokens for outbound calls
//! - [`MeetingGraph`]: meeting lookup, transcript download, mail send
//! - [`GenerationBackend`]: one prompt-completion call
//!
//! Methods return [`BoxFuture`] so the traits stay object-safe and can be
//! injected as `Arc<dyn Trait>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use teamsdigest_core::{MeetingReference, RecipientList, Summary, Transcript};

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A device code issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodeGrant {
    /// Opaque code used when polling the token endpoint.
    pub device_code: String,
    /// Code the user types on the verification page.
    pub user_code: String,
    /// Page where the user enters the code.
    pub verification_uri: String,
    /// Ready-made instruction text from the provider, if any.
    pub message: Option<String>,
    /// How long the code stays valid.
    pub expires_in: Duration,
    /// Minimum wait between two polls.
    pub interval: Duration,
}

/// Tokens returned by a successful exchange or refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: Option<u64>,
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Result of one poll of the token endpoint during a device-code flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user has not finished signing in yet.
    Pending,
    /// Polling too fast; the interval must grow.
    SlowDown,
    /// The user signed in.
    Granted(TokenGrant),
    /// The user declined the request.
    Declined,
    /// The device code expired on the provider side.
    Expired,
}

/// Device-code OAuth identity provider.
pub trait IdentityProvider: Send + Sync {
    /// Returns the provider name (e.g., "microsoft").
    fn name(&self) -> &str;

    /// Requests a new device code and verification URL.
    fn request_device_code(&self) -> BoxFuture<'_, ProviderResult<DeviceCodeGrant>>;

    /// Polls the token endpoint once for the given device code.
    fn poll_device_code<'a>(
        &'a self,
        device_code: &'a str,
    ) -> BoxFuture<'a, ProviderResult<PollOutcome>>;

    /// Exchanges a refresh token for a new access token.
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenGrant>>;
}

/// Source of access tokens for authenticated calls.
pub trait TokenSource: Send + Sync {
    /// Returns a token valid for at least one outbound call.
    ///
    /// Never prompts the user; fails with `AuthRequired` instead.
    fn get_token(&self) -> BoxFuture<'_, ProviderResult<String>>;

    /// Called after the API rejected `rejected` with 401.
    ///
    /// Attempts one silent refresh (unless another caller already replaced
    /// the token) and returns the new token, or fails with `AuthRequired`.
    fn ensure_valid<'a>(&'a self, rejected: &'a str) -> BoxFuture<'a, ProviderResult<String>>;
}

/// The meetings, transcript and mail API.
pub trait MeetingGraph: Send + Sync {
    /// Looks the meeting up and returns its online meeting id.
    fn resolve_meeting<'a>(
        &'a self,
        reference: &'a MeetingReference,
    ) -> BoxFuture<'a, ProviderResult<String>>;

    /// Downloads the most recent transcript of the meeting.
    fn fetch_transcript<'a>(
        &'a self,
        meeting_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Transcript>>;

    /// Sends the summary's HTML body to the recipients.
    fn send_mail<'a>(
        &'a self,
        recipients: &'a RecipientList,
        summary: &'a Summary,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// A prompt-completion API.
pub trait GenerationBackend: Send + Sync {
    /// Returns the backend name (e.g., "openai").
    fn name(&self) -> &str;

    /// Runs one completion with a system instruction and user content.
    fn generate<'a>(
        &'a self,
        system_prompt: &'a str,
        user_content: &'a str,
    ) -> BoxFuture<'a, ProviderResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_grant_debug_redacts_secrets() {
        let grant = TokenGrant {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_in: Some(3600),
            id_token: None,
        };
        let debug = format!("{:?}", grant);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("3600"));
    }
}
