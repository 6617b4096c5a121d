//! Settings for the Microsoft identity platform and the Graph API.

use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};

/// Default identity platform host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Default Graph API root.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Delegated permissions needed to read meetings and transcripts and to send
/// mail as the signed-in user.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "profile",
    "offline_access",
    "User.Read",
    "OnlineMeetings.Read",
    "OnlineMeetingTranscript.Read.All",
    "Mail.Send",
];

/// Application registration used for device-code sign-in.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Application (client) id of the app registration.
    pub client_id: String,
    /// Directory (tenant) id, or `common` / `organizations`.
    pub tenant_id: String,
    pub scopes: Vec<String>,
    /// Identity platform host; tests point this at a local server.
    pub authority: String,
    pub timeout: Duration,
}

impl IdentityConfig {
    pub fn new(client_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authority: DEFAULT_AUTHORITY.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Builder method to replace the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        if !scopes.is_empty() {
            self.scopes = scopes;
        }
        self
    }

    /// Builder method to set the identity platform host.
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Space-separated scope string for form parameters.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// `{authority}/{tenant}/oauth2/v2.0/{endpoint}`
    pub fn endpoint(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/oauth2/v2.0/{}",
            self.authority.trim_end_matches('/'),
            self.tenant_id,
            endpoint
        )
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(ProviderError::configuration(
                "microsoft client_id is required (set AZURE_CLIENT_ID)",
            ));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ProviderError::configuration(
                "microsoft tenant_id is required (set AZURE_TENANT_ID)",
            ));
        }
        Ok(())
    }
}

/// Graph API client settings.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Total attempts per call on 429/5xx, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    pub initial_backoff: Duration,
    /// Delay ceiling, also applied to `Retry-After`.
    pub max_backoff: Duration,
    /// Keep a copy of sent summaries in the user's Sent Items.
    pub save_to_sent_items: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            save_to_sent_items: true,
        }
    }
}

impl GraphConfig {
    /// Builder method to set the API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builder method to set the attempt ceiling (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder method to set the initial backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }
}
