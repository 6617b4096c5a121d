//! Microsoft identity platform and Graph API.
//!
//! # Features
//!
//! - Device-code sign-in with a cancellable poll loop
//! - In-memory session with silent refresh before expiry
//! - Meeting lookup by join URL, transcript download as WebVTT
//! - Mail send as the signed-in user
//! - Bounded exponential backoff on throttling and server errors
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use teamsdigest_providers::microsoft::{
//!     AuthSessionManager, GraphClient, GraphConfig, IdentityConfig, MicrosoftIdentity,
//! };
//!
//! let identity = MicrosoftIdentity::new(IdentityConfig::new(client_id, tenant_id))?;
//! let auth = Arc::new(AuthSessionManager::new(Arc::new(identity)));
//! let prompt = auth.begin_login().await?;
//! println!("{}", prompt.instructions());
//! auth.complete_login().await?;
//!
//! let graph = GraphClient::new(GraphConfig::default(), auth.clone())?;
//! let meeting_id = graph.resolve_meeting(&reference).await?;
//! ```

mod config;
mod graph;
mod oauth;
mod retry;
mod session;

pub use config::{
    DEFAULT_AUTHORITY, DEFAULT_GRAPH_BASE_URL, DEFAULT_SCOPES, GraphConfig, IdentityConfig,
};
pub use graph::GraphClient;
pub use oauth::{MicrosoftIdentity, account_hint_from_id_token};
pub use retry::{RetryOn, RetryPolicy, parse_retry_after};
pub use session::{
    AuthSession, AuthSessionManager, AuthStatus, DEFAULT_EXPIRY_MARGIN, DeviceCodePrompt,
    PromptHandler,
};
