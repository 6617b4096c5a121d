//! Auth session manager: device-code state machine and token lifecycle.
//!
//! ```text
//!  Unauthenticated ──begin_login──▶ DeviceCodePending ──granted──▶ Authenticated
//!         ▲                           │  ▲  pending/slow_down        │
//!         │     timeout/declined/     │  └──────────┘                │ now >= expires_at
//!         └──────── cancelled ────────┘                              ▼
//!         ◀──────────── refresh rejected (silent) ────────────── Expired
//!                                                                    │ refresh ok
//!                                                                    ▼
//!                                                              Authenticated
//! ```
//!
//! The session lives in memory for the process lifetime only. Every
//! operation that talks to the identity provider runs under one async
//! guard, so concurrent callers share a single refresh or poll loop and a
//! device code is never requested twice for the same sign-in. A refresh
//! that fails with a network, throttling or server error leaves the expired
//! session in place so the next call can try again.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, DeviceCodeGrant, IdentityProvider, PollOutcome, TokenGrant, TokenSource};

use super::oauth::account_hint_from_id_token;

/// Tokens are treated as expired this long before their real expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Added to the poll interval on every `slow_down` answer.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Assumed access token lifetime when the provider does not say.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Called with the code and URL the user must act on.
pub type PromptHandler = Arc<dyn Fn(&DeviceCodePrompt) + Send + Sync>;

/// What the user needs to finish a device-code sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodePrompt {
    pub user_code: String,
    pub verification_uri: String,
    /// Instruction text from the provider, if any.
    pub message: Option<String>,
    /// Remaining lifetime of the code when the prompt was built.
    pub expires_in: Duration,
}

impl DeviceCodePrompt {
    /// Text to show the user.
    pub fn instructions(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!(
                "To sign in, open {} and enter the code {}",
                self.verification_uri, self.user_code
            ),
        }
    }
}

/// An authenticated session.
#[derive(Clone)]
pub struct AuthSession {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
    account_hint: Option<String>,
}

impl AuthSession {
    fn from_grant(grant: TokenGrant, previous: Option<&AuthSession>, margin: Duration) -> Self {
        let lifetime = grant
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let account_hint = grant
            .id_token
            .as_deref()
            .and_then(account_hint_from_id_token)
            .or_else(|| previous.and_then(|p| p.account_hint.clone()));
        // Refresh responses may omit the refresh token; keep the old one then.
        let refresh_token = grant
            .refresh_token
            .or_else(|| previous.and_then(|p| p.refresh_token.clone()));

        Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: Instant::now() + lifetime.saturating_sub(margin),
            account_hint,
        }
    }

    /// Returns true once `now >= expires_at`.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Time left before the token must be refreshed.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn account_hint(&self) -> Option<&str> {
        self.account_hint.as_deref()
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("remaining", &self.remaining())
            .field("account_hint", &self.account_hint)
            .finish()
    }
}

/// Externally visible state of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    DeviceCodePending {
        user_code: String,
        verification_uri: String,
    },
    Authenticated {
        account_hint: Option<String>,
        expires_in: Duration,
    },
    Expired {
        account_hint: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct PendingFlow {
    grant: DeviceCodeGrant,
    deadline: Instant,
}

impl PendingFlow {
    fn prompt(&self) -> DeviceCodePrompt {
        DeviceCodePrompt {
            user_code: self.grant.user_code.clone(),
            verification_uri: self.grant.verification_uri.clone(),
            message: self.grant.message.clone(),
            expires_in: self.deadline.saturating_duration_since(Instant::now()),
        }
    }
}

/// `Expired` is not stored; it is an `Authenticated` session past its expiry.
#[derive(Debug)]
enum AuthState {
    Unauthenticated,
    DeviceCodePending(PendingFlow),
    Authenticated(AuthSession),
}

/// Whether an operation may start a new device-code prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interaction {
    Silent,
    Interactive,
}

/// Owns the single authentication session of the process.
pub struct AuthSessionManager {
    identity: Arc<dyn IdentityProvider>,
    state: Mutex<AuthState>,
    /// Held for the whole duration of any refresh or device-code poll.
    in_flight: AsyncMutex<()>,
    prompt_handler: Option<PromptHandler>,
    cancel_tx: watch::Sender<u64>,
    expiry_margin: Duration,
}

impl AuthSessionManager {
    /// Creates a manager in the `Unauthenticated` state.
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        let (cancel_tx, _) = watch::channel(0);
        Self {
            identity,
            state: Mutex::new(AuthState::Unauthenticated),
            in_flight: AsyncMutex::new(()),
            prompt_handler: None,
            cancel_tx,
            expiry_margin: DEFAULT_EXPIRY_MARGIN,
        }
    }

    /// Builder method to set the callback that displays device codes.
    pub fn with_prompt_handler(mut self, handler: PromptHandler) -> Self {
        self.prompt_handler = Some(handler);
        self
    }

    /// Builder method to set the expiry safety margin.
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: AuthState) {
        *self.state() = state;
    }

    /// Returns the current token if it is still valid.
    fn valid_token(&self) -> Option<String> {
        match &*self.state() {
            AuthState::Authenticated(session) if !session.is_expired() => {
                Some(session.access_token.clone())
            }
            _ => None,
        }
    }

    /// Returns the current state without touching the network.
    pub fn status(&self) -> AuthStatus {
        match &*self.state() {
            AuthState::Unauthenticated => AuthStatus::Unauthenticated,
            AuthState::DeviceCodePending(flow) => AuthStatus::DeviceCodePending {
                user_code: flow.grant.user_code.clone(),
                verification_uri: flow.grant.verification_uri.clone(),
            },
            AuthState::Authenticated(session) if session.is_expired() => AuthStatus::Expired {
                account_hint: session.account_hint.clone(),
            },
            AuthState::Authenticated(session) => AuthStatus::Authenticated {
                account_hint: session.account_hint.clone(),
                expires_in: session.remaining(),
            },
        }
    }

    /// Returns the signed-in account, if known.
    pub fn account_hint(&self) -> Option<String> {
        match &*self.state() {
            AuthState::Authenticated(session) => session.account_hint.clone(),
            _ => None,
        }
    }

    /// Starts a device-code sign-in and returns the code and URL to display.
    ///
    /// If a sign-in is already pending its prompt is returned again instead
    /// of requesting a second code. Polling happens in
    /// [`complete_login`](Self::complete_login).
    #[instrument(skip(self))]
    pub async fn begin_login(&self) -> ProviderResult<DeviceCodePrompt> {
        let _guard = self.in_flight.lock().await;

        if let AuthState::DeviceCodePending(flow) = &*self.state() {
            if Instant::now() < flow.deadline {
                debug!("reusing pending device code");
                return Ok(flow.prompt());
            }
        }

        let flow = self.start_device_code().await?;
        Ok(flow.prompt())
    }

    /// Waits for the pending sign-in to complete.
    ///
    /// Returns immediately if already authenticated.
    ///
    /// # Errors
    ///
    /// `AuthRequired` if no sign-in was started, `AuthTimeout` if the code
    /// expired, `AuthCancelled` if [`cancel`](Self::cancel) was called.
    #[instrument(skip(self))]
    pub async fn complete_login(&self) -> ProviderResult<String> {
        let _guard = self.in_flight.lock().await;
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }
        match self.pending_flow() {
            Some(flow) => self.poll_until_done(flow).await,
            None => Err(ProviderError::auth_required("no sign-in is pending").with_provider("auth")),
        }
    }

    /// Returns a valid token, signing the user in if needed.
    ///
    /// An expired session is refreshed silently first; if that fails the
    /// user is prompted with a new device code.
    #[instrument(skip(self))]
    pub async fn ensure_authenticated(&self) -> ProviderResult<String> {
        self.acquire(Interaction::Interactive, None).await
    }

    /// Returns a valid token without ever prompting.
    ///
    /// Refreshes an expired session; joins a sign-in that is already
    /// pending. Fails with `AuthRequired` when neither is possible.
    pub async fn get_token(&self) -> ProviderResult<String> {
        self.acquire(Interaction::Silent, None).await
    }

    /// Forces a silent refresh unless the rejected token was already
    /// replaced by another caller.
    pub async fn refresh_rejected(&self, rejected: &str) -> ProviderResult<String> {
        self.acquire(Interaction::Silent, Some(rejected)).await
    }

    /// Cancels a pending device-code sign-in.
    ///
    /// A running poll loop stops with `AuthCancelled`; an authenticated
    /// session is left untouched.
    pub fn cancel(&self) {
        {
            let mut state = self.state();
            if matches!(*state, AuthState::DeviceCodePending(_)) {
                *state = AuthState::Unauthenticated;
            }
        }
        self.cancel_tx.send_modify(|generation| *generation += 1);
        info!("sign-in cancelled");
    }

    /// Drops the session.
    pub fn sign_out(&self) {
        self.set_state(AuthState::Unauthenticated);
    }

    async fn acquire(&self, interaction: Interaction, rejected: Option<&str>) -> ProviderResult<String> {
        let is_rejected = |token: &str| rejected == Some(token);

        if let Some(token) = self.valid_token().filter(|t| !is_rejected(t)) {
            return Ok(token);
        }

        let _guard = self.in_flight.lock().await;

        // Another caller may have finished a refresh or sign-in meanwhile.
        if let Some(token) = self.valid_token().filter(|t| !is_rejected(t)) {
            debug!("token was renewed by another caller");
            return Ok(token);
        }

        let previous = match &*self.state() {
            AuthState::Authenticated(session) => Some(session.clone()),
            _ => None,
        };

        if let Some(previous) = previous {
            match self.refresh_session(&previous).await {
                Ok(token) => return Ok(token),
                // Transient failures keep the refresh token for the next attempt.
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "token refresh failed, keeping session");
                    return Err(err);
                }
                Err(err) if interaction == Interaction::Silent => {
                    self.set_state(AuthState::Unauthenticated);
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "silent refresh failed, signing in again");
                    self.set_state(AuthState::Unauthenticated);
                }
            }
        }

        if let Some(flow) = self.pending_flow() {
            return self.poll_until_done(flow).await;
        }

        match interaction {
            Interaction::Silent => Err(ProviderError::auth_required(
                "not signed in; run the sign-in flow first",
            )
            .with_provider("auth")),
            Interaction::Interactive => {
                let flow = self.start_device_code().await?;
                self.poll_until_done(flow).await
            }
        }
    }

    fn pending_flow(&self) -> Option<PendingFlow> {
        match &*self.state() {
            AuthState::DeviceCodePending(flow) => Some(flow.clone()),
            _ => None,
        }
    }

    async fn refresh_session(&self, previous: &AuthSession) -> ProviderResult<String> {
        let Some(refresh_token) = previous.refresh_token.as_deref() else {
            return Err(ProviderError::auth_required("session expired and cannot be refreshed")
                .with_provider("auth"));
        };

        debug!("refreshing expired session");
        let grant = self.identity.refresh(refresh_token).await.map_err(|err| {
            if err.code().requires_login() || err.is_retryable() {
                err
            } else {
                ProviderError::auth_required(format!("token refresh failed: {}", err.message()))
                    .with_provider("auth")
                    .with_source(err)
            }
        })?;

        let session = AuthSession::from_grant(grant, Some(previous), self.expiry_margin);
        let token = session.access_token.clone();
        self.set_state(AuthState::Authenticated(session));
        Ok(token)
    }

    /// Requests a device code, records it as pending and shows the prompt.
    async fn start_device_code(&self) -> ProviderResult<PendingFlow> {
        let grant = self.identity.request_device_code().await?;
        let flow = PendingFlow {
            deadline: Instant::now() + grant.expires_in,
            grant,
        };
        self.set_state(AuthState::DeviceCodePending(flow.clone()));
        info!(verification_uri = %flow.grant.verification_uri, "device code issued");

        if let Some(handler) = &self.prompt_handler {
            handler(&flow.prompt());
        }
        Ok(flow)
    }

    async fn poll_until_done(&self, flow: PendingFlow) -> ProviderResult<String> {
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut interval = flow.grant.interval;
        let mut polls = 0u32;

        loop {
            let remaining = flow.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.set_state(AuthState::Unauthenticated);
                return Err(ProviderError::auth_timeout(
                    "device code expired before sign-in completed",
                )
                .with_provider("auth"));
            }

            tokio::select! {
                _ = tokio::time::sleep(interval.min(remaining)) => {}
                _ = cancel_rx.changed() => {
                    self.set_state(AuthState::Unauthenticated);
                    return Err(ProviderError::auth_cancelled("sign-in was cancelled").with_provider("auth"));
                }
            }

            if Instant::now() >= flow.deadline {
                continue;
            }

            polls += 1;
            let outcome = match self.identity.poll_device_code(&flow.grant.device_code).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, polls, "device code poll failed, retrying");
                    continue;
                }
                Err(err) => {
                    self.set_state(AuthState::Unauthenticated);
                    return Err(err);
                }
            };

            match outcome {
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => {
                    interval += SLOW_DOWN_STEP;
                    debug!(interval_secs = interval.as_secs(), "identity provider asked to slow down");
                }
                PollOutcome::Granted(grant) => {
                    let session = AuthSession::from_grant(grant, None, self.expiry_margin);
                    let token = session.access_token.clone();
                    info!(account = ?session.account_hint, polls, "signed in");
                    self.set_state(AuthState::Authenticated(session));
                    return Ok(token);
                }
                PollOutcome::Declined => {
                    self.set_state(AuthState::Unauthenticated);
                    return Err(ProviderError::auth_required("sign-in was declined").with_provider("auth"));
                }
                PollOutcome::Expired => {
                    self.set_state(AuthState::Unauthenticated);
                    return Err(ProviderError::auth_timeout("device code expired").with_provider("auth"));
                }
            }
        }
    }
}

impl TokenSource for AuthSessionManager {
    fn get_token(&self) -> BoxFuture<'_, ProviderResult<String>> {
        Box::pin(AuthSessionManager::get_token(self))
    }

    fn ensure_valid<'a>(&'a self, rejected: &'a str) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(self.refresh_rejected(rejected))
    }
}
