//! Device-code OAuth against the Microsoft identity platform.
//!
//! # Flow Overview
//!
//! 1. POST `/devicecode` with the client id and scopes; the response carries
//!    a user code, a verification URL, the code lifetime and poll interval
//! 2. The user opens the URL on any device and enters the code
//! 3. Meanwhile the caller polls `/token` with the device code until the
//!    user finishes, declines, or the code expires
//!
//! Each call here is a single request; the waiting and state handling live
//! in [`super::session::AuthSessionManager`].

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, DeviceCodeGrant, IdentityProvider, PollOutcome, TokenGrant};

use super::config::IdentityConfig;

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Used when the provider omits `interval`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Used when the provider omits `expires_in`.
const DEFAULT_CODE_LIFETIME: Duration = Duration::from_secs(900);

/// Device-code client for the Microsoft identity platform.
#[derive(Debug)]
pub struct MicrosoftIdentity {
    config: IdentityConfig,
    http_client: reqwest::Client,
}

impl MicrosoftIdentity {
    /// Creates a new identity client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the client id or tenant is missing
    /// or the HTTP client cannot be built.
    pub fn new(config: IdentityConfig) -> ProviderResult<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    async fn post_form(&self, endpoint: &str, params: &[(&str, &str)]) -> ProviderResult<(u16, String)> {
        let response = self
            .http_client
            .post(self.config.endpoint(endpoint))
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", endpoint, e))
                    .with_provider("identity")
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_provider("identity")
        })?;
        Ok((status, body))
    }

    async fn request_device_code_impl(&self) -> ProviderResult<DeviceCodeGrant> {
        let scope = self.config.scope_param();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
        ];
        let (status, body) = self.post_form("devicecode", &params).await?;

        if !(200..300).contains(&status) {
            let detail = parse_error_body(&body);
            return Err(ProviderError::configuration(format!(
                "device code request failed ({}): {}",
                status, detail
            ))
            .with_provider("identity"));
        }

        let response: DeviceCodeResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid device code response: {}", e))
                .with_provider("identity")
        })?;

        debug!(
            expires_in = ?response.expires_in,
            interval = ?response.interval,
            "received device code"
        );

        Ok(DeviceCodeGrant {
            device_code: response.device_code,
            user_code: response.user_code,
            verification_uri: response.verification_uri,
            message: response.message,
            expires_in: response
                .expires_in
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CODE_LIFETIME),
            interval: response
                .interval
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
        })
    }

    async fn poll_device_code_impl(&self, device_code: &str) -> ProviderResult<PollOutcome> {
        let params = [
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", self.config.client_id.as_str()),
            ("device_code", device_code),
        ];
        let (status, body) = self.post_form("token", &params).await?;

        if (200..300).contains(&status) {
            let grant = parse_token_response(&body)?;
            info!("device code sign-in completed");
            return Ok(PollOutcome::Granted(grant));
        }

        let error: OAuthErrorResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!(
                "unexpected token endpoint response ({}): {}",
                status, e
            ))
            .with_provider("identity")
        })?;

        match error.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "authorization_declined" | "access_denied" => Ok(PollOutcome::Declined),
            "expired_token" | "code_expired" => Ok(PollOutcome::Expired),
            other if status >= 500 => Err(ProviderError::server(format!(
                "token endpoint error ({}): {}",
                status, other
            ))
            .with_provider("identity")),
            other => Err(ProviderError::auth_required(format!(
                "sign-in failed: {} {}",
                other,
                error.error_description.unwrap_or_default()
            ))
            .with_provider("identity")),
        }
    }

    async fn refresh_impl(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        let scope = self.config.scope_param();
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        let (status, body) = self.post_form("token", &params).await?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::auth_required(format!(
                "token refresh failed ({}): {}",
                status,
                parse_error_body(&body)
            ))
            .with_provider("identity"));
        }

        let grant = parse_token_response(&body)?;
        info!("refreshed access token");
        Ok(grant)
    }
}

impl IdentityProvider for MicrosoftIdentity {
    fn name(&self) -> &str {
        "microsoft"
    }

    fn request_device_code(&self) -> BoxFuture<'_, ProviderResult<DeviceCodeGrant>> {
        Box::pin(self.request_device_code_impl())
    }

    fn poll_device_code<'a>(
        &'a self,
        device_code: &'a str,
    ) -> BoxFuture<'a, ProviderResult<PollOutcome>> {
        Box::pin(self.poll_device_code_impl(device_code))
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<TokenGrant>> {
        Box::pin(self.refresh_impl(refresh_token))
    }
}

/// Reads the signed-in account name from an id token.
///
/// The signature is not verified; the value is only used for display and as
/// a hint when refreshing.
pub fn account_hint_from_id_token(id_token: &str) -> Option<String> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes).ok()?;
    claims
        .preferred_username
        .or(claims.upn)
        .or(claims.email)
        .or(claims.name)
        .filter(|s| !s.trim().is_empty())
}

fn parse_token_response(body: &str) -> ProviderResult<TokenGrant> {
    let response: TokenResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("invalid token response: {}", e))
            .with_provider("identity")
    })?;
    Ok(TokenGrant {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_in: response.expires_in,
        id_token: response.id_token,
    })
}

fn parse_error_body(body: &str) -> String {
    match serde_json::from_str::<OAuthErrorResponse>(body) {
        Ok(err) => match err.error_description {
            Some(desc) => format!("{}: {}", err.error, desc.lines().next().unwrap_or_default()),
            None => err.error,
        },
        Err(_) => body.chars().take(200).collect(),
    }
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    upn: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    fn identity(server: &mockito::Server) -> MicrosoftIdentity {
        let config = IdentityConfig::new("client-123", "tenant-abc").with_authority(server.url());
        MicrosoftIdentity::new(config).unwrap()
    }

    fn id_token(claims: &str) -> String {
        format!(
            "eyJhbGciOiJub25lIn0.{}.sig",
            URL_SAFE_NO_PAD.encode(claims.as_bytes())
        )
    }

    #[test]
    fn new_rejects_missing_client_id() {
        let err = MicrosoftIdentity::new(IdentityConfig::new("", "t")).unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Configuration);
    }

    #[test]
    fn account_hint_prefers_username() {
        let token = id_token(r#"{"preferred_username":"alice@contoso.com","name":"Alice"}"#);
        assert_eq!(
            account_hint_from_id_token(&token),
            Some("alice@contoso.com".to_string())
        );

        let token = id_token(r#"{"name":"Bob"}"#);
        assert_eq!(account_hint_from_id_token(&token), Some("Bob".to_string()));

        assert_eq!(account_hint_from_id_token("not-a-jwt"), None);
    }

    #[tokio::test]
    async fn request_device_code_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/tenant-abc/oauth2/v2.0/devicecode")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("client_id".into(), "client-123".into()),
                mockito::Matcher::Regex("Mail.Send".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"device_code":"dev-1","user_code":"ABCD-EFGH","verification_uri":"https://microsoft.com/devicelogin","expires_in":600,"interval":3,"message":"To sign in..."}"#,
            )
            .create_async()
            .await;

        let grant = identity(&server).request_device_code().await.unwrap();
        mock.assert_async().await;
        assert_eq!(grant.device_code, "dev-1");
        assert_eq!(grant.user_code, "ABCD-EFGH");
        assert_eq!(grant.expires_in, Duration::from_secs(600));
        assert_eq!(grant.interval, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn request_device_code_defaults_interval_and_lifetime() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant-abc/oauth2/v2.0/devicecode")
            .with_status(200)
            .with_body(r#"{"device_code":"d","user_code":"U","verification_uri":"https://x"}"#)
            .create_async()
            .await;

        let grant = identity(&server).request_device_code().await.unwrap();
        assert_eq!(grant.interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(grant.expires_in, DEFAULT_CODE_LIFETIME);
    }

    #[tokio::test]
    async fn request_device_code_failure_is_configuration_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant-abc/oauth2/v2.0/devicecode")
            .with_status(400)
            .with_body(r#"{"error":"unauthorized_client","error_description":"AADSTS700016: app not found"}"#)
            .create_async()
            .await;

        let err = identity(&server).request_device_code().await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Configuration);
        assert!(err.message().contains("unauthorized_client"));
    }

    #[tokio::test]
    async fn poll_maps_oauth_errors_to_outcomes() {
        let cases = [
            ("authorization_pending", PollOutcome::Pending),
            ("slow_down", PollOutcome::SlowDown),
            ("authorization_declined", PollOutcome::Declined),
            ("expired_token", PollOutcome::Expired),
        ];
        for (code, expected) in cases {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/tenant-abc/oauth2/v2.0/token")
                .with_status(400)
                .with_body(format!(r#"{{"error":"{}"}}"#, code))
                .create_async()
                .await;

            let outcome = identity(&server).poll_device_code("dev-1").await.unwrap();
            assert_eq!(outcome, expected, "error code {}", code);
        }
    }

    #[tokio::test]
    async fn poll_returns_tokens_when_granted() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant-abc/oauth2/v2.0/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                DEVICE_CODE_GRANT_TYPE.into(),
            ))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"at","refresh_token":"rt","expires_in":3599}"#)
            .create_async()
            .await;

        let outcome = identity(&server).poll_device_code("dev-1").await.unwrap();
        let PollOutcome::Granted(grant) = outcome else {
            panic!("expected grant, got {:?}", outcome);
        };
        assert_eq!(grant.access_token, "at");
        assert_eq!(grant.refresh_token.as_deref(), Some("rt"));
        assert_eq!(grant.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn refresh_failure_requires_login() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/tenant-abc/oauth2/v2.0/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"AADSTS70000: expired"}"#)
            .create_async()
            .await;

        let err = identity(&server).refresh("old").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthRequired);
        assert!(err.message().contains("invalid_grant"));
    }
}
