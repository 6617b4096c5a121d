//! Microsoft Graph client for meetings, transcripts and mail.
//!
//! Every request is authenticated with a token from the injected
//! [`TokenSource`]. Transient failures (429, 5xx, transport errors) are
//! retried with backoff up to the configured attempt ceiling; a 401 leads
//! to exactly one token refresh and one more try. Any other 4xx is final.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use teamsdigest_core::{MeetingReference, RecipientList, Summary, Transcript, flatten_vtt};
use tracing::{debug, info, instrument, warn};

use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};
use crate::provider::{BoxFuture, MeetingGraph, TokenSource};

use super::config::GraphConfig;
use super::retry::{RetryOn, RetryPolicy, parse_retry_after};

/// A response that made it past the retry loop.
#[derive(Debug)]
struct GraphResponse {
    status: StatusCode,
    body: String,
}

impl GraphResponse {
    fn snippet(&self) -> String {
        match serde_json::from_str::<GraphErrorResponse>(&self.body) {
            Ok(err) => format!("{}: {}", err.error.code, err.error.message),
            Err(_) => self.body.chars().take(200).collect(),
        }
    }
}

/// HTTP client for the Graph API.
pub struct GraphClient {
    config: GraphConfig,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
}

impl GraphClient {
    /// Creates a new Graph client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: GraphConfig, tokens: Arc<dyn TokenSource>) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self {
            retry: RetryPolicy::from_config(&config),
            config,
            http_client,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Sends one request, retrying per `retry_on` and refreshing once on 401.
    ///
    /// Returns the final response for any status that is not retried;
    /// callers map those to domain errors.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        retry_on: RetryOn,
    ) -> ProviderResult<GraphResponse> {
        let mut token = self.tokens.get_token().await?;
        let mut refreshed = false;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token)
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = transport_error(e);
                    if retry_on == RetryOn::Transient && self.retry.should_retry(attempt) {
                        let delay = self.retry.next_delay(attempt, None);
                        warn!(attempt, error = %err, ?delay, "graph request failed, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.map_err(|e| {
                ProviderError::network(format!("failed to read response: {}", e)).with_provider("graph")
            })?;
            debug!(%method, status = status.as_u16(), attempt, "graph response");

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    return Err(ProviderError::auth_required(
                        "access token rejected after refresh",
                    )
                    .with_provider("graph"));
                }
                refreshed = true;
                info!("graph rejected access token, refreshing");
                token = self.tokens.ensure_valid(&token).await?;
                // The retry after a refresh does not count against the ceiling.
                attempt -= 1;
                continue;
            }

            if retry_on.allows(status.as_u16()) {
                if self.retry.should_retry(attempt) {
                    let delay = self.retry.next_delay(attempt, retry_after);
                    warn!(attempt, status = status.as_u16(), ?delay, "graph request throttled or failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                let response = GraphResponse { status, body: text };
                return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                    ProviderError::rate_limited(format!(
                        "rate limit exceeded after {} attempts",
                        attempt
                    ))
                } else {
                    ProviderError::server(format!(
                        "server error ({}) after {} attempts: {}",
                        status,
                        attempt,
                        response.snippet()
                    ))
                }
                .with_provider("graph"));
            }

            return Ok(GraphResponse { status, body: text });
        }
    }

    /// Looks up the online meeting id by join URL.
    #[instrument(skip(self, reference), fields(thread_id = %reference.thread_id))]
    pub async fn resolve_meeting(&self, reference: &MeetingReference) -> ProviderResult<String> {
        if !reference.is_queryable() {
            return Err(ProviderError::invalid_link("meeting link has no thread identifier"));
        }

        let filter = format!("JoinWebUrl eq '{}'", reference.join_url.replace('\'', "''"));
        let response = self
            .execute(
                Method::GET,
                &self.url("/me/onlineMeetings"),
                &[("$filter", filter.as_str())],
                None,
                RetryOn::Transient,
            )
            .await?;

        match response.status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::meeting_not_found(format!(
                    "meeting not found: {}",
                    response.snippet()
                ))
                .with_provider("graph"));
            }
            _ => return Err(status_error(&response, "meeting lookup")),
        }

        let list: ListResponse<OnlineMeeting> = parse_json(&response.body)?;
        let meeting = list.value.into_iter().next().ok_or_else(|| {
            ProviderError::meeting_not_found(
                "no meeting matches this link for the signed-in user",
            )
            .with_provider("graph")
        })?;

        info!(subject = ?meeting.subject, "resolved meeting");
        Ok(meeting.id)
    }

    /// Downloads and flattens the most recent transcript of a meeting.
    #[instrument(skip(self))]
    pub async fn fetch_transcript(&self, meeting_id: &str) -> ProviderResult<Transcript> {
        let meeting_path = format!("/me/onlineMeetings/{}", urlencoding::encode(meeting_id));

        let response = self
            .execute(
                Method::GET,
                &self.url(&format!("{}/transcripts", meeting_path)),
                &[],
                None,
                RetryOn::Transient,
            )
            .await?;

        match response.status {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::meeting_not_found(format!(
                    "meeting not found: {}",
                    response.snippet()
                ))
                .with_provider("graph"));
            }
            _ => return Err(status_error(&response, "transcript listing")),
        }

        let list: ListResponse<TranscriptEntry> = parse_json(&response.body)?;
        let latest = list
            .value
            .into_iter()
            .max_by(|a, b| a.created_date_time.cmp(&b.created_date_time))
            .ok_or_else(|| {
                ProviderError::transcript_unavailable(
                    "no transcript is available for this meeting yet",
                )
                .with_provider("graph")
            })?;

        debug!(transcript_id = %latest.id, "downloading transcript content");
        let response = self
            .execute(
                Method::GET,
                &self.url(&format!(
                    "{}/transcripts/{}/content",
                    meeting_path,
                    urlencoding::encode(&latest.id)
                )),
                &[("$format", "text/vtt")],
                None,
                RetryOn::Transient,
            )
            .await?;

        match response.status {
            StatusCode::OK => {}
            // Accepted / not yet materialised: the transcript is still processing.
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND | StatusCode::CONFLICT => {
                return Err(ProviderError::transcript_unavailable(
                    "transcript is still being processed",
                )
                .with_provider("graph"));
            }
            _ => return Err(status_error(&response, "transcript download")),
        }

        let text = flatten_vtt(&response.body);
        if text.trim().is_empty() {
            return Err(ProviderError::transcript_unavailable("transcript is empty")
                .with_provider("graph"));
        }

        let transcript = Transcript::new(meeting_id, text);
        info!(words = transcript.word_count(), "fetched transcript");
        Ok(transcript)
    }

    /// Sends the summary as an HTML mail from the signed-in user.
    ///
    /// Only 429 is retried; a failed send is never repeated otherwise.
    #[instrument(skip(self, recipients, summary), fields(recipients = recipients.addresses().len()))]
    pub async fn send_mail(&self, recipients: &RecipientList, summary: &Summary) -> ProviderResult<()> {
        let payload = SendMailRequest {
            message: MailMessage {
                subject: recipients.subject(),
                body: MailBody {
                    content_type: "HTML",
                    content: &summary.html_body,
                },
                to_recipients: recipients
                    .addresses()
                    .iter()
                    .map(|address| MailRecipient {
                        email_address: MailAddress { address },
                    })
                    .collect(),
            },
            save_to_sent_items: self.config.save_to_sent_items,
        };
        let body = serde_json::to_value(&payload).map_err(|e| {
            ProviderError::internal(format!("failed to encode mail: {}", e)).with_provider("graph")
        })?;

        let response = self
            .execute(
                Method::POST,
                &self.url("/me/sendMail"),
                &[],
                Some(&body),
                RetryOn::RateLimitOnly,
            )
            .await
            .map_err(into_mail_error)?;

        if !response.status.is_success() {
            return Err(ProviderError::mail_send(format!(
                "mail send failed ({}): {}",
                response.status,
                response.snippet()
            ))
            .with_provider("graph"));
        }

        info!("summary mail sent");
        Ok(())
    }
}

impl MeetingGraph for GraphClient {
    fn resolve_meeting<'a>(
        &'a self,
        reference: &'a MeetingReference,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(GraphClient::resolve_meeting(self, reference))
    }

    fn fetch_transcript<'a>(
        &'a self,
        meeting_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Transcript>> {
        Box::pin(GraphClient::fetch_transcript(self, meeting_id))
    }

    fn send_mail<'a>(
        &'a self,
        recipients: &'a RecipientList,
        summary: &'a Summary,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(GraphClient::send_mail(self, recipients, summary))
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let err = if e.is_timeout() {
        ProviderError::network("request timeout")
    } else if e.is_connect() {
        ProviderError::network(format!("connection failed: {}", e))
    } else {
        ProviderError::network(format!("request failed: {}", e))
    };
    err.with_provider("graph").with_source(e)
}

/// Maps a final non-success status to an error.
fn status_error(response: &GraphResponse, context: &str) -> ProviderError {
    let message = format!("{} failed ({}): {}", context, response.status, response.snippet());
    match response.status {
        StatusCode::FORBIDDEN => ProviderError::permission_denied(message),
        StatusCode::NOT_FOUND => ProviderError::meeting_not_found(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        s if s.is_server_error() => ProviderError::server(message),
        s if s.is_client_error() => ProviderError::bad_request(message),
        _ => ProviderError::invalid_response(message),
    }
    .with_provider("graph")
}

/// Anything but an auth failure during send is reported as a mail failure.
fn into_mail_error(err: ProviderError) -> ProviderError {
    if err.code().requires_login() || err.code() == ProviderErrorCode::MailSend {
        err
    } else {
        err.recode(ProviderErrorCode::MailSend)
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &str) -> ProviderResult<T> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse response: {}", e))
            .with_provider("graph")
    })
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct OnlineMeeting {
    id: String,
    #[serde(default)]
    subject: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptEntry {
    id: String,
    #[serde(default)]
    created_date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailRequest<'a> {
    message: MailMessage<'a>,
    save_to_sent_items: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailMessage<'a> {
    subject: &'a str,
    body: MailBody<'a>,
    to_recipients: Vec<MailRecipient<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailBody<'a> {
    content_type: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MailRecipient<'a> {
    email_address: MailAddress<'a>,
}

#[derive(Serialize)]
struct MailAddress<'a> {
    address: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Token source with a scripted refresh.
    struct FakeTokens {
        token: Mutex<String>,
        refreshed: Option<String>,
        refreshes: AtomicUsize,
    }

    impl FakeTokens {
        fn new(token: &str, refreshed: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                token: Mutex::new(token.to_string()),
                refreshed: refreshed.map(String::from),
                refreshes: AtomicUsize::new(0),
            })
        }
    }

    impl TokenSource for FakeTokens {
        fn get_token(&self) -> BoxFuture<'_, ProviderResult<String>> {
            let token = self.token.lock().unwrap().clone();
            Box::pin(async move { Ok(token) })
        }

        fn ensure_valid<'a>(&'a self, _rejected: &'a str) -> BoxFuture<'a, ProviderResult<String>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            let result = match &self.refreshed {
                Some(token) => {
                    *self.token.lock().unwrap() = token.clone();
                    Ok(token.clone())
                }
                None => Err(ProviderError::auth_required("refresh failed")),
            };
            Box::pin(async move { result })
        }
    }

    fn client(server: &mockito::Server, tokens: Arc<FakeTokens>) -> GraphClient {
        let config = GraphConfig::default()
            .with_base_url(server.url())
            .with_initial_backoff(Duration::from_millis(1));
        GraphClient::new(config, tokens).unwrap()
    }

    fn reference() -> MeetingReference {
        MeetingReference {
            raw_link: "https://teams.microsoft.com/l/meetup-join/x".into(),
            join_url: "https://teams.microsoft.com/l/meetup-join/19%3ameeting_abc%40thread.v2/0".into(),
            thread_id: "19:meeting_abc@thread.v2".into(),
            organizer_id: None,
            tenant_id: None,
            meeting_id: None,
        }
    }

    fn recipients() -> RecipientList {
        RecipientList::parse("alice@contoso.com, bob@contoso.com", "Weekly sync").unwrap()
    }

    mod meetings {
        use super::*;

        #[tokio::test]
        async fn resolves_meeting_by_join_url() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::UrlEncoded(
                    "$filter".into(),
                    "JoinWebUrl eq 'https://teams.microsoft.com/l/meetup-join/19%3ameeting_abc%40thread.v2/0'".into(),
                ))
                .match_header("authorization", "Bearer t1")
                .with_status(200)
                .with_body(r#"{"value":[{"id":"MSo1N2Y5","subject":"Weekly sync"}]}"#)
                .create_async()
                .await;

            let id = client(&server, FakeTokens::new("t1", None))
                .resolve_meeting(&reference())
                .await
                .unwrap();
            mock.assert_async().await;
            assert_eq!(id, "MSo1N2Y5");
        }

        #[tokio::test]
        async fn empty_result_is_meeting_not_found() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .with_status(200)
                .with_body(r#"{"value":[]}"#)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .resolve_meeting(&reference())
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::MeetingNotFound);
        }

        #[tokio::test]
        async fn status_404_and_403_are_terminal() {
            for (status, code) in [
                (404, ProviderErrorCode::MeetingNotFound),
                (403, ProviderErrorCode::PermissionDenied),
                (400, ProviderErrorCode::BadRequest),
            ] {
                let mut server = mockito::Server::new_async().await;
                let mock = server
                    .mock("GET", "/me/onlineMeetings")
                    .match_query(Matcher::Any)
                    .with_status(status)
                    .with_body(r#"{"error":{"code":"Forbidden","message":"nope"}}"#)
                    .expect(1)
                    .create_async()
                    .await;

                let err = client(&server, FakeTokens::new("t", None))
                    .resolve_meeting(&reference())
                    .await
                    .unwrap_err();
                mock.assert_async().await;
                assert_eq!(err.code(), code, "status {}", status);
            }
        }

        #[tokio::test]
        async fn reference_without_thread_is_rejected_before_any_call() {
            let server = mockito::Server::new_async().await;
            let mut reference = reference();
            reference.thread_id = String::new();

            let err = client(&server, FakeTokens::new("t", None))
                .resolve_meeting(&reference)
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::InvalidLink);
        }
    }

    mod retries {
        use super::*;

        #[tokio::test]
        async fn gives_up_after_attempt_ceiling() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .with_status(429)
                .with_header("retry-after", "0")
                .expect(3)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .resolve_meeting(&reference())
                .await
                .unwrap_err();
            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::RateLimited);
        }

        #[tokio::test]
        async fn server_errors_exhaust_to_server_error() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .with_status(503)
                .expect(3)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .resolve_meeting(&reference())
                .await
                .unwrap_err();
            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::ServerError);
        }

        #[tokio::test]
        async fn refreshes_once_on_401() {
            let mut server = mockito::Server::new_async().await;
            let rejected = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .match_header("authorization", "Bearer stale")
                .with_status(401)
                .expect(1)
                .create_async()
                .await;
            let accepted = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .match_header("authorization", "Bearer fresh")
                .with_status(200)
                .with_body(r#"{"value":[{"id":"m1"}]}"#)
                .expect(1)
                .create_async()
                .await;

            let tokens = FakeTokens::new("stale", Some("fresh"));
            let id = client(&server, tokens.clone())
                .resolve_meeting(&reference())
                .await
                .unwrap();

            rejected.assert_async().await;
            accepted.assert_async().await;
            assert_eq!(id, "m1");
            assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn second_401_requires_login() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .with_status(401)
                .expect(2)
                .create_async()
                .await;

            let tokens = FakeTokens::new("stale", Some("also-stale"));
            let err = client(&server, tokens.clone())
                .resolve_meeting(&reference())
                .await
                .unwrap_err();

            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::AuthRequired);
            assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn failed_refresh_surfaces_auth_required() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("GET", "/me/onlineMeetings")
                .match_query(Matcher::Any)
                .with_status(401)
                .expect(1)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("stale", None))
                .resolve_meeting(&reference())
                .await
                .unwrap_err();

            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::AuthRequired);
        }
    }

    mod transcripts {
        use super::*;

        #[tokio::test]
        async fn downloads_latest_transcript_as_text() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/me/onlineMeetings/m1/transcripts")
                .with_status(200)
                .with_body(
                    r#"{"value":[
                        {"id":"old","createdDateTime":"2024-03-01T10:00:00Z"},
                        {"id":"new","createdDateTime":"2024-03-08T10:00:00Z"}
                    ]}"#,
                )
                .create_async()
                .await;
            let content = server
                .mock("GET", "/me/onlineMeetings/m1/transcripts/new/content")
                .match_query(Matcher::UrlEncoded("$format".into(), "text/vtt".into()))
                .with_status(200)
                .with_header("content-type", "text/vtt")
                .with_body("WEBVTT\n\n00:00:01.000 --> 00:00:02.000\n<v Alice>Hello team</v>\n")
                .create_async()
                .await;

            let transcript = client(&server, FakeTokens::new("t", None))
                .fetch_transcript("m1")
                .await
                .unwrap();

            content.assert_async().await;
            assert_eq!(transcript.meeting_id(), "m1");
            assert_eq!(transcript.raw_text(), "Alice: Hello team");
        }

        #[tokio::test]
        async fn no_transcripts_yet_is_unavailable() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/me/onlineMeetings/m1/transcripts")
                .with_status(200)
                .with_body(r#"{"value":[]}"#)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .fetch_transcript("m1")
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::TranscriptUnavailable);
            assert!(err.code().is_user_retryable());
        }

        #[tokio::test]
        async fn content_not_ready_is_unavailable() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/me/onlineMeetings/m1/transcripts")
                .with_status(200)
                .with_body(r#"{"value":[{"id":"t1"}]}"#)
                .create_async()
                .await;
            server
                .mock("GET", "/me/onlineMeetings/m1/transcripts/t1/content")
                .match_query(Matcher::Any)
                .with_status(404)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .fetch_transcript("m1")
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::TranscriptUnavailable);
        }

        #[tokio::test]
        async fn unknown_meeting_is_not_found() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/me/onlineMeetings/gone/transcripts")
                .with_status(404)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .fetch_transcript("gone")
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::MeetingNotFound);
        }
    }

    mod mail {
        use super::*;

        #[tokio::test]
        async fn sends_html_mail_to_all_recipients() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("POST", "/me/sendMail")
                .match_body(Matcher::PartialJson(json!({
                    "message": {
                        "subject": "Weekly sync",
                        "body": {"contentType": "HTML", "content": "<p>Summary</p>"},
                        "toRecipients": [
                            {"emailAddress": {"address": "alice@contoso.com"}},
                            {"emailAddress": {"address": "bob@contoso.com"}}
                        ]
                    },
                    "saveToSentItems": true
                })))
                .with_status(202)
                .expect(1)
                .create_async()
                .await;

            client(&server, FakeTokens::new("t", None))
                .send_mail(&recipients(), &Summary::new("<p>Summary</p>", "m1"))
                .await
                .unwrap();
            mock.assert_async().await;
        }

        #[tokio::test]
        async fn server_error_is_not_retried() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("POST", "/me/sendMail")
                .with_status(500)
                .expect(1)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .send_mail(&recipients(), &Summary::new("<p>s</p>", "m1"))
                .await
                .unwrap_err();
            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::MailSend);
        }

        #[tokio::test]
        async fn throttled_send_is_retried() {
            let mut server = mockito::Server::new_async().await;
            let mock = server
                .mock("POST", "/me/sendMail")
                .with_status(429)
                .with_header("retry-after", "0")
                .expect(3)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .send_mail(&recipients(), &Summary::new("<p>s</p>", "m1"))
                .await
                .unwrap_err();
            mock.assert_async().await;
            assert_eq!(err.code(), ProviderErrorCode::MailSend);
        }

        #[tokio::test]
        async fn auth_failure_keeps_its_kind() {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("POST", "/me/sendMail")
                .with_status(401)
                .create_async()
                .await;

            let err = client(&server, FakeTokens::new("t", None))
                .send_mail(&recipients(), &Summary::new("<p>s</p>", "m1"))
                .await
                .unwrap_err();
            assert_eq!(err.code(), ProviderErrorCode::AuthRequired);
        }
    }
}
