//! Pipeline orchestrator.
//!
//! One run turns a meeting link into an emailed summary:
//!
//! ```text
//! resolve_link → authenticate → resolve_meeting → fetch_transcript → summarize → send_mail
//! ```
//!
//! Stages run strictly in order, each fed by the previous one. The first
//! failure aborts the run and comes back as a [`PipelineError`] tagged
//! with the stage it happened in. A failed send still hands the summary
//! back so it can be shown or sent again.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use teamsdigest_core::{LinkResolver, RecipientList, Summary, Transcript, email_document};
use teamsdigest_providers::microsoft::AuthSessionManager;
use teamsdigest_providers::{
    MeetingGraph, ProviderError, ProviderErrorCode, ProviderResult, Summarizer,
};

/// Characters of transcript quoted below the summary.
pub const DEFAULT_EXCERPT_CHARS: usize = 1_000;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveLink,
    Authenticate,
    ResolveMeeting,
    FetchTranscript,
    Summarize,
    SendMail,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveLink => "resolve_link",
            Self::Authenticate => "authenticate",
            Self::ResolveMeeting => "resolve_meeting",
            Self::FetchTranscript => "fetch_transcript",
            Self::Summarize => "summarize",
            Self::SendMail => "send_mail",
        }
    }

    /// Short progress line for the user.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResolveLink => "Reading meeting link",
            Self::Authenticate => "Signing in to Microsoft",
            Self::ResolveMeeting => "Looking up meeting",
            Self::FetchTranscript => "Downloading transcript",
            Self::Summarize => "Summarizing transcript",
            Self::SendMail => "Sending summary email",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives stage progress from a run.
pub trait ProgressSink: Send + Sync {
    fn stage_started(&self, _stage: Stage) {}

    fn stage_finished(&self, _stage: Stage) {}

    fn stage_failed(&self, _stage: Stage, _error: &ProviderError) {}
}

/// Ignores progress.
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// A run failed at `stage`.
///
/// `error` keeps the code it was raised with; the orchestrator only adds
/// the stage.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: ProviderError,
    /// Present when the failure came after summarizing.
    pub summary: Option<Summary>,
}

impl PipelineError {
    pub fn new(stage: Stage, error: ProviderError) -> Self {
        Self {
            stage,
            error,
            summary: None,
        }
    }

    fn with_summary(mut self, summary: Summary) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn kind(&self) -> ProviderErrorCode {
        self.error.code()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    /// What the user can do about it.
    pub fn hint(&self) -> &'static str {
        match self.kind() {
            ProviderErrorCode::InvalidLink => {
                "paste the full Teams join link (it contains /l/meetup-join/)"
            }
            ProviderErrorCode::AuthTimeout => {
                "the sign-in code expired; run again and finish signing in before it runs out"
            }
            ProviderErrorCode::AuthRequired => "sign-in is no longer valid; run again to sign in",
            ProviderErrorCode::AuthCancelled => "sign-in was cancelled",
            ProviderErrorCode::MeetingNotFound => {
                "meeting not found; check the link and that you organized or attended it"
            }
            ProviderErrorCode::PermissionDenied => {
                "permission denied; check the app's API consent for meetings, transcripts and mail"
            }
            ProviderErrorCode::TranscriptUnavailable => {
                "transcript not ready; try again in a few minutes"
            }
            ProviderErrorCode::Summarization => {
                "the generation API failed; try again or check the openai settings"
            }
            ProviderErrorCode::MailSend => {
                "the summary was generated but not sent; check Mail.Send consent and retry"
            }
            ProviderErrorCode::Network
            | ProviderErrorCode::RateLimited
            | ProviderErrorCode::ServerError => {
                "Microsoft Graph is busy or unreachable; try again later"
            }
            ProviderErrorCode::Configuration => "check settings with `teamsdigest config validate`",
            ProviderErrorCode::InvalidResponse
            | ProviderErrorCode::BadRequest
            | ProviderErrorCode::Internal => "unexpected failure; rerun with --debug for details",
        }
    }
}

/// Per-run behaviour switches.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Quote the start of the transcript below the summary.
    pub include_excerpt: bool,
    pub excerpt_chars: usize,
    /// Run every stage but `send_mail`.
    pub dry_run: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            include_excerpt: true,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            dry_run: false,
        }
    }
}

/// Sequences one meeting-to-email run.
pub struct Pipeline {
    resolver: LinkResolver,
    auth: Arc<AuthSessionManager>,
    graph: Arc<dyn MeetingGraph>,
    summarizer: Summarizer,
    progress: Arc<dyn ProgressSink>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        auth: Arc<AuthSessionManager>,
        graph: Arc<dyn MeetingGraph>,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            resolver: LinkResolver::new(),
            auth,
            graph,
            summarizer,
            progress: Arc::new(NoProgress),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// The session shared by every run of this pipeline.
    pub fn auth(&self) -> &Arc<AuthSessionManager> {
        &self.auth
    }

    /// Runs all six stages for a meeting link.
    ///
    /// Returns the summary once the email went out (or, in a dry run, once
    /// it was generated).
    pub async fn run(
        &self,
        raw_link: &str,
        recipients: &RecipientList,
    ) -> Result<Summary, PipelineError> {
        let run_id = Uuid::new_v4();
        self.run_link(raw_link, recipients)
            .instrument(info_span!("pipeline_run", %run_id))
            .await
    }

    /// Summarizes transcript text that is already at hand and mails it.
    ///
    /// Only `authenticate`, `summarize` and `send_mail` run; `source` names
    /// the transcript in the summary.
    pub async fn run_from_text(
        &self,
        source: &str,
        text: &str,
        recipients: &RecipientList,
    ) -> Result<Summary, PipelineError> {
        let run_id = Uuid::new_v4();
        self.run_text(source, text, recipients)
            .instrument(info_span!("pipeline_run", %run_id, %source))
            .await
    }

    /// Sends an already generated summary.
    pub async fn send_summary(
        &self,
        recipients: &RecipientList,
        summary: &Summary,
        excerpt: Option<&str>,
    ) -> Result<(), PipelineError> {
        let body = Summary::new(
            email_document(&summary.html_body, excerpt, Utc::now()),
            summary.source_meeting_id.clone(),
        );
        self.stage(Stage::SendMail, self.graph.send_mail(recipients, &body))
            .await?;
        info!(recipients = recipients.addresses().len(), "summary sent");
        Ok(())
    }

    async fn run_link(
        &self,
        raw_link: &str,
        recipients: &RecipientList,
    ) -> Result<Summary, PipelineError> {
        let reference = self
            .stage(Stage::ResolveLink, async {
                self.resolver.resolve(raw_link).map_err(ProviderError::from)
            })
            .await?;

        self.stage(Stage::Authenticate, self.auth.ensure_authenticated())
            .await?;

        let meeting_id = self
            .stage(Stage::ResolveMeeting, self.graph.resolve_meeting(&reference))
            .await?;

        let transcript = self
            .stage(Stage::FetchTranscript, self.graph.fetch_transcript(&meeting_id))
            .await?;
        info!(
            meeting_id = %transcript.meeting_id(),
            words = transcript.word_count(),
            "transcript fetched"
        );

        let summary = self
            .stage(
                Stage::Summarize,
                self.summarizer
                    .summarize(transcript.meeting_id(), transcript.raw_text()),
            )
            .await?;

        self.deliver(recipients, summary, &transcript).await
    }

    async fn run_text(
        &self,
        source: &str,
        text: &str,
        recipients: &RecipientList,
    ) -> Result<Summary, PipelineError> {
        if !self.options.dry_run {
            self.stage(Stage::Authenticate, self.auth.ensure_authenticated())
                .await?;
        }

        let transcript = Transcript::new(source, text);
        let summary = self
            .stage(
                Stage::Summarize,
                self.summarizer
                    .summarize(transcript.meeting_id(), transcript.raw_text()),
            )
            .await?;

        self.deliver(recipients, summary, &transcript).await
    }

    async fn deliver(
        &self,
        recipients: &RecipientList,
        summary: Summary,
        transcript: &Transcript,
    ) -> Result<Summary, PipelineError> {
        if self.options.dry_run {
            info!("dry run, not sending mail");
            return Ok(summary);
        }

        let excerpt = self
            .options
            .include_excerpt
            .then(|| transcript.excerpt(self.options.excerpt_chars));
        match self.send_summary(recipients, &summary, excerpt).await {
            Ok(()) => Ok(summary),
            Err(err) => Err(err.with_summary(summary)),
        }
    }

    async fn stage<T>(
        &self,
        stage: Stage,
        work: impl Future<Output = ProviderResult<T>>,
    ) -> Result<T, PipelineError> {
        debug!(%stage, "stage started");
        self.progress.stage_started(stage);

        match work.await {
            Ok(value) => {
                self.progress.stage_finished(stage);
                Ok(value)
            }
            Err(error) => {
                warn!(%stage, code = error.code().as_str(), error = %error, "stage failed");
                self.progress.stage_failed(stage, &error);
                Err(PipelineError::new(stage, error))
            }
        }
    }
}
