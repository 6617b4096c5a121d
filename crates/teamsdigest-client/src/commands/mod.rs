//! Subcommand implementations.

pub mod config;
pub mod login;
pub mod prompt;
pub mod resolve;
pub mod run;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use teamsdigest_providers::Summarizer;
use teamsdigest_providers::microsoft::{
    AuthSessionManager, AuthStatus, GraphClient, MicrosoftIdentity,
};
use teamsdigest_providers::openai::OpenAiClient;

use crate::cli::MailArgs;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::pipeline::{Pipeline, PipelineOptions};

/// Builds the process-wide auth session with the terminal prompt.
pub fn auth_session(config: &ClientConfig) -> ClientResult<Arc<AuthSessionManager>> {
    let identity = MicrosoftIdentity::new(config.identity_config()?)?;
    let auth = AuthSessionManager::new(Arc::new(identity))
        .with_prompt_handler(prompt::device_code_handler());
    Ok(Arc::new(auth))
}

/// Wires the configured collaborators into a pipeline.
pub fn build_pipeline(config: &ClientConfig, mail: &MailArgs) -> ClientResult<Pipeline> {
    let auth = auth_session(config)?;
    let graph = GraphClient::new(config.graph_config(), auth.clone())?;
    let backend = OpenAiClient::new(config.openai_config()?)?;
    debug!(model = backend.model(), "generation backend ready");
    let summarizer =
        Summarizer::new(Arc::new(backend)).with_max_chunk_chars(config.openai.max_chunk_chars);

    let options = PipelineOptions {
        include_excerpt: config.mail.include_transcript_excerpt && !mail.no_excerpt,
        dry_run: mail.dry_run,
        ..PipelineOptions::default()
    };

    Ok(Pipeline::new(auth, Arc::new(graph), summarizer)
        .with_progress(Arc::new(prompt::TerminalProgress))
        .with_options(options))
}

/// Ctrl-C cancels a pending device-code sign-in; otherwise it exits.
pub fn cancel_on_interrupt(auth: Arc<AuthSessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if matches!(auth.status(), AuthStatus::DeviceCodePending { .. }) {
                auth.cancel();
            } else {
                eprintln!("interrupted");
                std::process::exit(130);
            }
        }
    })
}
