//! Terminal feedback: device-code prompt and stage progress.

use std::sync::Arc;

use tracing::warn;

use teamsdigest_providers::ProviderError;
use teamsdigest_providers::microsoft::{DeviceCodePrompt, PromptHandler};

use crate::pipeline::{ProgressSink, Stage};

/// Shows the code, copies it to the clipboard and opens the browser.
///
/// Clipboard and browser failures are only logged.
pub fn device_code_handler() -> PromptHandler {
    Arc::new(|prompt: &DeviceCodePrompt| {
        eprintln!();
        eprintln!("{}", prompt.instructions());
        eprintln!(
            "The code expires in {} minutes. Press Ctrl-C to cancel.",
            prompt.expires_in.as_secs().div_ceil(60)
        );

        match copy_to_clipboard(&prompt.user_code) {
            Ok(()) => eprintln!("Code {} copied to the clipboard.", prompt.user_code),
            Err(e) => warn!(error = %e, "could not copy device code to clipboard"),
        }
        if let Err(e) = open::that(&prompt.verification_uri) {
            warn!(error = %e, url = %prompt.verification_uri, "could not open browser");
        }
        eprintln!();
    })
}

fn copy_to_clipboard(text: &str) -> Result<(), arboard::Error> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(text.to_string())
}

/// Prints one line per stage to stderr.
pub struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn stage_started(&self, stage: Stage) {
        eprintln!("→ {}...", stage.description());
    }

    fn stage_failed(&self, stage: Stage, error: &ProviderError) {
        eprintln!("✗ {} failed: {}", stage.description(), error.message());
    }
}
