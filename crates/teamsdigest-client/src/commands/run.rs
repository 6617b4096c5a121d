//! Commands that produce and send a summary.

use std::path::Path;

use teamsdigest_core::{RecipientList, Summary, flatten_vtt};

use crate::cli::MailArgs;
use crate::commands::{build_pipeline, cancel_on_interrupt};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::pipeline::PipelineError;

/// Summarizes the meeting behind `link` and mails the result.
pub async fn run(config: &ClientConfig, link: &str, mail: &MailArgs) -> ClientResult<()> {
    let recipients = config.recipients(&mail.to, mail.subject.as_deref())?;
    let pipeline = build_pipeline(config, mail)?;

    let interrupt = cancel_on_interrupt(pipeline.auth().clone());
    let result = pipeline.run(link, &recipients).await;
    interrupt.abort();

    report(result, &recipients, mail.dry_run)
}

/// Summarizes a transcript file and mails the result.
pub async fn summarize(config: &ClientConfig, path: &Path, mail: &MailArgs) -> ClientResult<()> {
    let recipients = config.recipients(&mail.to, mail.subject.as_deref())?;
    let text = read_transcript(path)?;
    let pipeline = build_pipeline(config, mail)?;

    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let interrupt = cancel_on_interrupt(pipeline.auth().clone());
    let result = pipeline.run_from_text(&source, &text, &recipients).await;
    interrupt.abort();

    report(result, &recipients, mail.dry_run)
}

/// Reads a transcript, flattening WebVTT to `Speaker: text` lines.
pub fn read_transcript(path: &Path) -> ClientResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ClientError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;

    let is_vtt = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("vtt"))
        || content.trim_start_matches('\u{feff}').starts_with("WEBVTT");
    Ok(if is_vtt { flatten_vtt(&content) } else { content })
}

fn report(
    result: Result<Summary, PipelineError>,
    recipients: &RecipientList,
    dry_run: bool,
) -> ClientResult<()> {
    match result {
        Ok(summary) if dry_run => {
            println!("{}", summary.html_body);
            eprintln!(
                "Dry run: not sent to {} ({:?}).",
                recipients.addresses().join(", "),
                recipients.subject()
            );
            Ok(())
        }
        Ok(_) => {
            eprintln!("Summary sent to {}.", recipients.addresses().join(", "));
            Ok(())
        }
        Err(err) => {
            if let Some(summary) = &err.summary {
                // Keep the generated summary visible so it is not lost.
                println!("{}", summary.html_body);
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vtt_file_is_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.vtt");
        std::fs::write(
            &path,
            "WEBVTT\n\n1\n00:00:01.000 --> 00:00:03.000\n<v Alice>Hello all</v>\n",
        )
        .unwrap();

        let text = read_transcript(&path).unwrap();
        assert!(!text.contains("WEBVTT"));
        assert!(!text.contains("-->"));
        assert!(text.contains("Alice: Hello all"));
    }

    #[test]
    fn plain_text_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "Alice: Hello\nBob: Hi\n").unwrap();

        assert_eq!(read_transcript(&path).unwrap(), "Alice: Hello\nBob: Hi\n");
    }

    #[test]
    fn missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_transcript(&dir.path().join("nope.txt")).is_err());
    }
}
