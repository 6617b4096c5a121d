//! Transcript summarization: chunk, summarize each chunk, consolidate.
//!
//! Short transcripts go to the generation API in one call. Longer ones are
//! split by [`chunk_transcript`], each chunk is summarized on its own
//! ([`Summarizer::summarize_chunks`]) and the partial summaries are merged
//! by one final call ([`Summarizer::consolidate`]).

use std::sync::Arc;

use teamsdigest_core::{Summary, render_summary_html};
use tracing::{debug, info, instrument};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::GenerationBackend;

/// Characters per chunk unless configured otherwise.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 48_000;

pub const SYSTEM_PROMPT: &str = "You are an expert meeting summarizer. Produce a crisp, factual, \
non-redundant summary suitable to email to stakeholders who did not attend. Prefer bullets. \
Infer assignees and deadlines only if they are clear. Answer with an HTML fragment using only \
<h3>, <p>, <ul>, <li> and <strong>; no <html>, <head>, <style> or <script>.";

const SUMMARY_SECTIONS: &str = "1) Executive Summary (3-6 bullets)\n\
2) Key Decisions (with rationale if stated)\n\
3) Open Questions & Risks\n\
4) Action Items (Assignee - Task - Due date if mentioned)\n\
5) Notable Quotes (optional, brief)";

const CHUNK_SYSTEM_PROMPT: &str = "You are an expert meeting note-taker. You receive one part of a \
longer meeting transcript. Extract the facts, decisions, open questions, action items (with \
assignee and due date when stated) and notable quotes from this part only. Be concise and use \
plain bullet points.";

/// Prompt for a transcript that fits in one call.
pub fn summary_prompt(transcript: &str) -> String {
    format!(
        "Below is a raw transcript from a Microsoft Teams call. Please produce:\n\n{}\n\nTranscript:\n---\n{}\n---",
        SUMMARY_SECTIONS, transcript
    )
}

/// Prompt for one chunk of a longer transcript.
pub fn chunk_prompt(chunk: &str, index: usize, total: usize) -> String {
    format!(
        "This is part {} of {} of a Microsoft Teams call transcript.\n\nTranscript part:\n---\n{}\n---",
        index + 1,
        total,
        chunk
    )
}

/// Prompt that merges partial notes into the final summary.
pub fn consolidation_prompt(partials: &[String]) -> String {
    let mut notes = String::new();
    for (i, partial) in partials.iter().enumerate() {
        notes.push_str(&format!("### Part {}\n{}\n\n", i + 1, partial.trim()));
    }
    format!(
        "Below are notes taken from consecutive parts of one Microsoft Teams call. Merge them into \
a single summary without repeating yourself. Please produce:\n\n{}\n\nNotes:\n---\n{}---",
        SUMMARY_SECTIONS, notes
    )
}

/// Splits a transcript into chunks of at most `max_chars` characters.
///
/// Boundaries are tried in order: blank lines, line breaks, sentence ends,
/// and as a last resort a hard cut at a character boundary. Adjacent pieces
/// are packed together while they fit.
pub fn chunk_transcript(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        split_to_fit(paragraph, max_chars, &mut pieces);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && char_len(&current) + 1 + char_len(&piece) > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_to_fit(paragraph: &str, max_chars: usize, out: &mut Vec<String>) {
    if char_len(paragraph) <= max_chars {
        out.push(paragraph.to_string());
        return;
    }
    for line in paragraph.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if char_len(line) <= max_chars {
            out.push(line.to_string());
            continue;
        }
        for sentence in split_sentences(line) {
            if char_len(sentence) <= max_chars {
                out.push(sentence.to_string());
            } else {
                hard_split(sentence, max_chars, out);
            }
        }
    }
}

/// Splits after `.`, `!` or `?` followed by whitespace.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_idx, next)) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = line[start..next_idx].trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = next_idx;
                }
            }
        }
    }
    let rest = line[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

fn hard_split(text: &str, max_chars: usize, out: &mut Vec<String>) {
    let chars: Vec<char> = text.chars().collect();
    for piece in chars.chunks(max_chars) {
        out.push(piece.iter().collect());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Two-stage summarizer over a [`GenerationBackend`].
pub struct Summarizer {
    backend: Arc<dyn GenerationBackend>,
    max_chunk_chars: usize,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }

    /// Builder method to set the chunk budget.
    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars.max(1);
        self
    }

    pub fn max_chunk_chars(&self) -> usize {
        self.max_chunk_chars
    }

    /// Summarizes a transcript into a sanitized HTML summary.
    ///
    /// # Errors
    ///
    /// `Summarization` if the text is empty, any generation call fails, or
    /// the result renders to nothing.
    #[instrument(skip(self, raw_text), fields(chars = raw_text.len()))]
    pub async fn summarize(&self, meeting_id: &str, raw_text: &str) -> ProviderResult<Summary> {
        let chunks = chunk_transcript(raw_text, self.max_chunk_chars);
        if chunks.is_empty() {
            return Err(ProviderError::summarization("transcript text is empty"));
        }

        let generated = if chunks.len() == 1 {
            debug!("transcript fits in a single call");
            self.backend
                .generate(SYSTEM_PROMPT, &summary_prompt(&chunks[0]))
                .await
                .map_err(as_summarization)?
        } else {
            info!(chunks = chunks.len(), "summarizing transcript in parts");
            let partials = self.summarize_chunks(&chunks).await?;
            self.consolidate(&partials).await?
        };

        let html = render_summary_html(&generated);
        if html.trim().is_empty() {
            return Err(ProviderError::summarization("generated summary is empty"));
        }
        Ok(Summary::new(html, meeting_id))
    }

    /// Map stage: one generation call per chunk, in order.
    pub async fn summarize_chunks(&self, chunks: &[String]) -> ProviderResult<Vec<String>> {
        let mut partials = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            debug!(part = index + 1, total = chunks.len(), "summarizing chunk");
            let partial = self
                .backend
                .generate(CHUNK_SYSTEM_PROMPT, &chunk_prompt(chunk, index, chunks.len()))
                .await
                .map_err(|err| {
                    ProviderError::summarization(format!(
                        "part {} of {} failed: {}",
                        index + 1,
                        chunks.len(),
                        err.message()
                    ))
                    .with_source(err)
                })?;
            partials.push(partial);
        }
        Ok(partials)
    }

    /// Consolidation stage: merges partial notes with one final call.
    pub async fn consolidate(&self, partials: &[String]) -> ProviderResult<String> {
        if partials.is_empty() {
            return Err(ProviderError::summarization("nothing to consolidate"));
        }
        self.backend
            .generate(SYSTEM_PROMPT, &consolidation_prompt(partials))
            .await
            .map_err(|err| {
                ProviderError::summarization(format!("consolidation failed: {}", err.message()))
                    .with_source(err)
            })
    }
}

fn as_summarization(err: ProviderError) -> ProviderError {
    match err.code() {
        crate::error::ProviderErrorCode::Summarization => err,
        _ => ProviderError::summarization(err.message().to_string()).with_source(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::provider::BoxFuture;
    use std::sync::Mutex;

    /// Records calls; fails the call whose system prompt equals `fail_on`.
    struct RecordingBackend {
        calls: Mutex<Vec<(String, String)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_on: None,
            })
        }

        fn failing_on(system_prompt: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(system_prompt),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl GenerationBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn generate<'a>(
            &'a self,
            system_prompt: &'a str,
            user_content: &'a str,
        ) -> BoxFuture<'a, ProviderResult<String>> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((system_prompt.to_string(), user_content.to_string()));
            let n = calls.len();
            let fail = self.fail_on == Some(system_prompt);
            Box::pin(async move {
                if fail {
                    Err(ProviderError::summarization("backend down"))
                } else {
                    Ok(format!("## Part\n- note {}", n))
                }
            })
        }
    }

    fn long_transcript(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| format!("Speaker {}: we discussed item number {} in some detail.", i, i))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    mod chunking {
        use super::*;

        #[test]
        fn short_text_is_one_chunk() {
            assert_eq!(chunk_transcript("  hello  ", 100), vec!["hello".to_string()]);
            assert!(chunk_transcript("   ", 100).is_empty());
        }

        #[test]
        fn packs_paragraphs_within_budget() {
            let text = long_transcript(10);
            let chunks = chunk_transcript(&text, 120);
            assert!(chunks.len() > 1);
            for chunk in &chunks {
                assert!(chunk.chars().count() <= 120, "chunk too long: {}", chunk);
            }
            let words: Vec<&str> = text.split_whitespace().collect();
            let rejoined: Vec<String> = chunks
                .iter()
                .flat_map(|c| c.split_whitespace().map(String::from))
                .collect();
            assert_eq!(rejoined, words);
        }

        #[test]
        fn long_line_splits_on_sentences() {
            let line = "First point here. Second point there! Third one? Fourth.";
            let chunks = chunk_transcript(line, 20);
            assert_eq!(
                chunks,
                vec!["First point here.", "Second point there!", "Third one?\nFourth."]
            );
        }

        #[test]
        fn unbroken_text_is_hard_split_on_char_boundaries() {
            let text = "é".repeat(25);
            let chunks = chunk_transcript(&text, 10);
            assert_eq!(chunks.len(), 3);
            assert_eq!(chunks[0].chars().count(), 10);
            assert_eq!(chunks[2].chars().count(), 5);
        }

        #[test]
        fn sentence_split_keeps_decimals_together() {
            assert_eq!(split_sentences("Cost is 3.5 units. Done"), vec!["Cost is 3.5 units.", "Done"]);
        }
    }

    #[tokio::test]
    async fn short_transcript_uses_one_call() {
        let backend = RecordingBackend::new();
        let summarizer = Summarizer::new(backend.clone());

        let summary = summarizer.summarize("m1", "Alice: hi\nBob: hello").await.unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_eq!(summary.source_meeting_id, "m1");
        assert!(summary.html_body.contains("<h3>Part</h3>"));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, SYSTEM_PROMPT);
        assert!(calls[0].1.contains("Executive Summary"));
        assert!(calls[0].1.contains("Bob: hello"));
    }

    #[tokio::test]
    async fn long_transcript_is_chunked_then_consolidated() {
        let backend = RecordingBackend::new();
        let summarizer = Summarizer::new(backend.clone()).with_max_chunk_chars(200);
        let text = long_transcript(12);
        let expected_chunks = chunk_transcript(&text, 200).len();
        assert!(expected_chunks > 1);

        let summary = summarizer.summarize("m1", &text).await.unwrap();

        assert_eq!(backend.call_count(), expected_chunks + 1);
        assert!(!summary.html_body.is_empty());
        let calls = backend.calls.lock().unwrap();
        let last = calls.last().unwrap();
        assert_eq!(last.0, SYSTEM_PROMPT);
        assert!(last.1.contains("### Part 1"));
        assert!(last.1.contains(&format!("### Part {}", expected_chunks)));
    }

    #[tokio::test]
    async fn consolidation_failure_is_reported() {
        let backend = RecordingBackend::failing_on(SYSTEM_PROMPT);
        let summarizer = Summarizer::new(backend.clone()).with_max_chunk_chars(200);
        let partials = summarizer
            .summarize_chunks(&chunk_transcript(&long_transcript(12), 200))
            .await
            .unwrap();

        let err = summarizer.consolidate(&partials).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Summarization);
        assert!(err.message().contains("consolidation"));
    }

    #[tokio::test]
    async fn chunk_failure_names_the_part() {
        let backend = RecordingBackend::failing_on(CHUNK_SYSTEM_PROMPT);
        let summarizer = Summarizer::new(backend.clone()).with_max_chunk_chars(200);

        let err = summarizer.summarize("m1", &long_transcript(12)).await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Summarization);
        assert!(err.message().starts_with("part 1 of"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_transcript_makes_no_calls() {
        let backend = RecordingBackend::new();
        let err = Summarizer::new(backend.clone()).summarize("m1", " \n ").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::Summarization);
        assert_eq!(backend.call_count(), 0);
    }
}
