//! WebVTT transcript flattening.
//!
//! Teams delivers transcripts as WebVTT where each cue carries a voice tag:
//!
//! ```text
//! WEBVTT
//!
//! 0f3b/12-0
//! 00:00:03.120 --> 00:00:05.840
//! <v Alice Smith>Good morning everyone.</v>
//! ```
//!
//! [`flatten_vtt`] reduces that to `Speaker: text` lines, merging consecutive
//! cues spoken by the same person.

use std::sync::LazyLock;

use regex::Regex;

static VOICE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<v(?:\.[^\s>]+)*\s+([^>]+)>(.*?)(?:</v>)?$").expect("Invalid voice tag regex")
});

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid tag regex"));

/// Flattens WebVTT content into plain `Speaker: text` lines.
///
/// Input that does not start with the `WEBVTT` signature is returned
/// trimmed and otherwise untouched.
pub fn flatten_vtt(content: &str) -> String {
    let content = content.trim_start_matches('\u{feff}');
    if !content.trim_start().starts_with("WEBVTT") {
        return content.trim().to_string();
    }

    let normalized = content.replace("\r\n", "\n");
    let mut turns: Vec<(Option<String>, String)> = Vec::new();

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().collect();
        let Some(timing) = lines.iter().position(|l| l.contains("-->")) else {
            // Header, NOTE and STYLE blocks carry no timing line.
            continue;
        };

        for line in &lines[timing + 1..] {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (speaker, text) = match VOICE_REGEX.captures(line) {
                Some(caps) => (
                    Some(caps[1].trim().to_string()),
                    TAG_REGEX.replace_all(&caps[2], "").trim().to_string(),
                ),
                None => (None, TAG_REGEX.replace_all(line, "").trim().to_string()),
            };
            if text.is_empty() {
                continue;
            }

            match turns.last_mut() {
                Some((last_speaker, last_text)) if *last_speaker == speaker => {
                    last_text.push(' ');
                    last_text.push_str(&text);
                }
                _ => turns.push((speaker, text)),
            }
        }
    }

    turns
        .into_iter()
        .map(|(speaker, text)| match speaker {
            Some(name) => format!("{}: {}", name, text),
            None => text,
        })
        .collect::<Vec<_>>()
        .join("\n")
}
