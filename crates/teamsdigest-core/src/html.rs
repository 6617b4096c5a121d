//! HTML rendering for summaries and the outgoing email.
//!
//! Generated text is never trusted: model output that already is HTML goes
//! through [`sanitize_html`], anything else is treated as lightweight
//! markdown and escaped line by line in [`markdown_to_html`].

use std::collections::HashSet;
use std::sync::LazyLock;

use ammonia::Builder;
use chrono::{DateTime, Utc};
use regex::Regex;

/// Tags kept in summaries. Everything else is unwrapped to its text.
const ALLOWED_TAGS: &[&str] = &[
    "h2", "h3", "h4", "p", "ul", "ol", "li", "strong", "em", "b", "i", "br", "hr", "div", "pre",
    "blockquote", "table", "thead", "tbody", "tr", "th", "td", "a",
];

/// Elements dropped together with their content.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "title", "iframe", "object", "embed", "noscript", "svg", "math",
    "template", "textarea", "select",
];

static SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::empty();
    builder
        .add_tags(ALLOWED_TAGS)
        .add_tag_attributes("a", &["href"])
        .url_schemes(HashSet::from(["http", "https", "mailto"]))
        .link_rel(None)
        .clean_content_tags(DROPPED_ELEMENTS.iter().copied().collect())
        .strip_comments(true);
    builder
});

static CODE_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[A-Za-z]*\s*$").expect("Invalid code fence regex"));

static STRUCTURAL_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(h[1-6]|p|ul|ol|li|div|table|strong|em|br|section)\b")
        .expect("Invalid structural tag regex")
});

static BOLD_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("Invalid bold regex"));

static NUMBERED_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.)]\s+").expect("Invalid numbered item regex"));

/// Escapes text for inclusion in HTML.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Reduces an HTML fragment to an allowlist of formatting tags.
///
/// Only headings, paragraphs, lists, emphasis, tables and `http(s)`/`mailto`
/// links survive; no attributes other than `href` are kept. Scripts, styles
/// and frames are dropped with their content, any other tag is replaced by
/// its text.
pub fn sanitize_html(fragment: &str) -> String {
    let html = CODE_FENCE_REGEX.replace_all(fragment, "");
    SANITIZER.clean(&html).to_string().trim().to_string()
}

/// Returns true if generated text already uses HTML structure.
pub fn looks_like_html(text: &str) -> bool {
    STRUCTURAL_TAG_REGEX.is_match(text)
}

/// Converts lightweight markdown (headings, bullets, bold) into HTML.
///
/// All text is escaped; only the tags emitted here appear in the output.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in markdown.lines() {
        let trimmed = line.trim();

        if let Some(item) = list_item(trimmed) {
            if !in_list {
                out.push("<ul>".to_string());
                in_list = true;
            }
            out.push(format!("<li>{}</li>", inline(item)));
            continue;
        }

        if in_list {
            out.push("</ul>".to_string());
            in_list = false;
        }

        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            out.push(format!("<h3>{}</h3>", inline(heading)));
        } else if !trimmed.is_empty() {
            out.push(format!("<p>{}</p>", inline(trimmed)));
        }
    }

    if in_list {
        out.push("</ul>".to_string());
    }

    out.join("\n")
}

/// Renders raw generation output as a safe HTML fragment.
pub fn render_summary_html(generated: &str) -> String {
    let cleaned = CODE_FENCE_REGEX.replace_all(generated, "");
    if looks_like_html(&cleaned) {
        sanitize_html(&cleaned)
    } else {
        markdown_to_html(&cleaned)
    }
}

/// Wraps a summary fragment into the email body.
///
/// `excerpt`, when given, is appended in a preformatted block below the
/// summary.
pub fn email_document(summary_html: &str, excerpt: Option<&str>, sent_at: DateTime<Utc>) -> String {
    let mut parts = vec![
        r#"<div style="font-family:Segoe UI,Arial,sans-serif; line-height:1.5">"#.to_string(),
        summary_html.to_string(),
    ];

    if let Some(excerpt) = excerpt.filter(|e| !e.trim().is_empty()) {
        parts.push("<hr/>".to_string());
        parts.push("<p><strong>Transcript excerpt:</strong></p>".to_string());
        parts.push(format!(
            r#"<pre style="white-space:pre-wrap">{}</pre>"#,
            html_escape(excerpt)
        ));
    }

    parts.push(format!(
        r#"<p style="color:#888">Sent {}</p>"#,
        html_escape(&sent_at.format("%Y-%m-%d %H:%M UTC").to_string())
    ));
    parts.push("</div>".to_string());
    parts.join("\n")
}

fn list_item(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    NUMBERED_ITEM_REGEX
        .find(line)
        .map(|m| line[m.end()..].trim())
}

fn inline(text: &str) -> String {
    BOLD_REGEX
        .replace_all(&html_escape(text), "<strong>$1</strong>")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    mod sanitize {
        use super::*;

        #[test]
        fn strips_script_blocks() {
            let html = "<h3>Summary</h3><script>alert('x')</script><p>ok</p>";
            assert_eq!(sanitize_html(html), "<h3>Summary</h3><p>ok</p>");
        }

        #[test]
        fn strips_unclosed_script_tag() {
            let html = "<p>a</p><script src=\"https://evil.example/x.js\">";
            assert_eq!(sanitize_html(html), "<p>a</p>");
        }

        #[test]
        fn strips_event_handlers_and_script_urls() {
            let html = r#"<p onclick="steal()">x</p><a href="javascript:alert(1)">y</a>"#;
            let clean = sanitize_html(html);
            assert!(!clean.contains("onclick"));
            assert!(!clean.to_lowercase().contains("javascript"));
            assert_eq!(clean, "<p>x</p><a>y</a>");
        }

        #[test]
        fn nested_script_fragments_do_not_reassemble() {
            let html = "<p>Summary</p><scr<script>ipt>alert(1)</scr<script>ipt>";
            let clean = sanitize_html(html).to_lowercase();
            assert!(clean.starts_with("<p>summary</p>"));
            assert!(!clean.contains("<script"));
            assert!(!clean.contains("<scr"));
        }

        #[test]
        fn slash_separated_handler_is_removed() {
            let clean = render_summary_html("<p>Summary</p><img/src=x/onerror=alert(1)>");
            assert_eq!(clean, "<p>Summary</p>");
        }

        #[test]
        fn unknown_tags_keep_their_text() {
            let html = r#"<section><p style="color:red" class="x">Budget <u>approved</u></p></section>"#;
            assert_eq!(sanitize_html(html), "<p>Budget approved</p>");
        }

        #[test]
        fn keeps_web_links() {
            let html = r#"<p><a href="https://contoso.com/plan">plan</a></p>"#;
            assert_eq!(sanitize_html(html), html);
        }

        #[test]
        fn strips_document_wrapper_and_fences() {
            let html = "```html\n<!DOCTYPE html><html><head><title>t</title></head><body><p>hi</p></body></html>\n```";
            assert_eq!(sanitize_html(html), "<p>hi</p>");
        }

        #[test]
        fn keeps_plain_structure() {
            let html = "<h3>Decisions</h3>\n<ul><li>Ship it</li></ul>";
            assert_eq!(sanitize_html(html), html);
        }
    }

    mod markdown {
        use super::*;

        #[test]
        fn renders_headings_lists_and_paragraphs() {
            let md = "## Executive Summary\n- Shipped **v2** on time\n- Budget <approved>\n\nNext steps follow.";
            let html = markdown_to_html(md);
            insta::assert_snapshot!(html, @r"
            <h3>Executive Summary</h3>
            <ul>
            <li>Shipped <strong>v2</strong> on time</li>
            <li>Budget &lt;approved&gt;</li>
            </ul>
            <p>Next steps follow.</p>
            ");
        }

        #[test]
        fn numbered_items_become_list_items() {
            let html = markdown_to_html("1. first\n2) second");
            assert_eq!(html, "<ul>\n<li>first</li>\n<li>second</li>\n</ul>");
        }

        #[test]
        fn render_picks_sanitizer_for_html() {
            let out = render_summary_html("<h3>A</h3><script>x</script>");
            assert_eq!(out, "<h3>A</h3>");
        }

        #[test]
        fn render_picks_markdown_for_text() {
            let out = render_summary_html("- <b>not html</b>");
            assert_eq!(out, "<ul>\n<li>&lt;b&gt;not html&lt;/b&gt;</li>\n</ul>");
        }
    }

    #[test]
    fn email_document_with_excerpt() {
        let sent = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let doc = email_document("<p>s</p>", Some("Alice: <hi>"), sent);
        assert!(doc.starts_with("<div"));
        assert!(doc.contains("<p>s</p>"));
        assert!(doc.contains("Alice: &lt;hi&gt;"));
        assert!(doc.contains("Sent 2024-03-15 10:30 UTC"));
        assert!(doc.ends_with("</div>"));
    }

    #[test]
    fn email_document_without_excerpt() {
        let sent = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let doc = email_document("<p>s</p>", None, sent);
        assert!(!doc.contains("<hr/>"));
    }
}
