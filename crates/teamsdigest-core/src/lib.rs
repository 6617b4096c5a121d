//! Core types: meeting links, transcripts, summaries, HTML rendering

pub mod html;
pub mod links;
pub mod model;
pub mod tracing;
pub mod vtt;

pub use html::{email_document, html_escape, markdown_to_html, render_summary_html, sanitize_html};
pub use links::{resolve_link, LinkError, LinkResolver};
pub use model::{MeetingReference, RecipientError, RecipientList, Summary, Transcript};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
pub use vtt::flatten_vtt;
