//! External collaborators of a teamsdigest run.
//!
//! - [`microsoft`] - device-code sign-in, session management, Graph client
//! - [`openai`] - chat-completions generation backend
//! - [`summarize`] - chunked, two-stage summarization
//! - [`provider`] - the trait seams the pipeline is written against
//! - [`error`] - the shared error taxonomy
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   TokenSource   ┌─────────────┐
//! │ AuthSessionManager│◀────────────────│ GraphClient │──▶ meetings, transcripts, mail
//! └─────────┬─────────┘                 └─────────────┘
//!           │ IdentityProvider
//!           ▼
//! ┌───────────────────┐                 ┌─────────────┐  GenerationBackend  ┌──────────────┐
//! │ MicrosoftIdentity │                 │ Summarizer  │────────────────────▶│ OpenAiClient │
//! └───────────────────┘                 └─────────────┘                     └──────────────┘
//! ```

pub mod error;
pub mod microsoft;
pub mod openai;
pub mod provider;
pub mod summarize;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{
    BoxFuture, DeviceCodeGrant, GenerationBackend, IdentityProvider, MeetingGraph, PollOutcome,
    TokenGrant, TokenSource,
};
pub use summarize::{Summarizer, chunk_transcript};
