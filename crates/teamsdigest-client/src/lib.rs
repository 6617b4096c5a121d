//! Pipeline orchestrator, configuration and CLI
//!
//! This crate provides the `teamsdigest` command-line interface and the
//! [`Pipeline`] that sequences link resolution, sign-in, transcript
//! download, summarization and mail delivery.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use pipeline::{
    NoProgress, Pipeline, PipelineError, PipelineOptions, ProgressSink, Stage,
};
