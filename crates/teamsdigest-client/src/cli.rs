//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// teamsdigest - Summarize Teams meeting transcripts and email them
#[derive(Debug, Parser)]
#[command(name = "teamsdigest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "TEAMSDIGEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Options shared by the commands that send a summary.
#[derive(Debug, Clone, clap::Args)]
pub struct MailArgs {
    /// Recipient address (repeat or comma-separate); defaults to mail.default_recipients
    #[arg(long, short, value_delimiter = ',')]
    pub to: Vec<String>,

    /// Email subject; defaults to mail.subject
    #[arg(long, short)]
    pub subject: Option<String>,

    /// Do not quote the start of the transcript below the summary
    #[arg(long)]
    pub no_excerpt: bool,

    /// Generate the summary and print it instead of sending it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize a meeting from its join link and email the summary
    Run {
        /// Teams meeting join link (SafeLinks and launcher links are accepted)
        link: String,

        #[command(flatten)]
        mail: MailArgs,
    },

    /// Summarize a local transcript file (plain text or WebVTT) and email it
    Summarize {
        /// Transcript file
        #[arg(long, short = 'f')]
        transcript_file: PathBuf,

        #[command(flatten)]
        mail: MailArgs,
    },

    /// Sign in with a device code and show the account
    Login,

    /// Parse a meeting link and print what was extracted, without network access
    Resolve {
        /// Teams meeting join link
        link: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration (secrets stay as references)
    Dump,
    /// Validate the configuration
    Validate,
    /// Show the configuration file path
    Path,
}
