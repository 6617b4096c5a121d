//! teamsdigest CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use teamsdigest_client::cli::{Cli, Command, ConfigAction, LogFormat};
use teamsdigest_client::commands;
use teamsdigest_client::config::ClientConfig;
use teamsdigest_client::error::{ClientError, ClientResult};
use teamsdigest_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing = match cli.log_format {
        LogFormat::Json if cli.debug => TracingConfig::structured().with_level(Level::DEBUG),
        LogFormat::Json => TracingConfig::structured(),
        LogFormat::Text => TracingConfig::for_cli(cli.debug),
    };
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if let ClientError::Pipeline(err) = &e {
                eprintln!("hint: {}", err.hint());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)?
    } else {
        ClientConfig::load()?
    };

    match cli.command {
        Command::Run { link, mail } => {
            commands::run::run(&config.with_env_overrides(), &link, &mail).await
        }
        Command::Summarize {
            transcript_file,
            mail,
        } => {
            commands::run::summarize(&config.with_env_overrides(), &transcript_file, &mail).await
        }
        Command::Login => commands::login::login(&config.with_env_overrides()).await,
        Command::Resolve { link } => commands::resolve::resolve(&link),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config.with_env_overrides()),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}
