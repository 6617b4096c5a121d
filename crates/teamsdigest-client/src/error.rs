//! Client error types.

use std::fmt;

use teamsdigest_core::RecipientError;
use teamsdigest_providers::ProviderError;

use crate::pipeline::PipelineError;
use crate::secret::SecretError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the CLI.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration file or setting error.
    Config(String),
    /// A secret reference could not be resolved.
    Secret(SecretError),
    /// Recipient list or subject rejected.
    Recipients(RecipientError),
    /// Error from a provider outside a pipeline run (login, setup).
    Provider(ProviderError),
    /// A pipeline run failed at some stage.
    Pipeline(Box<PipelineError>),
    /// IO error.
    Io(std::io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Secret(err) => write!(f, "configuration error: {}", err),
            Self::Recipients(err) => write!(f, "invalid recipients: {}", err),
            Self::Provider(err) => write!(f, "{}", err),
            Self::Pipeline(err) => write!(f, "{}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Secret(err) => Some(err),
            Self::Recipients(err) => Some(err),
            Self::Provider(err) => Some(err),
            Self::Pipeline(err) => Some(err.as_ref()),
            Self::Io(err) => Some(err),
            Self::Config(_) => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<SecretError> for ClientError {
    fn from(err: SecretError) -> Self {
        Self::Secret(err)
    }
}

impl From<RecipientError> for ClientError {
    fn from(err: RecipientError) -> Self {
        Self::Recipients(err)
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<PipelineError> for ClientError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(Box::new(err))
    }
}
