//! Offline link inspection.

use teamsdigest_core::resolve_link;
use teamsdigest_providers::ProviderError;

use crate::error::{ClientError, ClientResult};

/// Prints the parsed meeting reference as JSON.
pub fn resolve(link: &str) -> ClientResult<()> {
    let reference = resolve_link(link).map_err(ProviderError::from)?;
    let json = serde_json::to_string_pretty(&reference)
        .map_err(|e| ClientError::Config(format!("failed to serialize reference: {}", e)))?;
    println!("{}", json);
    Ok(())
}
