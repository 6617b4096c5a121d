//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints the effective configuration.
///
/// Secret references are printed as written, never resolved.
pub fn dump(config: &ClientConfig, path: &Path) -> ClientResult<()> {
    println!("# {}", path.display());
    println!("{}", config.to_toml()?);
    Ok(())
}

/// Checks that a full run could start with this configuration.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    config.validate()?;
    println!("Configuration is valid.");
    Ok(())
}

/// Shows the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    let state = if path.exists() { "" } else { " (not created)" };
    println!("config: {}{}", path.display(), state);
    Ok(())
}
