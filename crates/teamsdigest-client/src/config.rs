//! Client configuration.
//!
//! All settings live in one `config.toml`, by default at
//! `~/.config/teamsdigest/config.toml`. Every section is optional.
//!
//! ```toml
//! [microsoft]
//! client_id = "env::AZURE_CLIENT_ID"
//! tenant_id = "contoso.onmicrosoft.com"
//!
//! [openai]
//! api_key = "pass::work/openai"
//! model = "gpt-4o-mini"
//!
//! [mail]
//! default_recipients = ["team@contoso.com"]
//! ```
//!
//! Credential values support secret references (see [`crate::secret`]).
//! The environment variables `AZURE_CLIENT_ID`, `AZURE_TENANT_ID`,
//! `OPENAI_API_KEY`, `OPENAI_MODEL` and `OPENAI_BASE_URL` take precedence
//! over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use teamsdigest_core::RecipientList;
use teamsdigest_providers::microsoft::{DEFAULT_GRAPH_BASE_URL, GraphConfig, IdentityConfig};
use teamsdigest_providers::openai::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE, OpenAiConfig,
};
use teamsdigest_providers::summarize::DEFAULT_MAX_CHUNK_CHARS;

use crate::error::{ClientError, ClientResult};
use crate::secret;

/// Default subject line of summary emails.
pub const DEFAULT_SUBJECT: &str = "Teams Call Summary";

/// Configuration for the teamsdigest client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub microsoft: MicrosoftSettings,
    pub openai: OpenAiSettings,
    pub graph: GraphSettings,
    pub mail: MailSettings,
}

/// App registration used for sign-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrosoftSettings {
    /// Application (client) id. Supports secret references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Directory (tenant) id. Supports secret references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Requested scopes; empty keeps the built-in set.
    pub scopes: Vec<String>,
}

/// Generation API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// API key. Supports secret references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    /// Transcripts longer than this are summarized in chunks.
    pub max_chunk_chars: usize,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

/// Graph API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Attempts per call on throttling or server errors.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for GraphSettings {
    fn default() -> Self {
        let defaults = GraphConfig::default();
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            timeout_secs: defaults.timeout.as_secs(),
            max_attempts: defaults.max_attempts,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
        }
    }
}

/// Outgoing email settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// Used when no `--to` is given.
    pub default_recipients: Vec<String>,
    pub subject: String,
    pub save_to_sent_items: bool,
    /// Append the start of the transcript below the summary.
    pub include_transcript_excerpt: bool,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            default_recipients: Vec::new(),
            subject: DEFAULT_SUBJECT.to_string(),
            save_to_sent_items: true,
            include_transcript_excerpt: true,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::Config(format!("failed to parse config: {}", e)))
    }

    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("teamsdigest")
    }

    /// Applies the process environment on top of the file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, ignoring blank values.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("AZURE_CLIENT_ID") {
            self.microsoft.client_id = Some(value);
        }
        if let Some(value) = get("AZURE_TENANT_ID") {
            self.microsoft.tenant_id = Some(value);
        }
        if let Some(value) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(value);
        }
        if let Some(value) = get("OPENAI_MODEL") {
            self.openai.model = value;
        }
        if let Some(value) = get("OPENAI_BASE_URL") {
            self.openai.base_url = value;
        }
        self
    }

    /// Builds the sign-in settings, resolving secret references.
    pub fn identity_config(&self) -> ClientResult<IdentityConfig> {
        let client_id = resolve_required(
            self.microsoft.client_id.as_deref(),
            "microsoft.client_id",
            "AZURE_CLIENT_ID",
        )?;
        let tenant_id = resolve_required(
            self.microsoft.tenant_id.as_deref(),
            "microsoft.tenant_id",
            "AZURE_TENANT_ID",
        )?;

        let config =
            IdentityConfig::new(client_id, tenant_id).with_scopes(self.microsoft.scopes.clone());
        config.validate()?;
        Ok(config)
    }

    pub fn graph_config(&self) -> GraphConfig {
        let mut config = GraphConfig::default()
            .with_base_url(self.graph.base_url.clone())
            .with_max_attempts(self.graph.max_attempts)
            .with_initial_backoff(Duration::from_millis(self.graph.initial_backoff_ms));
        config.timeout = Duration::from_secs(self.graph.timeout_secs.max(1));
        config.save_to_sent_items = self.mail.save_to_sent_items;
        config
    }

    /// Builds the generation API settings, resolving the API key.
    pub fn openai_config(&self) -> ClientResult<OpenAiConfig> {
        let api_key =
            resolve_required(self.openai.api_key.as_deref(), "openai.api_key", "OPENAI_API_KEY")?;
        Ok(OpenAiConfig::new(api_key)
            .with_model(self.openai.model.clone())
            .with_base_url(self.openai.base_url.clone())
            .with_temperature(self.openai.temperature))
    }

    /// Builds the recipient list from `--to` values, or the configured
    /// defaults when none were given.
    pub fn recipients(&self, to: &[String], subject: Option<&str>) -> ClientResult<RecipientList> {
        let addresses = if to.is_empty() {
            self.mail.default_recipients.as_slice()
        } else {
            to
        };
        let subject = subject.unwrap_or(self.mail.subject.as_str());
        Ok(RecipientList::new(addresses, subject)?)
    }

    /// Checks every section that a full run needs.
    pub fn validate(&self) -> ClientResult<()> {
        self.identity_config()?;
        self.openai_config()?;

        if !(0.0..=2.0).contains(&self.openai.temperature) {
            return Err(ClientError::Config(format!(
                "openai.temperature must be between 0 and 2, got {}",
                self.openai.temperature
            )));
        }
        if self.openai.max_chunk_chars < 1_000 {
            return Err(ClientError::Config(
                "openai.max_chunk_chars must be at least 1000".to_string(),
            ));
        }
        if self.graph.max_attempts == 0 {
            return Err(ClientError::Config(
                "graph.max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.mail.default_recipients.is_empty() {
            RecipientList::new(&self.mail.default_recipients, &self.mail.subject)?;
        }
        Ok(())
    }
}

fn resolve_required(value: Option<&str>, key: &str, env: &str) -> ClientResult<String> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ClientError::Config(format!("{} is not set (config file or {})", key, env))
        })?;
    let resolved = secret::resolve(value)?;
    if resolved.trim().is_empty() {
        return Err(ClientError::Config(format!("{} resolved to an empty value", key)));
    }
    Ok(resolved.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> ClientConfig {
        ClientConfig::from_toml(
            r#"
[microsoft]
client_id = "11111111-2222-3333-4444-555555555555"
tenant_id = "contoso.onmicrosoft.com"

[openai]
api_key = "sk-test"
"#,
        )
        .unwrap()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.openai.temperature, 0.2);
        assert_eq!(config.graph.max_attempts, 3);
        assert_eq!(config.graph.initial_backoff_ms, 500);
        assert_eq!(config.mail.subject, "Teams Call Summary");
        assert!(config.mail.save_to_sent_items);
        assert!(config.mail.include_transcript_excerpt);
        assert!(config.microsoft.client_id.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = ClientConfig::from_toml(
            r#"
[graph]
max_attempts = 5

[mail]
subject = "Weekly sync"
"#,
        )
        .unwrap();
        assert_eq!(config.graph.max_attempts, 5);
        assert_eq!(config.graph.timeout_secs, 60);
        assert_eq!(config.mail.subject, "Weekly sync");
        assert!(config.mail.include_transcript_excerpt);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ClientConfig::from_toml("[graph\nmax_attempts = ").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[openai]\nmodel = \"gpt-4o\"\n").unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.openai.model, "gpt-4o");
    }

    #[test]
    fn load_from_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("AZURE_TENANT_ID", "fabrikam.onmicrosoft.com"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_BASE_URL", "   "),
        ]
        .into_iter()
        .collect();

        let config = complete().with_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.microsoft.tenant_id.as_deref(), Some("fabrikam.onmicrosoft.com"));
        assert_eq!(
            config.microsoft.client_id.as_deref(),
            Some("11111111-2222-3333-4444-555555555555")
        );
        assert_eq!(config.openai.model, "gpt-4o");
        assert_eq!(config.openai.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn builds_provider_configs() {
        let config = complete();
        let identity = config.identity_config().unwrap();
        assert_eq!(identity.tenant_id, "contoso.onmicrosoft.com");
        assert!(identity.scopes.iter().any(|s| s == "Mail.Send"));

        let openai = config.openai_config().unwrap();
        assert_eq!(openai.api_key, "sk-test");
        assert_eq!(openai.model, DEFAULT_MODEL);

        let graph = config.graph_config();
        assert_eq!(graph.max_attempts, 3);
        assert_eq!(graph.initial_backoff, Duration::from_millis(500));
        assert!(graph.save_to_sent_items);
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let err = ClientConfig::default().identity_config().unwrap_err();
        assert!(err.to_string().contains("AZURE_CLIENT_ID"));

        let err = ClientConfig::default().openai_config().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn secret_reference_in_api_key() {
        unsafe {
            std::env::set_var("_TEAMSDIGEST_TEST_OPENAI_KEY", "sk-from-env");
        }
        let mut config = complete();
        config.openai.api_key = Some("env::_TEAMSDIGEST_TEST_OPENAI_KEY".into());
        assert_eq!(config.openai_config().unwrap().api_key, "sk-from-env");
        unsafe {
            std::env::remove_var("_TEAMSDIGEST_TEST_OPENAI_KEY");
        }
    }

    #[test]
    fn recipients_fall_back_to_defaults() {
        let mut config = complete();
        config.mail.default_recipients = vec!["team@contoso.com".into()];

        let list = config.recipients(&[], None).unwrap();
        assert_eq!(list.addresses(), ["team@contoso.com".to_string()]);
        assert_eq!(list.subject(), DEFAULT_SUBJECT);

        let list = config
            .recipients(&["lead@contoso.com".into()], Some("Retro"))
            .unwrap();
        assert_eq!(list.addresses(), ["lead@contoso.com".to_string()]);
        assert_eq!(list.subject(), "Retro");
    }

    #[test]
    fn no_recipients_anywhere_errors() {
        let err = complete().recipients(&[], None).unwrap_err();
        assert!(matches!(err, ClientError::Recipients(_)));
    }

    #[test]
    fn validate_checks_ranges() {
        assert!(complete().validate().is_ok());

        let mut config = complete();
        config.openai.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = complete();
        config.mail.default_recipients = vec!["not-an-address".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn dump_round_trips() {
        let config = complete();
        let text = config.to_toml().unwrap();
        assert!(text.contains("[microsoft]"));
        let back = ClientConfig::from_toml(&text).unwrap();
        assert_eq!(back.microsoft.tenant_id, config.microsoft.tenant_id);
    }
}
