//! Configuration management for Relaycast
//!
//! Non-secret settings (destination group, accounts, tuning) live in a TOML
//! file. API credentials are read from the environment so they never end up
//! in the config file.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Account;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
pub const DEFAULT_X_API: &str = "https://api.twitter.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub x: XConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Destination supergroup; `TELEGRAM_GROUP_ID` takes precedence
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    #[serde(default = "default_x_api")]
    pub api_base: String,
    /// Size of the recent-posts window fetched per account
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Attempts per upstream call when rate limited
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Per-request timeout, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding the state files; defaults to the XDG data dir
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_telegram_api() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}

fn default_x_api() -> String {
    DEFAULT_X_API.to_string()
}

fn default_max_results() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            group_id: None,
            api_base: default_telegram_api(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            api_base: default_x_api(),
            max_results: default_max_results(),
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl XConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default location, apply environment
    /// overrides and validate it
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = Self::load_from_path(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path without validating it
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(group_id) = non_empty_env("TELEGRAM_GROUP_ID") {
            self.telegram.group_id = Some(group_id);
        }
    }

    /// Check every required value up front, before any network call
    pub fn validate(&self) -> Result<()> {
        if self.group_id().is_none() {
            return Err(ConfigError::MissingField(
                "telegram.group_id (or TELEGRAM_GROUP_ID)".to_string(),
            )
            .into());
        }

        if self.accounts.is_empty() {
            return Err(ConfigError::MissingField("accounts".to_string()).into());
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.handle.trim().is_empty() {
                return Err(ConfigError::Invalid("account handle cannot be empty".to_string()).into());
            }
            if account.topic_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "missing topic id for account '{}'",
                    account.handle
                ))
                .into());
            }
            if !seen.insert(account.handle.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "account '{}' is configured more than once",
                    account.handle
                ))
                .into());
            }
        }

        if !(5..=100).contains(&self.x.max_results) {
            return Err(ConfigError::Invalid(format!(
                "x.max_results must be between 5 and 100 (got {})",
                self.x.max_results
            ))
            .into());
        }

        if self.x.max_retries == 0 {
            return Err(ConfigError::Invalid("x.max_retries must be at least 1".to_string()).into());
        }

        if self.x.timeout_secs == 0 || self.telegram.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "x.timeout_secs and telegram.timeout_secs must be at least 1".to_string(),
            )
            .into());
        }

        Ok(())
    }

    pub fn group_id(&self) -> Option<&str> {
        self.telegram
            .group_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    /// Directory holding the state files
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state.dir {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).to_string())),
            None => resolve_data_path(),
        }
    }
}

/// API credentials, read from the environment
pub struct Credentials {
    pub telegram_token: SecretString,
    pub x: XCredentials,
}

/// OAuth 1.0a user-context credentials for the X API
pub struct XCredentials {
    pub api_key: String,
    pub api_secret: SecretString,
    pub access_token: String,
    pub access_secret: SecretString,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(non_empty_env)
    }

    /// Build credentials from an arbitrary variable lookup
    ///
    /// Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnv(name.to_string()).into())
        };

        Ok(Self {
            telegram_token: SecretString::from(require("TELEGRAM_BOT_TOKEN")?),
            x: XCredentials {
                api_key: require("X_API_KEY")?,
                api_secret: SecretString::from(require("X_API_SECRET")?),
                access_token: require("X_ACCESS_TOKEN")?,
                access_secret: SecretString::from(require("X_ACCESS_SECRET")?),
            },
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("telegram_token", &"[REDACTED]")
            .field("x", &self.x)
            .finish()
    }
}

impl std::fmt::Debug for XCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("access_token", &self.access_token)
            .field("access_secret", &"[REDACTED]")
            .finish()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("RELAYCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("relaycast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("relaycast"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[telegram]
group_id = "-1001234567890"

[[accounts]]
handle = "acme"
topic_id = "10"

[[accounts]]
handle = "globex"
topic_id = "20"
"#;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("X_API_KEY", "key"),
            ("X_API_SECRET", "secret"),
            ("X_ACCESS_TOKEN", "token"),
            ("X_ACCESS_SECRET", "token-secret"),
        ])
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.group_id(), Some("-1001234567890"));
        assert_eq!(config.telegram.api_base, DEFAULT_TELEGRAM_API);
        assert_eq!(config.x.api_base, DEFAULT_X_API);
        assert_eq!(config.x.max_results, 5);
        assert_eq!(config.x.max_retries, 3);
        assert_eq!(config.x.backoff_base(), Duration::from_secs(5));
        assert_eq!(config.x.timeout(), Duration::from_secs(30));
        assert_eq!(config.telegram.timeout(), Duration::from_secs(30));
        assert_eq!(
            config.accounts,
            vec![Account::new("acme", "10"), Account::new("globex", "20")]
        );
    }

    #[test]
    fn test_missing_group_id_is_fatal() {
        let config = Config::from_toml_str(
            r#"
[[accounts]]
handle = "acme"
topic_id = "10"
"#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telegram.group_id"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_empty_accounts_is_fatal() {
        let config = Config::from_toml_str("[telegram]\ngroup_id = \"-1\"\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("accounts"));
    }

    #[test]
    fn test_missing_topic_is_fatal() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.accounts[1].topic_id = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("missing topic id for account 'globex'"));
    }

    #[test]
    fn test_duplicate_handle_is_fatal() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.accounts.push(Account::new("acme", "30"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_max_results_range() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.x.max_results = 4;
        assert!(config.validate().is_err());
        config.x.max_results = 101;
        assert!(config.validate().is_err());
        config.x.max_results = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.x.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.telegram.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml_str("[[accounts]\nhandle = ");
        match result {
            Err(RelayError::Config(ConfigError::ParseError(_))) => {}
            other => panic!("Expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_state_dir_expands_tilde() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.state.dir = Some("/var/lib/relaycast".to_string());
        assert_eq!(config.state_dir().unwrap(), PathBuf::from("/var/lib/relaycast"));

        config.state.dir = Some("~/relaycast".to_string());
        let dir = config.state_dir().unwrap();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("relaycast"));
    }

    #[test]
    fn test_credentials_from_lookup() {
        let env = full_env();
        let creds = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(creds.telegram_token.expose_secret(), "123:abc");
        assert_eq!(creds.x.api_key, "key");
        assert_eq!(creds.x.access_secret.expose_secret(), "token-secret");
    }

    #[test]
    fn test_credentials_missing_value_names_variable() {
        let mut env = full_env();
        env.remove("X_ACCESS_TOKEN");
        let err = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing environment variable: X_ACCESS_TOKEN"
        );
    }

    #[test]
    fn test_credentials_empty_value_counts_as_missing() {
        let mut env = full_env();
        env.insert("TELEGRAM_BOT_TOKEN", "");
        let err = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap_err();
        assert!(err.to_string().contains("TELEGRAM_BOT_TOKEN"));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let env = full_env();
        let creds = Credentials::from_lookup(|name| env.get(name).map(|v| v.to_string())).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("123:abc"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    #[serial]
    fn test_load_applies_group_id_override() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        std::env::set_var("RELAYCAST_CONFIG", &path);
        std::env::set_var("TELEGRAM_GROUP_ID", "-100999");
        let config = Config::load();
        std::env::remove_var("RELAYCAST_CONFIG");
        std::env::remove_var("TELEGRAM_GROUP_ID");

        assert_eq!(config.unwrap().group_id(), Some("-100999"));
    }

    #[test]
    #[serial]
    fn test_load_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("RELAYCAST_CONFIG", temp_dir.path().join("nope.toml"));
        let result = Config::load();
        std::env::remove_var("RELAYCAST_CONFIG");

        match result {
            Err(RelayError::Config(ConfigError::ReadError(_))) => {}
            other => panic!("Expected read error, got {:?}", other),
        }
    }
}
