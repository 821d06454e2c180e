//! `config.toml` loading.
//!
//! Resolution order: built-in defaults, then the TOML file
//! (`$PLANBRIDGE_CONFIG` or `<config_dir>/planbridge/config.toml`; a missing
//! file is not an error), then `PLANBRIDGE_*` environment overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::resilience::{CircuitBreakerConfig, RateLimiterConfig, RetryPolicy};

pub use toml::ser::Error as TomlSerError;

pub const CONFIG_PATH_ENV: &str = "PLANBRIDGE_CONFIG";
pub const CLIENT_ID_ENV: &str = "PLANBRIDGE_CLIENT_ID";
pub const TENANT_ID_ENV: &str = "PLANBRIDGE_TENANT_ID";
pub const TOKEN_STORE_ENV: &str = "PLANBRIDGE_TOKEN_STORE";
pub const LOG_ENV: &str = "PLANBRIDGE_LOG";
/// Bypasses sign-in with a caller-managed bearer token.
pub const ACCESS_TOKEN_ENV: &str = "PLANBRIDGE_ACCESS_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    File,
    Memory,
}

impl std::str::FromStr for TokenStoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenStoreKind::File),
            "memory" => Ok(TokenStoreKind::Memory),
            other => Err(format!("unknown token store '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub tenant_id: String,
    pub scopes: Vec<String>,
    pub authority: String,
    pub token_store: TokenStoreKind,
    /// Overrides the default `<config_dir>/planbridge/tokens.json`.
    pub token_path: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant_id: "common".to_string(),
            scopes: vec![
                "offline_access".to_string(),
                "User.Read".to_string(),
                "Tasks.ReadWrite".to_string(),
                "Calendars.ReadWrite".to_string(),
                "Group.Read.All".to_string(),
            ],
            authority: "https://login.microsoftonline.com".to_string(),
            token_store: TokenStoreKind::File,
            token_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0/".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl GraphConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_level(&self) -> LogLevel {
        self.level.parse().unwrap_or(LogLevel::Info)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub graph: GraphConfig,
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("planbridge").join("config.toml")
    }

    /// Path that [`Config::load_default`] reads.
    pub fn resolved_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_path)
    }

    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::resolved_path();
        let mut config = if path.exists() {
            Self::parse(&fs::read_to_string(&path)?)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::parse(&fs::read_to_string(path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PLANBRIDGE_*` overrides. Unparsable values are ignored with a
    /// warning rather than failing startup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup(CLIENT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.auth.client_id = Some(id.trim().to_string());
        }
        if let Some(tenant) = lookup(TENANT_ID_ENV).filter(|v| !v.trim().is_empty()) {
            self.auth.tenant_id = tenant.trim().to_string();
        }
        if let Some(kind) = lookup(TOKEN_STORE_ENV) {
            match kind.parse() {
                Ok(kind) => self.auth.token_store = kind,
                Err(e) => tracing::warn!("Ignoring {}: {}", TOKEN_STORE_ENV, e),
            }
        }
        if let Some(level) = lookup(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level.trim().to_string();
        }
    }

    /// Semantic checks; every problem is reported, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.graph.base_url) {
            Ok(url) if url.scheme() == "https" || url.scheme() == "http" => {}
            Ok(url) => errors.push(format!(
                "graph.base_url must be http(s), got scheme '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("graph.base_url is not a valid URL: {}", e)),
        }
        if url::Url::parse(&self.auth.authority).is_err() {
            errors.push("auth.authority is not a valid URL".to_string());
        }
        if self.graph.request_timeout_secs == 0 {
            errors.push("graph.request_timeout_secs must be greater than 0".to_string());
        }
        if self.rate_limiter.max_requests_per_minute == 0 {
            errors.push("rate_limiter.max_requests_per_minute must be greater than 0".to_string());
        }
        if self.rate_limiter.burst_allowance == Some(0) {
            errors.push("rate_limiter.burst_allowance must be greater than 0".to_string());
        }
        if self.circuit_breaker.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be greater than 0".to_string());
        }
        if self.circuit_breaker.success_threshold == 0 {
            errors.push("circuit_breaker.success_threshold must be greater than 0".to_string());
        }
        if self.retry.max_retries > 10 {
            errors.push("retry.max_retries must be at most 10".to_string());
        }
        if self.auth.scopes.is_empty() {
            errors.push("auth.scopes must not be empty".to_string());
        }
        if let Err(e) = self.logging.level.parse::<LogLevel>() {
            errors.push(format!("logging.level: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn to_toml_string(&self) -> Result<String, TomlSerError> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.rate_limiter.max_requests_per_minute, 60);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.circuit_breaker.timeout_ms, 60_000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert_eq!(config.auth.tenant_id, "common");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = Config::from_toml_str(
            r#"
            [auth]
            client_id = "abc"

            [rate_limiter]
            max_requests_per_minute = 120
            burst_allowance = 10

            [retry]
            base_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.auth.client_id.as_deref(), Some("abc"));
        assert_eq!(config.auth.token_store, TokenStoreKind::File);
        assert_eq!(config.rate_limiter.burst_allowance, Some(10));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 250);
    }

    #[test]
    fn validation_collects_every_problem() {
        let err = Config::from_toml_str(
            r#"
            [graph]
            base_url = "not a url"
            request_timeout_secs = 0

            [circuit_breaker]
            failure_threshold = 0

            [logging]
            level = "loud"
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Invalid(errors) => {
                assert_eq!(errors.len(), 4, "{:?}", errors);
            }
            other => panic!("expected validation error, got {}", other),
        }
    }

    #[test]
    fn syntax_errors_are_toml_errors() {
        assert!(matches!(
            Config::from_toml_str("[auth\nclient_id = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (CLIENT_ID_ENV, "env-client"),
            (TENANT_ID_ENV, "contoso"),
            (TOKEN_STORE_ENV, "memory"),
            (LOG_ENV, "debug"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.auth.client_id.as_deref(), Some("env-client"));
        assert_eq!(config.auth.tenant_id, "contoso");
        assert_eq!(config.auth.token_store, TokenStoreKind::Memory);
        assert_eq!(config.logging.log_level(), LogLevel::Debug);
    }

    #[test]
    fn bad_token_store_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|k| (k == TOKEN_STORE_ENV).then(|| "keychain".to_string()));
        assert_eq!(config.auth.token_store, TokenStoreKind::File);
    }

    #[test]
    fn serializes_back_to_toml() {
        let text = Config::default().to_toml_string().unwrap();
        assert!(text.contains("[rate_limiter]"));
        let reparsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(reparsed, Config::default());
    }
}
