//! Application configuration: an optional TOML file overlaid by environment
//! variables.

use crate::{ConfigError, FilterConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";
pub const DEFAULT_DATABASE_PATH: &str = "./data/bluesky_feed.db";
pub const MAX_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_service_url")]
    pub service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_max_items")]
    pub max_items_per_fetch: usize,
    #[serde(default)]
    pub filters: FilterConfig,
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_stats_interval() -> u64 {
    60
}

fn default_max_items() -> usize {
    50
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            handle: String::new(),
            password: String::new(),
            service_url: default_service_url(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            stats_interval_secs: default_stats_interval(),
            max_items_per_fetch: default_max_items(),
            filters: FilterConfig::default(),
        }
    }
}

impl StreamingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reads the optional file, applies the process environment and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(handle) = env.get("BLUESKY_HANDLE") {
            self.bluesky.handle = handle.clone();
        }
        if let Some(password) = env.get("BLUESKY_PASSWORD") {
            self.bluesky.password = password.clone();
        }
        if let Some(url) = env.get("BLUESKY_SERVICE_URL") {
            self.bluesky.service_url = url.clone();
        }
        if let Some(path) = env.get("DATABASE_PATH") {
            self.database.path = path.clone();
        }
        if let Some(value) = env.get("POLL_INTERVAL") {
            self.streaming.poll_interval_secs = parse_number("POLL_INTERVAL", value)?;
        }
        if let Some(value) = env.get("STATS_INTERVAL") {
            self.streaming.stats_interval_secs = parse_number("STATS_INTERVAL", value)?;
        }
        if let Some(value) = env.get("MAX_POSTS_PER_FETCH") {
            self.streaming.max_items_per_fetch = parse_number("MAX_POSTS_PER_FETCH", value)?;
        }
        if let Some(value) = env.get("FILTER_AUTHORS") {
            self.streaming.filters.authors = split_list(value).collect();
        }
        if let Some(value) = env.get("FILTER_KEYWORDS") {
            self.streaming.filters.keywords = split_list(value).collect();
        }
        debug!("Configuration after environment overlay: {:?}", self.redacted());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bluesky.handle.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "BLUESKY_HANDLE".to_string(),
            });
        }
        if self.bluesky.password.is_empty() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: "BLUESKY_PASSWORD".to_string(),
            });
        }
        if self.streaming.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if self.streaming.stats_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stats_interval_secs".to_string(),
                value: "0".to_string(),
            });
        }
        if !(1..=MAX_FETCH_LIMIT).contains(&self.streaming.max_items_per_fetch) {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "max_items_per_fetch must be between 1 and {}, got {}",
                    MAX_FETCH_LIMIT, self.streaming.max_items_per_fetch
                ),
            });
        }
        Ok(())
    }

    /// Copy safe to log.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.bluesky.password.is_empty() {
            copy.bluesky.password = "***".to_string();
        }
        copy
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.streaming.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.streaming.stats_interval(), Duration::from_secs(60));
        assert_eq!(config.streaming.max_items_per_fetch, 50);
        assert_eq!(config.database.path, DEFAULT_DATABASE_PATH);
        assert_eq!(config.bluesky.service_url, DEFAULT_SERVICE_URL);
        assert!(config.streaming.filters.is_pass_through());
    }

    #[test]
    fn test_toml_parsing() {
        let config = AppConfig::from_toml_str(
            r#"
            [bluesky]
            handle = "alice.bsky.social"
            password = "app-password"

            [streaming]
            poll_interval_secs = 10

            [streaming.filters]
            keywords = ["rust", "ai"]
            "#,
        )
        .unwrap();

        assert_eq!(config.bluesky.handle, "alice.bsky.social");
        assert_eq!(config.streaming.poll_interval_secs, 10);
        assert_eq!(config.streaming.stats_interval_secs, 60);
        assert!(config.streaming.filters.keywords.contains("rust"));
        assert!(config.streaming.filters.authors.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = AppConfig::default();
        config
            .apply_env(&env(&[
                ("BLUESKY_HANDLE", "bob.bsky.social"),
                ("BLUESKY_PASSWORD", "secret"),
                ("POLL_INTERVAL", "15"),
                ("FILTER_AUTHORS", "a.bsky.social, b.bsky.social,"),
                ("FILTER_KEYWORDS", "rust"),
            ]))
            .unwrap();

        assert_eq!(config.bluesky.handle, "bob.bsky.social");
        assert_eq!(config.streaming.poll_interval_secs, 15);
        assert_eq!(config.streaming.filters.authors.len(), 2);
        assert!(config.streaming.filters.keywords.contains("rust"));
        assert!(config.validate().is_ok());
        assert_eq!(config.redacted().bluesky.password, "***");
    }

    #[test]
    fn test_invalid_number_in_env() {
        let mut config = AppConfig::default();
        let result = config.apply_env(&env(&[("POLL_INTERVAL", "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "POLL_INTERVAL"
        ));
    }

    #[test]
    fn test_validation_failures() {
        let config = AppConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEnvironmentVariable { .. })
        ));

        let mut config = AppConfig::default();
        config.bluesky.handle = "alice".to_string();
        config.bluesky.password = "pw".to_string();
        config.streaming.poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.streaming.poll_interval_secs = 30;
        config.streaming.max_items_per_fetch = 500;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file("/definitely/not/here/skyfeed.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
