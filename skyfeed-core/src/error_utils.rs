use crate::error::*;
use std::time::Duration;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Feed(e) => {
                error!("Feed error details: {:?}", e);
            }
            CoreError::Store(e) => {
                error!("Store error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Feed(e) => e.is_retryable(),
            CoreError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Feed(e) => e.retry_after(),
            CoreError::Store(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Feed(e) => e.user_friendly_message(),
            CoreError::Store(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::AlreadyRunning => {
                "The streaming service is already running.".to_string()
            }
            CoreError::InvalidStateTransition { state, operation } => {
                format!("Cannot {} while the service is {}.", operation, state)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Feed(_) => "FEED".to_string(),
            CoreError::Store(_) => "STORE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::AlreadyRunning => "ALREADY_RUNNING".to_string(),
            CoreError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION".to_string(),
        }
    }
}

impl ErrorExt for FeedError {
    fn log_error(&self) -> &Self {
        error!("FeedError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FeedError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            FeedError::RateLimitExceeded { .. } => true,
            FeedError::RequestTimeout => true,
            FeedError::ServerError { status_code } => *status_code >= 500,
            FeedError::Network { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FeedError::RateLimitExceeded { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ if self.is_retryable() => Some(Duration::from_secs(2)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FeedError::AuthenticationFailed { .. } => {
                "Bluesky authentication failed. Please check your handle and app password."
                    .to_string()
            }
            FeedError::InvalidToken => {
                "Bluesky session is invalid or expired. Please re-authenticate.".to_string()
            }
            FeedError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            FeedError::RequestTimeout => {
                "Request to Bluesky timed out. Please try again.".to_string()
            }
            FeedError::Network { .. } => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            _ => "Bluesky API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FeedError::AuthenticationFailed { .. } => "FEED_AUTH_FAILED".to_string(),
            FeedError::InvalidToken => "FEED_INVALID_TOKEN".to_string(),
            FeedError::RateLimitExceeded { .. } => "FEED_RATE_LIMIT".to_string(),
            FeedError::RequestTimeout => "FEED_TIMEOUT".to_string(),
            FeedError::ServerError { .. } => "FEED_SERVER_ERROR".to_string(),
            FeedError::InvalidResponse { .. } => "FEED_INVALID_RESPONSE".to_string(),
            FeedError::Network { .. } => "FEED_NETWORK".to_string(),
        }
    }
}

impl ErrorExt for StoreError {
    fn log_error(&self) -> &Self {
        error!("StoreError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::DatabaseLocked | StoreError::ConnectionFailed { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            StoreError::DatabaseLocked => Some(Duration::from_millis(100)),
            _ if self.is_retryable() => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StoreError::ConnectionFailed { .. } => {
                "Database connection failed. Please try again.".to_string()
            }
            StoreError::DatabaseLocked => {
                "Database is temporarily busy. Please try again.".to_string()
            }
            StoreError::MigrationFailed { migration } => {
                format!("Database migration '{}' failed.", migration)
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StoreError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED".to_string(),
            StoreError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            StoreError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            StoreError::ConstraintViolation { .. } => "DB_CONSTRAINT_VIOLATION".to_string(),
            StoreError::DatabaseLocked => "DB_LOCKED".to_string(),
            StoreError::Sql(_) => "DB_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
