use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Streaming service is already running")]
    AlreadyRunning,

    #[error("Cannot {operation} while service is {state}")]
    InvalidStateTransition { state: String, operation: String },
}

#[derive(Error, Debug, Clone)]
pub enum FeedError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Network error: {reason}")]
    Network { reason: String },
}

impl FeedError {
    /// Credential problems that make `start()` refuse to run.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            FeedError::AuthenticationFailed { .. } | FeedError::InvalidToken
        )
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FeedError::RequestTimeout
        } else if error.is_decode() {
            FeedError::InvalidResponse {
                details: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            FeedError::ServerError {
                status_code: status.as_u16(),
            }
        } else {
            FeedError::Network {
                reason: error.to_string(),
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Constraint violation: {constraint}")]
    ConstraintViolation { constraint: String },

    #[error("Database locked")]
    DatabaseLocked,

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
