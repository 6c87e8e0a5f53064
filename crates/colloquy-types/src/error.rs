use thiserror::Error;

/// Errors related to conversation store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conversation '{0}' not found")]
    NotFound(String),
}

/// Errors related to configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("missing environment variable '{0}'")]
    MissingEnv(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
