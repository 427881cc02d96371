use thiserror::Error;

/// Main error type for env-sync operations
#[derive(Error, Debug)]
pub enum EnvSyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Invalid port '{0}': expected an integer between 1 and 65535")]
    InvalidPort(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EnvSyncError>;
