use thiserror::Error;

pub type MixResult<T> = Result<T, MixError>;

#[derive(Error, Debug)]
pub enum MixError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for MixError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
