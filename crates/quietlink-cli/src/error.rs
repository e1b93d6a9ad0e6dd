//! Error handling for the quietlink CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] quietlink_core::QuietlinkError),

    #[error("Queue error: {0}")]
    Queue(#[from] quietlink_core::QueueError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl From<quietlink_core::TimerError> for CliError {
    fn from(err: quietlink_core::TimerError) -> Self {
        CliError::InvalidInput(err.to_string())
    }
}
