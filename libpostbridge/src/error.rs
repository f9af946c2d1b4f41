//! Error types for Postbridge
//!
//! Expected provider failures (HTTP errors, rejected uploads, failed token
//! refreshes) are not errors at this level: they travel back to the caller as
//! an ERROR [`SocialProviderResponse`](crate::response::SocialProviderResponse).
//! The types here cover faults the adapter cannot turn into a response.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostbridgeError>;

#[derive(Error, Debug)]
pub enum PostbridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PostbridgeError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostbridgeError::InvalidInput(_) => 3,
            PostbridgeError::Provider(_) => 1,
            PostbridgeError::Config(_) => 1,
            PostbridgeError::Io(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failures raised below the response layer.
///
/// The transport reports these; the provider adapter folds them into ERROR
/// responses tagged [`ErrorKind::Transport`](crate::response::ErrorKind).
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}
