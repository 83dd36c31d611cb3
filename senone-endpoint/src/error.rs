//! Error types for endpointing

use senone_frontend::FrontendError;
use thiserror::Error;

/// Result type for endpointer operations
pub type Result<T> = std::result::Result<T, EndpointError>;

/// Endpointer error types
#[derive(Error, Debug)]
pub enum EndpointError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by an upstream frontend stage
    #[error("Frontend error: {0}")]
    Frontend(#[from] FrontendError),
}

impl EndpointError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
