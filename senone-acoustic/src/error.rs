//! Error types for acoustic model operations

use senone_frontend::FrontendError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcousticError>;

#[derive(Error, Debug)]
pub enum AcousticError {
    #[error("Model loading error: {0}")]
    ModelLoadError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Frontend error: {0}")]
    Frontend(#[from] FrontendError),

    #[error("Model format error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AcousticError {
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoadError(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }
}
