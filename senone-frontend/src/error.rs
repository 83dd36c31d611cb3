//! Error types for the frontend pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FrontendError>;

#[derive(Error, Debug)]
pub enum FrontendError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data processing error: {0}")]
    Processing(String),

    #[error("Frame too long: got {got} samples but the expected frame is <= {max}")]
    FrameTooLong { got: usize, max: usize },

    #[error("Unexpected end of stream: {0}")]
    UnexpectedEndOfStream(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrontendError {
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Self::Capture(msg.into())
    }

    pub fn unexpected_end<S: Into<String>>(msg: S) -> Self {
        Self::UnexpectedEndOfStream(msg.into())
    }
}
