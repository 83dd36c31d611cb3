//! Error types for re-estimation

use senone_acoustic::AcousticError;
use thiserror::Error;

use crate::pool_manager::Phase;

pub type Result<T> = std::result::Result<T, TrainerError>;

#[derive(Error, Debug)]
pub enum TrainerError {
    /// Operation called out of order
    #[error("Invalid phase: {operation} requires {expected:?}, manager is {found:?}")]
    InvalidPhase {
        operation: &'static str,
        expected: Phase,
        found: Phase,
    },

    /// Score vector inconsistent with the model
    #[error("Invalid score: {0}")]
    InvalidScore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Acoustic model error: {0}")]
    Acoustic(#[from] AcousticError),
}

impl TrainerError {
    pub fn invalid_score<S: Into<String>>(msg: S) -> Self {
        Self::InvalidScore(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
