//! Error types for graph construction and decoding

use senone_acoustic::AcousticError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph could not be built from the model or dictionary
    #[error("Graph construction error: {0}")]
    Graph(String),

    #[error("Dictionary error: {0}")]
    Dictionary(String),

    #[error("N-gram buffer error: {0}")]
    NGram(String),

    #[error("Acoustic error: {0}")]
    Acoustic(#[from] AcousticError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn graph<S: Into<String>>(msg: S) -> Self {
        Self::Graph(msg.into())
    }

    pub fn dictionary<S: Into<String>>(msg: S) -> Self {
        Self::Dictionary(msg.into())
    }

    pub fn ngram<S: Into<String>>(msg: S) -> Self {
        Self::NGram(msg.into())
    }
}
