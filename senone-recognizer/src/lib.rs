//! Senone recognizer library
//!
//! Assembles the frontend, endpointer, acoustic model and search into a
//! [`Recognizer`], and exposes the configuration and training helpers used
//! by the `senone` binary.

pub mod config;
pub mod pipeline;
pub mod training;

pub use config::{RecognizerConfig, SearchSection};
pub use pipeline::{Recognizer, SearchLinguist};
pub use training::{train, AlignmentFile, AlignmentRecord};
