//! Senone Acoustic Model
//!
//! Tied-state acoustic models: parameter pools, diagonal Gaussian mixtures
//! (senones), senone-tied HMMs and the frame scorer used by search.
//!
//! ## Parameter ownership
//!
//! ```text
//! Pool<Vec<f32>> means ──┐
//! Pool<Vec<f32>> vars ───┼─> MixtureComponent (indices + precomputed terms)
//! Pool<Vec<f32>> weights ┴─> GaussianMixture (senone) <── HMM states (by id)
//! Pool<Array2<f32>> transitions <── SenoneHmm.matrix
//! ```
//!
//! Pools are the only owners. Re-estimation updates them in place and every
//! state tied to an entry sees the change.
//!
//! ## Quick Start
//!
//! ```no_run
//! use senone_acoustic::{AcousticModel, ModelConfig};
//!
//! let model = AcousticModel::load("model.json", &ModelConfig::default())?;
//! let score = model.score_senone(0, &vec![0.0; model.vector_length()]);
//! println!("log likelihood: {}", score);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod gaussian;
pub mod hmm;
pub mod logmath;
pub mod model;
pub mod pool;
pub mod scorer;

pub use error::{AcousticError, Result};
pub use gaussian::{GaussianMixture, MixtureComponent, MixtureParams};
pub use hmm::{HmmManager, HmmPosition, HmmStateRef, SenoneHmm, Unit};
pub use logmath::{LogMath, LOG_ONE, LOG_ZERO};
pub use model::{AcousticModel, HmmDefinition, ModelConfig, ModelDefinition, SenoneDefinition};
pub use pool::{Feature, Pool};
pub use scorer::{AcousticScorer, FrameScore, Scoreable, SenoneScoreCache};
