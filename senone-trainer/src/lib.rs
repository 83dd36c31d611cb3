//! # Senone Trainer
//!
//! Baum-Welch re-estimation of tied-state acoustic models.
//!
//! [`HmmPoolManager`] mirrors every model pool with [`Buffer`]s, routes
//! per-frame [`TrainerScore`]s into them, normalises, and writes the new
//! parameters back in place. [`Trainer`] drives repeated passes over a
//! [`ScoreSource`] until the log likelihood stops improving.
//!
//! ```no_run
//! use senone_acoustic::{AcousticModel, ModelConfig};
//! use senone_trainer::{AlignedFrames, Trainer, TrainerConfig};
//!
//! let model = AcousticModel::load("model.json", &ModelConfig::default())?;
//! let mut source = AlignedFrames::new(Vec::new());
//! let mut trainer = Trainer::new(model, TrainerConfig::default())?;
//! for report in trainer.train(&mut source)? {
//!     println!("pass {}: {}", report.iteration, report.log_likelihood);
//! }
//! trainer.model().save("trained.json")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod buffer;
mod error;
mod pool_manager;
mod score;
mod trainer;

pub use buffer::Buffer;
pub use error::{Result, TrainerError};
pub use pool_manager::{HmmPoolManager, Phase, UpdateSummary};
pub use score::{ScoreTarget, TrainerScore};
pub use trainer::{AlignedFrames, AlignedUtterance, PassReport, ScoreSource, Trainer, TrainerConfig, UtteranceScores};
