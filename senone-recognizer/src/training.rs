//! Re-estimation from frame alignments stored as JSON

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use senone_acoustic::{AcousticModel, HmmStateRef};
use senone_trainer::{AlignedFrames, AlignedUtterance, PassReport, Trainer, TrainerConfig};

/// One utterance: feature vectors and the `[hmm, state]` each frame sits in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    pub frames: Vec<Vec<f32>>,
    pub path: Vec<(usize, usize)>,
}

/// Alignment file layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentFile {
    pub utterances: Vec<AlignmentRecord>,
}

impl AlignmentFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alignments {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse alignments {}", path.display()))
    }

    pub fn into_aligned_frames(self) -> AlignedFrames {
        let utterances = self
            .utterances
            .into_iter()
            .map(|record| AlignedUtterance {
                frames: record.frames,
                path: record
                    .path
                    .into_iter()
                    .map(|(hmm, state)| HmmStateRef::new(hmm, state))
                    .collect(),
            })
            .collect();
        AlignedFrames::new(utterances)
    }
}

/// Train `model` on `alignments` until convergence; returns the trained
/// model and one report per pass
pub fn train(
    model: AcousticModel,
    alignments: AlignmentFile,
    config: &TrainerConfig,
) -> Result<(AcousticModel, Vec<PassReport>)> {
    let utterances = alignments.utterances.len();
    let mut source = alignments.into_aligned_frames();
    let mut trainer = Trainer::new(model, config.clone()).context("Invalid [training] section")?;

    let reports = trainer.train(&mut source).context("Re-estimation failed")?;
    if let Some(last) = reports.last() {
        info!(
            utterances,
            passes = reports.len(),
            log_likelihood = last.log_likelihood,
            "Training finished"
        );
    }
    Ok((trainer.into_model(), reports))
}
