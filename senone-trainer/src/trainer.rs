//! Multi-pass training driver

use senone_acoustic::{AcousticModel, HmmStateRef, LOG_ONE, LOG_ZERO};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TrainerError};
use crate::pool_manager::{HmmPoolManager, UpdateSummary};
use crate::score::{ScoreTarget, TrainerScore};

/// Scores of one utterance: one slice of graph-state scores per frame
pub type UtteranceScores = Vec<Vec<TrainerScore>>;

/// Produces forward/backward statistics under the current model
pub trait ScoreSource {
    fn utterances(&mut self, model: &AcousticModel) -> Result<Vec<UtteranceScores>>;
}

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Upper bound on re-estimation passes (default: 10)
    pub max_iterations: usize,
    /// Stop once the relative log likelihood gain falls below this (default: 1e-4)
    pub min_improvement: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            min_improvement: 1e-4,
        }
    }
}

impl TrainerConfig {
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn min_improvement(mut self, min_improvement: f64) -> Self {
        self.min_improvement = min_improvement;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(TrainerError::config("max_iterations must be positive"));
        }
        if !(self.min_improvement >= 0.0) {
            return Err(TrainerError::config("min_improvement must be non-negative"));
        }
        Ok(())
    }
}

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub iteration: usize,
    pub utterances: usize,
    pub frames: usize,
    /// Log likelihood of the data under the model the pass started with
    pub log_likelihood: f64,
    pub update: UpdateSummary,
}

pub struct Trainer {
    manager: HmmPoolManager,
    config: TrainerConfig,
    iterations: usize,
}

impl Trainer {
    pub fn new(model: AcousticModel, config: TrainerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            manager: HmmPoolManager::new(model),
            config,
            iterations: 0,
        })
    }

    pub fn model(&self) -> &AcousticModel {
        self.manager.model()
    }

    pub fn into_model(self) -> AcousticModel {
        self.manager.into_model()
    }

    /// One accumulate/normalize/update pass over every utterance
    pub fn run_pass(&mut self, source: &mut dyn ScoreSource) -> Result<PassReport> {
        let utterances = source.utterances(self.manager.model())?;
        self.manager.reset_buffers();

        let mut frames = 0;
        for utterance in &utterances {
            for (t, scores) in utterance.iter().enumerate() {
                let next = utterance.get(t + 1).map(|n| n.as_slice());
                for index in 0..scores.len() {
                    self.manager.accumulate(index, scores, next)?;
                }
            }
            frames += utterance.len();
        }

        let log_likelihood = self.manager.normalize()?;
        let update = self.manager.update()?;
        self.iterations += 1;

        info!(
            iteration = self.iterations,
            utterances = utterances.len(),
            frames,
            log_likelihood,
            unused_senones = update.unused_senones.len(),
            "Re-estimation pass complete"
        );

        Ok(PassReport {
            iteration: self.iterations,
            utterances: utterances.len(),
            frames,
            log_likelihood,
            update,
        })
    }

    /// Run passes until convergence or `max_iterations`
    pub fn train(&mut self, source: &mut dyn ScoreSource) -> Result<Vec<PassReport>> {
        let mut reports: Vec<PassReport> = Vec::new();

        while reports.len() < self.config.max_iterations {
            let report = self.run_pass(source)?;
            let converged = reports.last().is_some_and(|prev| {
                let gain = (report.log_likelihood - prev.log_likelihood) / prev.log_likelihood.abs().max(f64::MIN_POSITIVE);
                debug!(gain, "Relative log likelihood gain");
                gain < self.config.min_improvement
            });
            reports.push(report);
            if converged {
                break;
            }
        }

        Ok(reports)
    }
}

/// One utterance with a known state for every frame
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedUtterance {
    pub frames: Vec<Vec<f32>>,
    /// Emitting state occupied at each frame
    pub path: Vec<HmmStateRef>,
}

/// Hard-alignment (Viterbi) statistics
///
/// Each utterance is laid out as the concatenation of the HMM instances its
/// path visits. The aligned state of each frame is certain; every other
/// state carries zero probability, so transition counts reduce to the
/// transitions actually taken.
#[derive(Debug, Clone, Default)]
pub struct AlignedFrames {
    utterances: Vec<AlignedUtterance>,
}

impl AlignedFrames {
    pub fn new(utterances: Vec<AlignedUtterance>) -> Self {
        Self { utterances }
    }

    fn layout(model: &AcousticModel, utterance: &AlignedUtterance) -> Result<(Vec<usize>, Vec<usize>, usize)> {
        if utterance.frames.len() != utterance.path.len() {
            return Err(TrainerError::invalid_score(format!(
                "{} frames but {} aligned states",
                utterance.frames.len(),
                utterance.path.len()
            )));
        }

        // offsets[k]: first graph index of instance k; instance[t]: instance of frame t
        let mut offsets = Vec::new();
        let mut instance = Vec::with_capacity(utterance.path.len());
        let mut total = 0;
        for (t, state) in utterance.path.iter().enumerate() {
            if state.hmm >= model.hmm_manager().len() || !model.hmm(state.hmm).is_emitting(state.state) {
                return Err(TrainerError::invalid_score(format!(
                    "frame {} aligned to {:?}, which is not an emitting state",
                    t, state
                )));
            }
            let new_instance = t == 0 || {
                let prev = utterance.path[t - 1];
                prev.hmm != state.hmm || state.state < prev.state
            };
            if new_instance {
                offsets.push(total);
                total += model.hmm(state.hmm).num_states();
            }
            instance.push(offsets.len() - 1);
        }
        Ok((offsets, instance, total))
    }
}

impl ScoreSource for AlignedFrames {
    fn utterances(&mut self, model: &AcousticModel) -> Result<Vec<UtteranceScores>> {
        let params = model.params();
        let log_math = model.log_math();
        let mut result = Vec::with_capacity(self.utterances.len());

        for utterance in &self.utterances {
            let (offsets, instance, total) = Self::layout(model, utterance)?;

            // Graph position -> HMM state, shared by every frame
            let mut states = Vec::with_capacity(total);
            for (k, &offset) in offsets.iter().enumerate() {
                let first = instance.iter().position(|&i| i == k).unwrap_or(0);
                let hmm = model.hmm(utterance.path[first].hmm);
                debug_assert_eq!(states.len(), offset);
                states.extend((0..hmm.num_states()).map(|s| hmm.state_ref(s)));
            }

            let mut frames: UtteranceScores = Vec::with_capacity(utterance.frames.len());
            for (t, feature) in utterance.frames.iter().enumerate() {
                let mut scores: Vec<TrainerScore> = states
                    .iter()
                    .map(|&state| {
                        let target = if model.hmm(state.hmm).is_emitting(state.state) {
                            ScoreTarget::State(state)
                        } else {
                            ScoreTarget::NonEmitting
                        };
                        TrainerScore::new(feature.clone(), target, LOG_ZERO)
                    })
                    .collect();

                let aligned = utterance.path[t];
                let index = offsets[instance[t]] + aligned.state;
                let senone = model.hmm(aligned.hmm).senones[aligned.state];
                let mixture = model.senone(senone);
                let output = mixture.score(feature, &params);
                let components = mixture.component_scores(feature, &params);
                let norm = log_math.log_sum(components.iter().copied());
                let posterior = components
                    .iter()
                    .map(|&c| if c <= LOG_ZERO { LOG_ZERO } else { c - norm })
                    .collect();

                let mut frame_likelihood = output as f64;
                if t > 0 {
                    let prev = utterance.path[t - 1];
                    if instance[t] == instance[t - 1] {
                        let a = model.transition(prev.hmm, prev.state, aligned.state);
                        if a > LOG_ZERO {
                            scores[index].beta = -(a + output);
                            frame_likelihood += a as f64;
                        }
                    } else {
                        let prev_hmm = model.hmm(prev.hmm);
                        let exit = offsets[instance[t - 1]] + prev_hmm.exit_state();
                        let a = model.transition(prev.hmm, prev.state, prev_hmm.exit_state());
                        if a > LOG_ZERO {
                            scores[exit].score = LOG_ONE;
                            scores[exit].beta = -a;
                            frame_likelihood += a as f64;
                        }
                    }
                }

                let aligned_score = &mut scores[index];
                aligned_score.score = output;
                aligned_score.alpha = LOG_ONE;
                aligned_score.gamma = LOG_ONE;
                aligned_score.component_gamma = posterior;

                // Accumulate reads scores[0] once per graph position
                scores[0].scaling_factor = -(frame_likelihood / total as f64) as f32;
                frames.push(scores);
            }
            result.push(frames);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TrainerConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert!(config.validate().is_ok());
        assert!(TrainerConfig::default().max_iterations(0).validate().is_err());
        assert!(TrainerConfig::default().min_improvement(-1.0).validate().is_err());
    }

    #[test]
    fn test_config_from_json() {
        let config: TrainerConfig = serde_json::from_str(r#"{ "max_iterations": 3 }"#).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.min_improvement, 1e-4);
    }
}
