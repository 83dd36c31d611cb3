//! Baum-Welch re-estimation over the acoustic model pools
//!
//! Every pool entry gets a parallel [`Buffer`]. A pass runs
//! `reset_buffers → accumulate* → normalize → update`; the phases are
//! enforced and an out-of-order call is an [`TrainerError::InvalidPhase`].

use std::collections::HashSet;

use senone_acoustic::{AcousticModel, HmmStateRef, LogMath, LOG_ZERO};
use tracing::{debug, info, warn};

use crate::buffer::Buffer;
use crate::error::{Result, TrainerError};
use crate::score::{ScoreTarget, TrainerScore};

/// Re-estimation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Buffers are fresh; nothing accumulated yet
    Created,
    Accumulating,
    Normalized,
}

/// What one `update()` changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    pub means_updated: usize,
    pub variances_updated: usize,
    pub mixture_weights_updated: usize,
    pub transition_rows_updated: usize,
    pub components_refreshed: usize,
    /// Senones that received no evidence and kept their parameters
    pub unused_senones: Vec<usize>,
}

/// Buffer pools mirroring the model pools
struct Buffers {
    means: Vec<Buffer>,
    variances: Vec<Buffer>,
    mixture_weights: Vec<Buffer>,
    transitions: Vec<Vec<Buffer>>,
}

impl Buffers {
    fn create(model: &AcousticModel) -> Self {
        let linear = |pool: &senone_acoustic::Pool<Vec<f32>>| {
            pool.iter()
                .enumerate()
                .map(|(i, entry)| Buffer::new(entry.len(), false, i))
                .collect()
        };

        Self {
            means: linear(model.means()),
            variances: linear(model.variances()),
            mixture_weights: model
                .mixture_weights()
                .iter()
                .enumerate()
                .map(|(i, entry)| Buffer::new(entry.len(), true, i))
                .collect(),
            transitions: model
                .transitions()
                .iter()
                .map(|matrix| {
                    (0..matrix.nrows())
                        .map(|row| Buffer::new(matrix.ncols(), true, row))
                        .collect()
                })
                .collect(),
        }
    }
}

pub struct HmmPoolManager {
    model: AcousticModel,
    buffers: Buffers,
    phase: Phase,
    log_likelihood: f64,
    log_mixture_weight_floor: f32,
    log_transition_floor: f32,
    variance_floor: f32,
}

impl HmmPoolManager {
    pub fn new(model: AcousticModel) -> Self {
        let config = model.config().clone();
        let log_math = *model.log_math();
        let buffers = Buffers::create(&model);

        Self {
            buffers,
            phase: Phase::Created,
            log_likelihood: 0.0,
            log_mixture_weight_floor: log_math.linear_to_log(config.mixture_weight_floor as f64),
            log_transition_floor: log_math.linear_to_log(config.transition_probability_floor as f64),
            variance_floor: config.variance_floor,
            model,
        }
    }

    pub fn model(&self) -> &AcousticModel {
        &self.model
    }

    pub fn into_model(self) -> AcousticModel {
        self.model
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Log likelihood accumulated so far in this pass
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Start a pass with empty buffers
    ///
    /// Discards anything accumulated or normalized but not yet applied.
    pub fn reset_buffers(&mut self) {
        if self.phase == Phase::Normalized {
            warn!("Discarding normalized statistics that were never applied");
        }
        self.buffers = Buffers::create(&self.model);
        self.log_likelihood = 0.0;
        self.phase = Phase::Accumulating;
    }

    /// Mixture-weight buffer of a senone (inspection)
    pub fn mixture_weight_buffer(&self, senone: usize) -> &Buffer {
        &self.buffers.mixture_weights[senone]
    }

    /// Transition buffer for one matrix row (inspection)
    pub fn transition_buffer(&self, matrix: usize, row: usize) -> &Buffer {
        &self.buffers.transitions[matrix][row]
    }

    pub fn mean_buffer(&self, gaussian: usize) -> &Buffer {
        &self.buffers.means[gaussian]
    }

    /// Route the statistics of `scores[index]` into the buffers
    ///
    /// `next_scores` are the scores of the following frame, needed for
    /// transition counts; pass `None` on the last frame.
    pub fn accumulate(
        &mut self,
        index: usize,
        scores: &[TrainerScore],
        next_scores: Option<&[TrainerScore]>,
    ) -> Result<()> {
        self.expect_phase("accumulate", Phase::Accumulating)?;

        let score = scores.get(index).ok_or_else(|| {
            TrainerError::invalid_score(format!("index {} outside frame of {} scores", index, scores.len()))
        })?;
        self.log_likelihood -= scores[0].scaling_factor as f64;

        match score.target {
            ScoreTarget::NonEmitting => {}
            ScoreTarget::AllModels => {
                self.check_feature(score)?;
                for senone in 0..self.model.num_senones() {
                    self.accumulate_gaussians(senone, score);
                    self.accumulate_mixture(senone, score);
                }
                self.accumulate_all_transitions(score.score);
            }
            ScoreTarget::State(state) => {
                if state.hmm >= self.model.hmm_manager().len() {
                    return Err(TrainerError::invalid_score(format!(
                        "score refers to missing HMM {}",
                        state.hmm
                    )));
                }
                let hmm = self.model.hmm(state.hmm);
                if let Some(senone) = hmm.senone(state.state) {
                    self.check_feature(score)?;
                    self.accumulate_gaussians(senone, score);
                    self.accumulate_mixture(senone, score);
                    if let Some(next) = next_scores {
                        self.accumulate_transition(state, index, scores, next);
                    }
                }
            }
        }

        Ok(())
    }

    fn check_feature(&self, score: &TrainerScore) -> Result<()> {
        if score.feature.len() != self.model.vector_length() {
            return Err(TrainerError::invalid_score(format!(
                "feature of dimension {} for a model of vector length {}",
                score.feature.len(),
                self.model.vector_length()
            )));
        }
        Ok(())
    }

    fn accumulate_gaussians(&mut self, senone: usize, score: &TrainerScore) {
        let log_math = *self.model.log_math();
        let squared: Vec<f32> = score.feature.iter().map(|x| x * x).collect();

        for (i, component) in self.model.senone(senone).components().iter().enumerate() {
            let gamma = match score.component_gamma.get(i) {
                Some(&g) => g,
                None => continue,
            };
            let weight = log_math.log_to_linear(gamma);
            self.buffers.means[component.mean_id].accumulate(&score.feature, weight);
            self.buffers.variances[component.variance_id].accumulate(&squared, weight);
        }
    }

    fn accumulate_mixture(&mut self, senone: usize, score: &TrainerScore) {
        let log_math = *self.model.log_math();
        let weights_id = self.model.senone(senone).weights_id();
        let buffer = &mut self.buffers.mixture_weights[weights_id];

        for (lane, &gamma) in score.component_gamma.iter().enumerate().take(buffer.len()) {
            buffer.log_accumulate(gamma, lane, &log_math);
        }
    }

    /// `α_t(i) + β_{t+1}(j) + a_ij + b_j(o_{t+1})` into row `i`, lane `j`
    fn accumulate_transition(
        &mut self,
        state: HmmStateRef,
        index: usize,
        scores: &[TrainerScore],
        next: &[TrainerScore],
    ) {
        let log_math = *self.model.log_math();
        let hmm = self.model.hmm(state.hmm);
        let matrix = self.model.transitions().get(hmm.matrix);
        let alpha = scores[index].alpha;
        if alpha <= LOG_ZERO {
            return;
        }

        let row = &mut self.buffers.transitions[hmm.matrix][state.state];
        for (j, &a_ij) in matrix.row(state.state).iter().enumerate() {
            if a_ij == LOG_ZERO {
                continue;
            }
            let next_index = match (index + j).checked_sub(state.state) {
                Some(n) => n,
                None => continue,
            };
            let next_score = match next.get(next_index) {
                Some(s) => s,
                None => continue,
            };
            debug_assert!(
                next_score.state().map_or(true, |s| s.hmm == state.hmm),
                "next-frame score at {} belongs to another HMM",
                next_index
            );
            if next_score.beta <= LOG_ZERO || next_score.score <= LOG_ZERO {
                continue;
            }

            let prob = alpha + next_score.beta + a_ij + next_score.score;
            row.log_accumulate(prob, j, &log_math);
        }
    }

    /// Broadcast `value` into every permitted transition of every HMM
    fn accumulate_all_transitions(&mut self, value: f32) {
        let log_math = *self.model.log_math();
        for hmm in self.model.hmm_manager().iter() {
            let matrix = self.model.transitions().get(hmm.matrix);
            for state in 0..hmm.num_emitting() {
                let row = &mut self.buffers.transitions[hmm.matrix][state];
                for (j, &a_ij) in matrix.row(state).iter().enumerate() {
                    if a_ij != LOG_ZERO {
                        row.log_accumulate(value, j, &log_math);
                    }
                }
            }
        }
    }

    /// Normalise every used buffer; returns the pass log likelihood
    pub fn normalize(&mut self) -> Result<f64> {
        self.expect_phase("normalize", Phase::Accumulating)?;
        let log_math = *self.model.log_math();

        for buffer in self.buffers.means.iter_mut().chain(self.buffers.variances.iter_mut()) {
            if buffer.was_used() {
                buffer.normalize();
            }
        }
        for buffer in self.buffers.mixture_weights.iter_mut().filter(|b| b.was_used()) {
            buffer.log_normalize();
        }
        for (id, rows) in self.buffers.transitions.iter_mut().enumerate() {
            let mask = self.model.transitions().get(id);
            for (i, buffer) in rows.iter_mut().enumerate().filter(|(_, b)| b.was_used()) {
                let row: Vec<f32> = mask.row(i).to_vec();
                buffer.log_normalize_non_zero(&row, &log_math);
            }
        }

        self.phase = Phase::Normalized;
        debug!(log_likelihood = self.log_likelihood, "Buffers normalized");
        Ok(self.log_likelihood)
    }

    /// Copy normalised statistics into the model pools
    ///
    /// Unused buffers leave their entries unchanged. Fresh buffers are
    /// created for the next pass.
    pub fn update(&mut self) -> Result<UpdateSummary> {
        self.expect_phase("update", Phase::Normalized)?;
        let mut summary = UpdateSummary::default();
        let mut changed = HashSet::new();

        for (i, buffer) in self.buffers.means.iter().enumerate() {
            if buffer.was_used() {
                self.model.means_mut().put(i, buffer.values());
                changed.insert(i);
                summary.means_updated += 1;
            }
        }

        for (i, buffer) in self.buffers.variances.iter().enumerate() {
            if !buffer.was_used() {
                continue;
            }
            let mean = self.model.means().get(i);
            let variance: Vec<f32> = buffer
                .values()
                .iter()
                .zip(mean)
                .map(|(&ex2, &m)| (ex2 - m * m).max(self.variance_floor))
                .collect();
            self.model.variances_mut().put(i, variance);
            changed.insert(i);
            summary.variances_updated += 1;
        }

        summary.components_refreshed = self.model.precompute_distances(&changed);
        let log_math: LogMath = *self.model.log_math();

        for (i, buffer) in self.buffers.mixture_weights.iter_mut().enumerate() {
            if !buffer.was_used() {
                debug!(senone = i, "Senone not used");
                summary.unused_senones.push(i);
                continue;
            }
            if buffer.log_floor(self.log_mixture_weight_floor) {
                buffer.log_normalize_to_sum(&log_math);
            }
            self.model.mixture_weights_mut().put(i, buffer.values());
            summary.mixture_weights_updated += 1;
        }

        for (id, rows) in self.buffers.transitions.iter_mut().enumerate() {
            for (i, buffer) in rows.iter_mut().enumerate() {
                if !buffer.was_used() {
                    continue;
                }
                buffer.log_floor_non_zero(self.log_transition_floor);
                buffer.log_normalize_to_sum(&log_math);

                let matrix = self.model.transitions_mut().get_mut(id);
                for (j, value) in matrix.row_mut(i).iter_mut().enumerate() {
                    *value = buffer.value(j);
                }
                summary.transition_rows_updated += 1;
            }
        }

        if !summary.unused_senones.is_empty() {
            warn!(
                count = summary.unused_senones.len(),
                total = self.model.num_senones(),
                "Senones received no evidence this pass; parameters kept"
            );
        }
        info!(
            means = summary.means_updated,
            variances = summary.variances_updated,
            mixture_weights = summary.mixture_weights_updated,
            transition_rows = summary.transition_rows_updated,
            "Model pools updated"
        );

        self.buffers = Buffers::create(&self.model);
        self.log_likelihood = 0.0;
        self.phase = Phase::Created;
        Ok(summary)
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(TrainerError::InvalidPhase {
                operation,
                expected,
                found: self.phase,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use senone_acoustic::{
        HmmDefinition, HmmPosition, ModelConfig, ModelDefinition, SenoneDefinition, Unit,
    };

    fn model() -> AcousticModel {
        let def = ModelDefinition {
            vector_length: 2,
            means: vec![vec![0.0, 0.0], vec![3.0, 3.0]],
            variances: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            senones: vec![
                SenoneDefinition { gaussians: vec![0], mixture_weights: vec![1.0] },
                SenoneDefinition { gaussians: vec![1], mixture_weights: vec![1.0] },
            ],
            transition_matrices: vec![vec![
                vec![0.5, 0.5, 0.0],
                vec![0.0, 0.5, 0.5],
                vec![0.0, 0.0, 0.0],
            ]],
            hmms: vec![HmmDefinition {
                unit: Unit::ci("A"),
                position: HmmPosition::Undefined,
                senones: vec![0, 1],
                transition_matrix: 0,
            }],
        };
        AcousticModel::from_definition(&def, &ModelConfig::default()).unwrap()
    }

    fn at(state: usize, feature: Vec<f32>) -> TrainerScore {
        TrainerScore::certain(feature, ScoreTarget::State(HmmStateRef::new(0, state)))
    }

    #[test]
    fn test_phases_enforced() {
        let mut manager = HmmPoolManager::new(model());
        assert_eq!(manager.phase(), Phase::Created);

        let scores = vec![at(0, vec![0.0, 0.0])];
        assert!(matches!(
            manager.accumulate(0, &scores, None),
            Err(TrainerError::InvalidPhase { operation: "accumulate", .. })
        ));
        assert!(manager.normalize().is_err());
        assert!(manager.update().is_err());

        manager.reset_buffers();
        manager.accumulate(0, &scores, None).unwrap();
        assert!(manager.update().is_err());
        manager.normalize().unwrap();
        assert!(manager.accumulate(0, &scores, None).is_err());
        manager.update().unwrap();
        assert_eq!(manager.phase(), Phase::Created);
    }

    #[test]
    fn test_mean_moves_to_data() {
        let mut manager = HmmPoolManager::new(model());
        manager.reset_buffers();
        for x in [1.0, 2.0, 3.0] {
            manager.accumulate(0, &[at(0, vec![x, -x])], None).unwrap();
        }
        manager.normalize().unwrap();
        let summary = manager.update().unwrap();

        let model = manager.model();
        assert_relative_eq!(model.means().get(0)[0], 2.0, epsilon = 1e-5);
        assert_relative_eq!(model.means().get(0)[1], -2.0, epsilon = 1e-5);
        // E[x^2] - mean^2 = 14/3 - 4
        assert_relative_eq!(model.variances().get(0)[0], 2.0 / 3.0, epsilon = 1e-5);

        // Senone 1 saw nothing
        assert_eq!(summary.unused_senones, vec![1]);
        assert_eq!(model.means().get(1), &vec![3.0, 3.0]);
        assert_eq!(model.variances().get(1), &vec![1.0, 1.0]);
        assert_eq!(summary.components_refreshed, 1);
    }

    #[test]
    fn test_all_models_broadcast() {
        let mut manager = HmmPoolManager::new(model());
        manager.reset_buffers();
        let score = TrainerScore::certain(vec![1.0, 1.0], ScoreTarget::AllModels);
        manager.accumulate(0, &[score], None).unwrap();

        assert!(manager.mean_buffer(0).was_used());
        assert!(manager.mean_buffer(1).was_used());
        assert!(manager.mixture_weight_buffer(1).was_used());
        assert!(manager.transition_buffer(0, 0).was_used());
        assert!(manager.transition_buffer(0, 1).was_used());
        assert!(!manager.transition_buffer(0, 2).was_used());
        assert_eq!(manager.transition_buffer(0, 0).value(2), LOG_ZERO);
    }

    #[test]
    fn test_non_emitting_ignored() {
        let mut manager = HmmPoolManager::new(model());
        manager.reset_buffers();
        let score = TrainerScore::certain(vec![1.0, 1.0], ScoreTarget::NonEmitting).with_scaling_factor(-5.0);
        manager.accumulate(0, &[score], None).unwrap();
        assert!(!manager.mean_buffer(0).was_used());
        assert_eq!(manager.log_likelihood(), 5.0);
    }

    #[test]
    fn test_transition_counts() {
        let log_math = *model().log_math();
        let mut manager = HmmPoolManager::new(model());
        manager.reset_buffers();

        // Frame layout: [state 0, state 1, exit]
        let frame = |active: usize| -> Vec<TrainerScore> {
            (0..3)
                .map(|s| {
                    let target = if s < 2 {
                        ScoreTarget::State(HmmStateRef::new(0, s))
                    } else {
                        ScoreTarget::NonEmitting
                    };
                    let mut score = TrainerScore::certain(vec![0.0, 0.0], target);
                    if s != active {
                        score.alpha = LOG_ZERO;
                        score.beta = LOG_ZERO;
                    }
                    score
                })
                .collect()
        };

        // 0 -> 1 once
        let t0 = frame(0);
        let t1 = frame(1);
        manager.accumulate(0, &t0, Some(&t1)).unwrap();

        let row = manager.transition_buffer(0, 0);
        assert!(row.was_used());
        assert_eq!(row.value(0), LOG_ZERO);
        assert_relative_eq!(log_math.log_to_linear(row.value(1)), 0.5, epsilon = 1e-4);
        assert_eq!(row.value(2), LOG_ZERO);
    }

    #[test]
    fn test_bad_index_and_dimension() {
        let mut manager = HmmPoolManager::new(model());
        manager.reset_buffers();
        assert!(manager.accumulate(3, &[at(0, vec![0.0, 0.0])], None).is_err());
        assert!(manager.accumulate(0, &[at(0, vec![0.0])], None).is_err());

        let stray = TrainerScore::certain(vec![0.0, 0.0], ScoreTarget::State(HmmStateRef::new(9, 0)));
        assert!(manager.accumulate(0, &[stray], None).is_err());
    }
}
