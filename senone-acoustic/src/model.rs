//! Acoustic model loading, validation and saving

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AcousticError, Result};
use crate::gaussian::{GaussianMixture, MixtureComponent, MixtureParams};
use crate::hmm::{HmmManager, HmmPosition, HmmStateRef, SenoneHmm, Unit};
use crate::logmath::{LogMath, DEFAULT_LOG_BASE, LOG_ZERO};
use crate::pool::{Feature, Pool};

/// Tolerance on the linear sum of a probability row
const ROW_SUM_TOLERANCE: f32 = 1e-3;

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Log base for stored probabilities (default: 1.0001)
    pub log_base: f64,
    /// Lower bound for every variance lane (default: 1e-4)
    pub variance_floor: f32,
    /// Lower bound for mixture weights, linear (default: 1e-7)
    pub mixture_weight_floor: f32,
    /// Lower bound for permitted transitions, linear (default: 1e-4)
    pub transition_probability_floor: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            log_base: DEFAULT_LOG_BASE,
            variance_floor: 1e-4,
            mixture_weight_floor: 1e-7,
            transition_probability_floor: 1e-4,
        }
    }
}

impl ModelConfig {
    pub fn log_base(mut self, log_base: f64) -> Self {
        self.log_base = log_base;
        self
    }

    pub fn variance_floor(mut self, floor: f32) -> Self {
        self.variance_floor = floor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        LogMath::new(self.log_base)?;

        if !(self.variance_floor > 0.0) {
            return Err(AcousticError::config("variance_floor must be positive"));
        }
        if !(self.mixture_weight_floor > 0.0 && self.mixture_weight_floor < 1.0) {
            return Err(AcousticError::config("mixture_weight_floor must be in (0, 1)"));
        }
        if !(self.transition_probability_floor > 0.0 && self.transition_probability_floor < 1.0) {
            return Err(AcousticError::config(
                "transition_probability_floor must be in (0, 1)",
            ));
        }
        Ok(())
    }

    pub fn log_math(&self) -> Result<LogMath> {
        LogMath::new(self.log_base)
    }
}

/// Senone in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenoneDefinition {
    /// Gaussian indices into `means` / `variances`
    pub gaussians: Vec<usize>,
    /// Linear mixture weights, one per Gaussian
    pub mixture_weights: Vec<f32>,
}

/// HMM in a model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmDefinition {
    #[serde(flatten)]
    pub unit: Unit,
    #[serde(default)]
    pub position: HmmPosition,
    /// Senone per emitting state
    pub senones: Vec<usize>,
    pub transition_matrix: usize,
}

/// On-disk (JSON) model layout; all probabilities linear
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub vector_length: usize,
    pub means: Vec<Vec<f32>>,
    pub variances: Vec<Vec<f32>>,
    pub senones: Vec<SenoneDefinition>,
    /// Square matrices; `0` marks a forbidden transition
    pub transition_matrices: Vec<Vec<Vec<f32>>>,
    pub hmms: Vec<HmmDefinition>,
}

impl ModelDefinition {
    /// Check dimensions and indices
    pub fn validate(&self) -> Result<()> {
        let n = self.vector_length;
        if n == 0 {
            return Err(AcousticError::model_load("vector_length must be positive"));
        }
        if self.means.len() != self.variances.len() {
            return Err(AcousticError::model_load(format!(
                "{} means but {} variances",
                self.means.len(),
                self.variances.len()
            )));
        }
        for (i, (mean, var)) in self.means.iter().zip(&self.variances).enumerate() {
            if mean.len() != n || var.len() != n {
                return Err(AcousticError::model_load(format!(
                    "Gaussian {} has dimension {}/{}, expected {}",
                    i,
                    mean.len(),
                    var.len(),
                    n
                )));
            }
            if var.iter().any(|v| !v.is_finite() || *v < 0.0) {
                return Err(AcousticError::model_load(format!(
                    "Gaussian {} has a negative or non-finite variance",
                    i
                )));
            }
        }

        for (id, senone) in self.senones.iter().enumerate() {
            if senone.gaussians.is_empty() || senone.gaussians.len() != senone.mixture_weights.len() {
                return Err(AcousticError::model_load(format!(
                    "Senone {} needs one mixture weight per Gaussian",
                    id
                )));
            }
            if let Some(g) = senone.gaussians.iter().find(|&&g| g >= self.means.len()) {
                return Err(AcousticError::model_load(format!(
                    "Senone {} references missing Gaussian {}",
                    id, g
                )));
            }
            check_row(&senone.mixture_weights, &format!("senone {} mixture weights", id))?;
        }

        for (id, matrix) in self.transition_matrices.iter().enumerate() {
            let size = matrix.len();
            if size < 2 || matrix.iter().any(|row| row.len() != size) {
                return Err(AcousticError::model_load(format!(
                    "Transition matrix {} is not square",
                    id
                )));
            }
            for (i, row) in matrix[..size - 1].iter().enumerate() {
                check_row(row, &format!("transition matrix {} row {}", id, i))?;
            }
        }

        for (id, hmm) in self.hmms.iter().enumerate() {
            if hmm.senones.is_empty() {
                return Err(AcousticError::model_load(format!("HMM {} ({}) has no states", id, hmm.unit)));
            }
            if let Some(s) = hmm.senones.iter().find(|&&s| s >= self.senones.len()) {
                return Err(AcousticError::model_load(format!(
                    "HMM {} references missing senone {}",
                    id, s
                )));
            }
            let matrix = self.transition_matrices.get(hmm.transition_matrix).ok_or_else(|| {
                AcousticError::model_load(format!(
                    "HMM {} references missing transition matrix {}",
                    id, hmm.transition_matrix
                ))
            })?;
            if matrix.len() != hmm.senones.len() + 1 {
                return Err(AcousticError::model_load(format!(
                    "HMM {} has {} emitting states but its matrix is {}x{}",
                    id,
                    hmm.senones.len(),
                    matrix.len(),
                    matrix.len()
                )));
            }
        }

        Ok(())
    }
}

fn check_row(row: &[f32], what: &str) -> Result<()> {
    if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(AcousticError::model_load(format!("{} contains negative entries", what)));
    }
    let sum: f32 = row.iter().sum();
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(AcousticError::model_load(format!("{} sum to {}, not 1", what, sum)));
    }
    Ok(())
}

/// Tied-state acoustic model
///
/// The pools own every parameter; senones and HMMs hold indices. Mixture
/// weights and transitions are stored as logs in the configured base.
pub struct AcousticModel {
    config: ModelConfig,
    log_math: LogMath,
    vector_length: usize,
    means: Pool<Vec<f32>>,
    variances: Pool<Vec<f32>>,
    mixture_weights: Pool<Vec<f32>>,
    transitions: Pool<Array2<f32>>,
    senones: Vec<GaussianMixture>,
    hmms: HmmManager,
}

impl AcousticModel {
    /// Load a JSON model file
    pub fn load<P: AsRef<Path>>(path: P, config: &ModelConfig) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            AcousticError::model_load(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let definition: ModelDefinition = serde_json::from_str(&text)?;

        let model = Self::from_definition(&definition, config)?;
        info!(
            path = %path.display(),
            senones = model.num_senones(),
            hmms = model.hmms.len(),
            gaussians = model.means.size(),
            "Loaded acoustic model"
        );
        Ok(model)
    }

    pub fn from_definition(definition: &ModelDefinition, config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        definition.validate()?;
        let log_math = config.log_math()?;

        let mut means = Pool::new("means");
        let mut variances = Pool::new("variances");
        let mut floored = 0;
        for (i, (mean, variance)) in definition.means.iter().zip(&definition.variances).enumerate() {
            means.put(i, mean.clone());
            let mut variance = variance.clone();
            for v in variance.iter_mut() {
                if *v < config.variance_floor {
                    *v = config.variance_floor;
                    floored += 1;
                }
            }
            variances.put(i, variance);
        }
        if floored > 0 {
            debug!(floored, "Variance lanes raised to floor at load");
        }

        let weight_floor = log_math.linear_to_log(config.mixture_weight_floor as f64);
        let mut mixture_weights = Pool::new("mixture_weights");
        let mut senones = Vec::with_capacity(definition.senones.len());
        for (id, senone) in definition.senones.iter().enumerate() {
            let mut weights: Vec<f32> = senone
                .mixture_weights
                .iter()
                .map(|&w| log_math.linear_to_log(w as f64))
                .collect();
            if weights.iter().any(|&w| w < weight_floor) {
                // Floored rows no longer sum to one
                weights.iter_mut().for_each(|w| *w = w.max(weight_floor));
                let total = log_math.log_sum(weights.iter().copied());
                weights.iter_mut().for_each(|w| *w -= total);
                debug!(senone = id, "Mixture weights floored and renormalised");
            }
            mixture_weights.put(id, weights);

            let components = senone
                .gaussians
                .iter()
                .map(|&g| MixtureComponent::new(g, g, variances.get(g)))
                .collect();
            senones.push(GaussianMixture::new(id, id, components));
        }

        let mut transitions = Pool::new("transition_matrices");
        for (id, matrix) in definition.transition_matrices.iter().enumerate() {
            let size = matrix.len();
            let log_matrix = Array2::from_shape_fn((size, size), |(i, j)| {
                log_math.linear_to_log(matrix[i][j] as f64)
            });
            transitions.put(id, log_matrix);
        }

        let hmms = definition
            .hmms
            .iter()
            .enumerate()
            .map(|(id, h)| SenoneHmm {
                id,
                unit: h.unit.clone(),
                position: h.position,
                senones: h.senones.clone(),
                matrix: h.transition_matrix,
            })
            .collect();

        let max_gaussians = definition.senones.iter().map(|s| s.gaussians.len()).max().unwrap_or(0);
        for pool in [&mut means, &mut variances] {
            pool.set_feature(Feature::VectorLength, definition.vector_length as i64);
            pool.set_feature(Feature::NumStreams, 1);
        }
        mixture_weights.set_feature(Feature::NumSenones, senones.len() as i64);
        mixture_weights.set_feature(Feature::NumGaussiansPerState, max_gaussians as i64);
        mixture_weights.set_feature(Feature::NumStreams, 1);

        Ok(Self {
            config: config.clone(),
            log_math,
            vector_length: definition.vector_length,
            means,
            variances,
            mixture_weights,
            transitions,
            senones,
            hmms: HmmManager::new(hmms),
        })
    }

    /// Linear-domain definition of the current parameters
    pub fn to_definition(&self) -> ModelDefinition {
        let log_math = &self.log_math;
        let linear = |v: f32| log_math.log_to_linear(v) as f32;

        ModelDefinition {
            vector_length: self.vector_length,
            means: self.means.iter().cloned().collect(),
            variances: self.variances.iter().cloned().collect(),
            senones: self
                .senones
                .iter()
                .map(|s| SenoneDefinition {
                    gaussians: s.components().iter().map(|c| c.mean_id).collect(),
                    mixture_weights: self
                        .mixture_weights
                        .get(s.weights_id())
                        .iter()
                        .map(|&w| linear(w))
                        .collect(),
                })
                .collect(),
            transition_matrices: self
                .transitions
                .iter()
                .map(|m| m.rows().into_iter().map(|row| row.iter().map(|&p| linear(p)).collect()).collect())
                .collect(),
            hmms: self
                .hmms
                .iter()
                .map(|h| HmmDefinition {
                    unit: h.unit.clone(),
                    position: h.position,
                    senones: h.senones.clone(),
                    transition_matrix: h.matrix,
                })
                .collect(),
        }
    }

    /// Write the model as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_definition())?;
        fs::write(path, json)?;
        info!(path = %path.display(), "Saved acoustic model");
        Ok(())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn log_math(&self) -> &LogMath {
        &self.log_math
    }

    pub fn vector_length(&self) -> usize {
        self.vector_length
    }

    pub fn means(&self) -> &Pool<Vec<f32>> {
        &self.means
    }

    pub fn means_mut(&mut self) -> &mut Pool<Vec<f32>> {
        &mut self.means
    }

    pub fn variances(&self) -> &Pool<Vec<f32>> {
        &self.variances
    }

    pub fn variances_mut(&mut self) -> &mut Pool<Vec<f32>> {
        &mut self.variances
    }

    pub fn mixture_weights(&self) -> &Pool<Vec<f32>> {
        &self.mixture_weights
    }

    pub fn mixture_weights_mut(&mut self) -> &mut Pool<Vec<f32>> {
        &mut self.mixture_weights
    }

    pub fn transitions(&self) -> &Pool<Array2<f32>> {
        &self.transitions
    }

    pub fn transitions_mut(&mut self) -> &mut Pool<Array2<f32>> {
        &mut self.transitions
    }

    pub fn num_senones(&self) -> usize {
        self.senones.len()
    }

    pub fn senone(&self, id: usize) -> &GaussianMixture {
        &self.senones[id]
    }

    pub fn senones(&self) -> &[GaussianMixture] {
        &self.senones
    }

    pub fn hmm_manager(&self) -> &HmmManager {
        &self.hmms
    }

    pub fn hmm(&self, id: usize) -> &SenoneHmm {
        self.hmms.get(id)
    }

    pub fn params(&self) -> MixtureParams<'_> {
        MixtureParams {
            means: &self.means,
            mixture_weights: &self.mixture_weights,
            log_math: &self.log_math,
        }
    }

    /// Log likelihood of `feature` under a senone
    pub fn score_senone(&self, senone: usize, feature: &[f32]) -> f32 {
        self.senones[senone].score(feature, &self.params())
    }

    /// Log transition probability between two states of one HMM
    pub fn transition(&self, hmm: usize, from: usize, to: usize) -> f32 {
        let matrix = self.transitions.get(self.hmms.get(hmm).matrix);
        matrix[[from, to]]
    }

    /// Permitted successors of a state with their log probabilities
    pub fn successors(&self, state: HmmStateRef) -> Vec<(HmmStateRef, f32)> {
        let hmm = self.hmms.get(state.hmm);
        let matrix = self.transitions.get(hmm.matrix);
        matrix
            .row(state.state)
            .iter()
            .enumerate()
            .filter(|(_, p)| **p != LOG_ZERO)
            .map(|(to, &p)| (HmmStateRef::new(state.hmm, to), p))
            .collect()
    }

    /// Recompute the distance terms of every component reading a changed
    /// variance; returns how many components were refreshed
    pub fn precompute_distances(&mut self, changed: &HashSet<usize>) -> usize {
        let variances = &self.variances;
        let mut refreshed = 0;
        for senone in &mut self.senones {
            for component in senone.components_mut() {
                if changed.contains(&component.variance_id) || changed.contains(&component.mean_id) {
                    component.precompute_distance(variances.get(component.variance_id));
                    refreshed += 1;
                }
            }
        }
        refreshed
    }
}

impl std::fmt::Debug for AcousticModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcousticModel")
            .field("vector_length", &self.vector_length)
            .field("senones", &self.senones.len())
            .field("hmms", &self.hmms.len())
            .field("log_base", &self.log_math.base())
            .finish()
    }
}
