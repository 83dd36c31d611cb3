//! Per-frame forward/backward statistics

use senone_acoustic::{HmmStateRef, LOG_ONE, LOG_ZERO};

/// What a score refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTarget {
    /// An HMM state of the utterance graph
    State(HmmStateRef),
    /// Broadcast to every senone and every HMM (flat start, filler models)
    AllModels,
    /// A non-emitting graph node; carries no statistics
    NonEmitting,
}

/// Statistics of one graph state at one frame
///
/// Probabilities are logs in the model's base. Scores for one frame form a
/// slice indexed by graph position; within an HMM, state `j` of the next
/// frame sits at `index + (j - i)` relative to state `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerScore {
    pub feature: Vec<f32>,
    pub target: ScoreTarget,
    /// Output probability of the feature in this state
    pub score: f32,
    pub alpha: f32,
    pub beta: f32,
    /// State occupancy posterior
    pub gamma: f32,
    /// Posterior of each mixture component, given the state
    pub component_gamma: Vec<f32>,
    /// Subtracted from the pass log likelihood on every accumulate call
    /// that reads this frame
    pub scaling_factor: f32,
}

impl TrainerScore {
    pub fn new(feature: Vec<f32>, target: ScoreTarget, score: f32) -> Self {
        Self {
            feature,
            target,
            score,
            alpha: LOG_ZERO,
            beta: LOG_ZERO,
            gamma: LOG_ZERO,
            component_gamma: Vec::new(),
            scaling_factor: 0.0,
        }
    }

    /// Fully occupied state with a single component
    pub fn certain(feature: Vec<f32>, target: ScoreTarget) -> Self {
        Self {
            alpha: LOG_ONE,
            beta: LOG_ONE,
            gamma: LOG_ONE,
            component_gamma: vec![LOG_ONE],
            ..Self::new(feature, target, LOG_ONE)
        }
    }

    pub fn with_forward_backward(mut self, alpha: f32, beta: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self
    }

    pub fn with_gamma(mut self, gamma: f32, component_gamma: Vec<f32>) -> Self {
        self.gamma = gamma;
        self.component_gamma = component_gamma;
        self
    }

    pub fn with_scaling_factor(mut self, scaling_factor: f32) -> Self {
        self.scaling_factor = scaling_factor;
        self
    }

    pub fn state(&self) -> Option<HmmStateRef> {
        match self.target {
            ScoreTarget::State(state) => Some(state),
            _ => None,
        }
    }
}
