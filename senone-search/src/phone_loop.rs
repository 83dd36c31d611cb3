//! Context-independent phone loop
//!
//! ```text
//!            ┌──────────────── loop-back <───────────────┐
//!            ▼                                           │
//!        branch-out ──(insertion)──> unit ──> HMM ... exit
//! <unk> ──(insertion)──────────────────┘
//! ```
//!
//! Any sequence of context-independent phones is a path. Each phone costs
//! the configured insertion probability, which keeps the loop from
//! favouring many short phones.

use serde::{Deserialize, Serialize};
use tracing::debug;

use senone_acoustic::{AcousticModel, HmmPosition, LOG_ONE};

use crate::error::{Result, SearchError};
use crate::graph::{expand_hmm, Linguist, SearchGraph, SearchStateArc, StateId, StateKind, UNKNOWN_WORD};

/// Phone loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneLoopConfig {
    /// Linear probability charged on entering each phone (default: 1.0)
    pub phone_insertion_probability: f64,
}

impl Default for PhoneLoopConfig {
    fn default() -> Self {
        Self {
            phone_insertion_probability: 1.0,
        }
    }
}

impl PhoneLoopConfig {
    pub fn phone_insertion_probability(mut self, probability: f64) -> Self {
        self.phone_insertion_probability = probability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.phone_insertion_probability > 0.0 && self.phone_insertion_probability <= 1.0) {
            return Err(SearchError::config(format!(
                "phone_insertion_probability must be in (0, 1], got {}",
                self.phone_insertion_probability
            )));
        }
        Ok(())
    }
}

/// Search graph looping over every context-independent unit of a model
#[derive(Debug, Clone)]
pub struct CiPhoneLoop {
    graph: SearchGraph,
    first: StateId,
    branch: StateId,
    loop_back: StateId,
    units: Vec<StateId>,
    log_insertion: f32,
}

impl CiPhoneLoop {
    pub fn new(model: &AcousticModel, config: &PhoneLoopConfig) -> Result<Self> {
        config.validate()?;
        let log_insertion = model.log_math().linear_to_log(config.phone_insertion_probability);

        let mut graph = SearchGraph::new();
        let (first, _) = graph.get_or_insert(
            StateKind::Word {
                word: UNKNOWN_WORD.to_string(),
                variant: 0,
            },
            None,
        );
        let (branch, _) = graph.get_or_insert(StateKind::Branch("BranchOut".into()), None);
        let (loop_back, _) = graph.get_or_insert(StateKind::LoopBack("CIPhonesLoopBack".into()), None);
        graph.attach(loop_back, SearchStateArc::certain(branch));
        graph.set_final(loop_back);

        let mut units = Vec::new();
        for hmm in model.hmm_manager().ci_hmms() {
            let (unit, _) = graph.get_or_insert(
                StateKind::Unit {
                    unit: hmm.unit.clone(),
                    position: HmmPosition::Undefined,
                    index: 0,
                },
                None,
            );
            let entry = SearchStateArc::new(unit, LOG_ONE, LOG_ONE, log_insertion);
            graph.attach(branch, entry);
            graph.attach(first, entry);

            let exit = expand_hmm(&mut graph, model, unit, hmm)?;
            graph.attach(exit, SearchStateArc::certain(loop_back));
            units.push(unit);
        }

        if units.is_empty() {
            return Err(SearchError::graph("Model has no context-independent units"));
        }

        graph.set_initial(first);
        debug!(
            units = units.len(),
            states = graph.len(),
            arcs = graph.num_arcs(),
            "Phone loop built"
        );

        Ok(Self {
            graph,
            first,
            branch,
            loop_back,
            units,
            log_insertion,
        })
    }

    pub fn branch_state(&self) -> StateId {
        self.branch
    }

    pub fn loop_back_state(&self) -> StateId {
        self.loop_back
    }

    /// One unit state per context-independent unit, in model order
    pub fn unit_states(&self) -> &[StateId] {
        &self.units
    }

    /// Log insertion probability on every unit entry arc
    pub fn log_insertion_probability(&self) -> f32 {
        self.log_insertion
    }
}

impl Linguist for CiPhoneLoop {
    fn search_graph(&self) -> &SearchGraph {
        &self.graph
    }

    fn initial_state(&self) -> StateId {
        self.first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(PhoneLoopConfig::default().validate().is_ok());
        assert!(PhoneLoopConfig::default().phone_insertion_probability(0.0).validate().is_err());
        assert!(PhoneLoopConfig::default().phone_insertion_probability(1.5).validate().is_err());
        assert!(PhoneLoopConfig::default().phone_insertion_probability(f64::NAN).validate().is_err());
    }
}
