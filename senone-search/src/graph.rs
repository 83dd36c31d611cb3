//! Search states, arcs and the signature-keyed graph arena
//!
//! Every state carries a signature derived from its kind and its parent's
//! signature. [`SearchGraph::get_or_insert`] is the only way in, so two
//! states with equal signatures are always the same [`StateId`].

use std::collections::HashMap;
use std::sync::Arc;

use senone_acoustic::{AcousticModel, HmmPosition, HmmStateRef, SenoneHmm, Unit, LOG_ONE};
use tracing::trace;

use crate::error::{Result, SearchError};

/// Word label of the state a phone loop starts from
pub const UNKNOWN_WORD: &str = "<unk>";

/// Word label of the state a word loop starts from
pub const SENTENCE_START: &str = "<s>";

/// Handle to a state inside one [`SearchGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a search state stands for
#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    /// Entry into one pronunciation `variant` of a word
    Word { word: String, variant: usize },
    /// A unit at `index` within its pronunciation
    Unit {
        unit: Unit,
        position: HmmPosition,
        index: usize,
    },
    /// Emitting HMM state scored against `senone`
    Hmm { state: HmmStateRef, senone: usize },
    /// HMM state that consumes no frame (the exit)
    NonEmitting { state: HmmStateRef },
    /// Fan-out point
    Branch(String),
    /// Join point that feeds a loop
    LoopBack(String),
}

impl StateKind {
    /// Signature component contributed by this kind
    pub fn label(&self) -> String {
        match self {
            StateKind::Word { word, variant } => format!("W:{}:{}", word, variant),
            StateKind::Unit {
                unit,
                position,
                index,
            } => format!("U:{}:{}:{}", unit.key(), position.as_char(), index),
            StateKind::Hmm { state, .. } => format!("H:{}:{}", state.hmm, state.state),
            StateKind::NonEmitting { state } => format!("N:{}:{}", state.hmm, state.state),
            StateKind::Branch(name) => format!("B:{}", name),
            StateKind::LoopBack(name) => format!("L:{}", name),
        }
    }

    /// Coarse type used in graph dumps
    pub fn type_label(&self) -> &'static str {
        match self {
            StateKind::Unit { .. } => "Unit",
            StateKind::Word { .. } => "Word",
            StateKind::Hmm { .. } | StateKind::NonEmitting { .. } => "HMM",
            StateKind::Branch(_) | StateKind::LoopBack(_) => "other",
        }
    }

    pub fn senone(&self) -> Option<usize> {
        match self {
            StateKind::Hmm { senone, .. } => Some(*senone),
            _ => None,
        }
    }

    pub fn is_emitting(&self) -> bool {
        matches!(self, StateKind::Hmm { .. })
    }

    /// Kind of state `state` of `hmm`
    pub fn for_hmm_state(hmm: &SenoneHmm, state: usize) -> Self {
        let state_ref = hmm.state_ref(state);
        match hmm.senone(state) {
            Some(senone) => StateKind::Hmm {
                state: state_ref,
                senone,
            },
            None => StateKind::NonEmitting { state: state_ref },
        }
    }
}

/// Directed arc; the three components are log probabilities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchStateArc {
    pub to: StateId,
    pub acoustic: f32,
    pub language: f32,
    pub insertion: f32,
}

impl SearchStateArc {
    pub fn new(to: StateId, acoustic: f32, language: f32, insertion: f32) -> Self {
        Self {
            to,
            acoustic,
            language,
            insertion,
        }
    }

    /// Arc that costs nothing
    pub fn certain(to: StateId) -> Self {
        Self::new(to, LOG_ONE, LOG_ONE, LOG_ONE)
    }

    /// Combined log probability of taking the arc
    pub fn log_probability(&self) -> f32 {
        self.acoustic + self.language + self.insertion
    }
}

#[derive(Debug, Clone)]
pub struct SearchState {
    kind: StateKind,
    signature: String,
    arcs: Vec<SearchStateArc>,
    is_final: bool,
}

impl SearchState {
    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn arcs(&self) -> &[SearchStateArc] {
        &self.arcs
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_emitting(&self) -> bool {
        self.kind.is_emitting()
    }
}

/// Arena of search states with a signature cache
#[derive(Debug, Clone, Default)]
pub struct SearchGraph {
    states: Vec<SearchState>,
    cache: HashMap<String, StateId>,
    initial: Option<StateId>,
}

impl SearchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signature a state of `kind` below `parent` would have
    pub fn signature_of(&self, kind: &StateKind, parent: Option<StateId>) -> String {
        match parent {
            Some(parent) => format!("{}.{}", self.state(parent).signature, kind.label()),
            None => kind.label(),
        }
    }

    pub fn lookup(&self, signature: &str) -> Option<StateId> {
        self.cache.get(signature).copied()
    }

    /// Cached state with the same signature, or a new one
    ///
    /// The flag is `true` when the state was created by this call.
    pub fn get_or_insert(&mut self, kind: StateKind, parent: Option<StateId>) -> (StateId, bool) {
        let signature = self.signature_of(&kind, parent);
        if let Some(&id) = self.cache.get(&signature) {
            return (id, false);
        }

        let id = StateId(self.states.len());
        trace!(signature = %signature, id = id.0, "New search state");
        self.cache.insert(signature.clone(), id);
        self.states.push(SearchState {
            kind,
            signature,
            arcs: Vec::new(),
            is_final: false,
        });
        (id, true)
    }

    /// Add an arc leaving `from`; an identical arc is not added twice
    pub fn attach(&mut self, from: StateId, arc: SearchStateArc) -> bool {
        assert!(arc.to.0 < self.states.len(), "Arc target {:?} not in graph", arc.to);
        let arcs = &mut self.states[from.0].arcs;
        if arcs.contains(&arc) {
            return false;
        }
        arcs.push(arc);
        true
    }

    /// Panics on an id from another graph
    pub fn state(&self, id: StateId) -> &SearchState {
        &self.states[id.0]
    }

    pub fn successors(&self, id: StateId) -> &[SearchStateArc] {
        &self.states[id.0].arcs
    }

    pub fn set_initial(&mut self, id: StateId) {
        assert!(id.0 < self.states.len());
        self.initial = Some(id);
    }

    pub fn initial_state(&self) -> Option<StateId> {
        self.initial
    }

    pub fn set_final(&mut self, id: StateId) {
        self.states[id.0].is_final = true;
    }

    pub fn final_states(&self) -> impl Iterator<Item = StateId> + '_ {
        self.iter().filter(|(_, s)| s.is_final).map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateId, &SearchState)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId(i), s))
    }
}

/// Source of a search graph for the decoder
pub trait Linguist {
    fn search_graph(&self) -> &SearchGraph;

    /// State every utterance starts from
    fn initial_state(&self) -> StateId;
}

impl<L: Linguist + ?Sized> Linguist for Arc<L> {
    fn search_graph(&self) -> &SearchGraph {
        (**self).search_graph()
    }

    fn initial_state(&self) -> StateId {
        (**self).initial_state()
    }
}

/// Expand the states of `hmm` below `unit` and return its exit state
///
/// The entry state hangs off `unit` with a certain arc. Every permitted
/// transition becomes an arc carrying its log probability; a target whose
/// signature is already cached receives the arc and is not expanded again.
pub fn expand_hmm(
    graph: &mut SearchGraph,
    model: &AcousticModel,
    unit: StateId,
    hmm: &SenoneHmm,
) -> Result<StateId> {
    let (entry, created) = graph.get_or_insert(StateKind::for_hmm_state(hmm, 0), Some(unit));
    graph.attach(unit, SearchStateArc::certain(entry));

    let mut pending = Vec::new();
    if created {
        pending.push((entry, hmm.state_ref(0)));
    }

    while let Some((from, state_ref)) = pending.pop() {
        for (next, log_prob) in model.successors(state_ref) {
            let kind = StateKind::for_hmm_state(model.hmm(next.hmm), next.state);
            let (to, created) = graph.get_or_insert(kind, Some(unit));
            graph.attach(from, SearchStateArc::new(to, log_prob, LOG_ONE, LOG_ONE));
            if created {
                pending.push((to, next));
            }
        }
    }

    let exit_kind = StateKind::for_hmm_state(hmm, hmm.exit_state());
    let signature = graph.signature_of(&exit_kind, Some(unit));
    graph.lookup(&signature).ok_or_else(|| {
        SearchError::graph(format!(
            "HMM {} for unit {} never reaches its exit state",
            hmm.id, hmm.unit
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use senone_acoustic::{HmmDefinition, ModelConfig, ModelDefinition, SenoneDefinition};

    fn three_state_model() -> AcousticModel {
        let def = ModelDefinition {
            vector_length: 1,
            means: vec![vec![0.0]],
            variances: vec![vec![1.0]],
            senones: vec![SenoneDefinition {
                gaussians: vec![0],
                mixture_weights: vec![1.0],
            }],
            transition_matrices: vec![vec![
                vec![0.5, 0.4, 0.1, 0.0],
                vec![0.0, 0.5, 0.5, 0.0],
                vec![0.0, 0.0, 0.5, 0.5],
                vec![0.0, 0.0, 0.0, 0.0],
            ]],
            hmms: vec![HmmDefinition {
                unit: Unit::ci("AA"),
                position: HmmPosition::Undefined,
                senones: vec![0, 0, 0],
                transition_matrix: 0,
            }],
        };
        AcousticModel::from_definition(&def, &ModelConfig::default()).unwrap()
    }

    fn unit_kind() -> StateKind {
        StateKind::Unit {
            unit: Unit::ci("AA"),
            position: HmmPosition::Undefined,
            index: 0,
        }
    }

    #[test]
    fn test_signature_chains_parent() {
        let mut graph = SearchGraph::new();
        let (unit, _) = graph.get_or_insert(unit_kind(), None);
        let (hmm, _) = graph.get_or_insert(
            StateKind::Hmm {
                state: HmmStateRef::new(0, 1),
                senone: 4,
            },
            Some(unit),
        );
        assert_eq!(graph.state(unit).signature(), "U:AA:-:0");
        assert_eq!(graph.state(hmm).signature(), "U:AA:-:0.H:0:1");
    }

    #[test]
    fn test_equal_signature_same_state() {
        let mut graph = SearchGraph::new();
        let (a, created_a) = graph.get_or_insert(StateKind::Branch("x".into()), None);
        let (b, created_b) = graph.get_or_insert(StateKind::Branch("x".into()), None);
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_attach_skips_identical_arc() {
        let mut graph = SearchGraph::new();
        let (a, _) = graph.get_or_insert(StateKind::Branch("a".into()), None);
        let (b, _) = graph.get_or_insert(StateKind::LoopBack("b".into()), None);
        assert!(graph.attach(a, SearchStateArc::certain(b)));
        assert!(!graph.attach(a, SearchStateArc::certain(b)));
        assert!(graph.attach(a, SearchStateArc::new(b, -1.0, 0.0, 0.0)));
        assert_eq!(graph.successors(a).len(), 2);
    }

    #[test]
    fn test_arc_probability_is_log_sum() {
        let arc = SearchStateArc::new(StateId(0), -1.5, -2.0, -0.5);
        assert_eq!(arc.log_probability(), -4.0);
    }

    #[test]
    fn test_expand_hmm_builds_topology() {
        let model = three_state_model();
        let mut graph = SearchGraph::new();
        let (unit, _) = graph.get_or_insert(unit_kind(), None);

        let exit = expand_hmm(&mut graph, &model, unit, model.hmm(0)).unwrap();

        // unit + 3 emitting + exit
        assert_eq!(graph.len(), 5);
        assert!(matches!(graph.state(exit).kind(), StateKind::NonEmitting { .. }));
        assert!(graph.successors(exit).is_empty());

        let entry = graph.successors(unit)[0].to;
        let targets: Vec<&str> = graph
            .successors(entry)
            .iter()
            .map(|arc| graph.state(arc.to).signature())
            .collect();
        // self loop, next state and skip
        assert_eq!(targets.len(), 3);
        assert!(targets.contains(&graph.state(entry).signature()));
    }

    #[test]
    fn test_reexpansion_adds_nothing() {
        let model = three_state_model();
        let mut graph = SearchGraph::new();
        let (unit, _) = graph.get_or_insert(unit_kind(), None);
        let first = expand_hmm(&mut graph, &model, unit, model.hmm(0)).unwrap();
        let (states, arcs) = (graph.len(), graph.num_arcs());

        let second = expand_hmm(&mut graph, &model, unit, model.hmm(0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.len(), states);
        assert_eq!(graph.num_arcs(), arcs);
    }
}
