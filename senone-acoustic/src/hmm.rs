//! Units and senone-tied HMMs

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A phonetic unit, optionally with left/right context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    #[serde(default)]
    pub filler: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
}

impl Unit {
    /// Context-independent unit
    pub fn ci<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            filler: false,
            left: None,
            right: None,
        }
    }

    pub fn filler<S: Into<String>>(name: S) -> Self {
        Self {
            filler: true,
            ..Self::ci(name)
        }
    }

    pub fn with_context<S: Into<String>>(name: S, left: S, right: S) -> Self {
        Self {
            left: Some(left.into()),
            right: Some(right.into()),
            ..Self::ci(name)
        }
    }

    pub fn is_context_dependent(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    /// Lookup key: `name` or `name(left,right)`
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_context_dependent() {
            write!(
                f,
                "{}({},{})",
                self.name,
                self.left.as_deref().unwrap_or("-"),
                self.right.as_deref().unwrap_or("-")
            )
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Position of a unit within its word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmmPosition {
    Begin,
    Internal,
    End,
    Single,
    #[default]
    Undefined,
}

impl HmmPosition {
    pub fn as_char(&self) -> char {
        match self {
            HmmPosition::Begin => 'b',
            HmmPosition::Internal => 'i',
            HmmPosition::End => 'e',
            HmmPosition::Single => 's',
            HmmPosition::Undefined => '-',
        }
    }
}

/// Reference to one state of one HMM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HmmStateRef {
    pub hmm: usize,
    pub state: usize,
}

impl HmmStateRef {
    pub fn new(hmm: usize, state: usize) -> Self {
        Self { hmm, state }
    }
}

/// Left-to-right HMM whose emitting states tie to senones
///
/// States `0..senones.len()` emit; the last state `senones.len()` is the
/// non-emitting exit. The transition matrix is square over all states.
#[derive(Debug, Clone, PartialEq)]
pub struct SenoneHmm {
    pub id: usize,
    pub unit: Unit,
    pub position: HmmPosition,
    pub senones: Vec<usize>,
    pub matrix: usize,
}

impl SenoneHmm {
    /// Number of states including the non-emitting exit
    pub fn num_states(&self) -> usize {
        self.senones.len() + 1
    }

    pub fn num_emitting(&self) -> usize {
        self.senones.len()
    }

    pub fn is_emitting(&self, state: usize) -> bool {
        state < self.senones.len()
    }

    pub fn senone(&self, state: usize) -> Option<usize> {
        self.senones.get(state).copied()
    }

    pub fn exit_state(&self) -> usize {
        self.senones.len()
    }

    pub fn state_ref(&self, state: usize) -> HmmStateRef {
        HmmStateRef::new(self.id, state)
    }
}

/// Owns every HMM of a model and resolves units to HMMs
#[derive(Debug, Clone, Default)]
pub struct HmmManager {
    hmms: Vec<SenoneHmm>,
    index: HashMap<(String, HmmPosition), usize>,
}

impl HmmManager {
    pub fn new(hmms: Vec<SenoneHmm>) -> Self {
        let index = hmms
            .iter()
            .map(|hmm| ((hmm.unit.key(), hmm.position), hmm.id))
            .collect();
        Self { hmms, index }
    }

    pub fn get(&self, id: usize) -> &SenoneHmm {
        &self.hmms[id]
    }

    pub fn len(&self) -> usize {
        self.hmms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hmms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SenoneHmm> {
        self.hmms.iter()
    }

    /// Best HMM for a unit
    ///
    /// Tries the exact unit at `position`, then at any position, then the
    /// context-independent base unit the same way.
    pub fn lookup(&self, unit: &Unit, position: HmmPosition) -> Option<&SenoneHmm> {
        let key = unit.key();
        let candidates = [
            (key.clone(), position),
            (key, HmmPosition::Undefined),
            (unit.name.clone(), position),
            (unit.name.clone(), HmmPosition::Undefined),
        ];

        candidates
            .iter()
            .find_map(|k| self.index.get(k))
            .map(|&id| &self.hmms[id])
    }

    /// Context-independent HMMs, one per unit name, in model order
    pub fn ci_hmms(&self) -> impl Iterator<Item = &SenoneHmm> {
        let mut seen = std::collections::HashSet::new();
        self.hmms
            .iter()
            .filter(|hmm| !hmm.unit.is_context_dependent())
            .filter(move |hmm| seen.insert(hmm.unit.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hmm(id: usize, unit: Unit, position: HmmPosition) -> SenoneHmm {
        SenoneHmm {
            id,
            unit,
            position,
            senones: vec![id * 3, id * 3 + 1, id * 3 + 2],
            matrix: 0,
        }
    }

    fn manager() -> HmmManager {
        HmmManager::new(vec![
            hmm(0, Unit::ci("AA"), HmmPosition::Undefined),
            hmm(1, Unit::ci("B"), HmmPosition::Undefined),
            hmm(2, Unit::with_context("AA", "B", "B"), HmmPosition::Internal),
            hmm(3, Unit::filler("SIL"), HmmPosition::Undefined),
        ])
    }

    #[test]
    fn test_unit_key() {
        assert_eq!(Unit::ci("AA").key(), "AA");
        assert_eq!(Unit::with_context("AA", "B", "C").key(), "AA(B,C)");
        assert!(Unit::filler("SIL").filler);
    }

    #[test]
    fn test_state_layout() {
        let h = hmm(1, Unit::ci("B"), HmmPosition::Undefined);
        assert_eq!(h.num_states(), 4);
        assert!(h.is_emitting(2));
        assert!(!h.is_emitting(3));
        assert_eq!(h.senone(0), Some(3));
        assert_eq!(h.senone(3), None);
    }

    #[test]
    fn test_lookup_exact_and_fallback() {
        let m = manager();
        let triphone = Unit::with_context("AA", "B", "B");
        assert_eq!(m.lookup(&triphone, HmmPosition::Internal).map(|h| h.id), Some(2));

        // Unknown context falls back to the CI unit
        let other = Unit::with_context("AA", "SIL", "B");
        assert_eq!(m.lookup(&other, HmmPosition::Begin).map(|h| h.id), Some(0));

        assert!(m.lookup(&Unit::ci("ZH"), HmmPosition::Undefined).is_none());
    }

    #[test]
    fn test_ci_hmms() {
        let names: Vec<String> = manager().ci_hmms().map(|h| h.unit.name.clone()).collect();
        assert_eq!(names, vec!["AA", "B", "SIL"]);
    }
}
