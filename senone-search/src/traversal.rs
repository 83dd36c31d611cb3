//! Walking a search graph
//!
//! [`traverse`] visits every state reachable from a start state once,
//! keyed by signature, so cyclic graphs such as phone loops terminate.
//! Depth-first treats the pending list as a stack, breadth-first as a
//! FIFO queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use crate::graph::{SearchGraph, SearchStateArc, StateId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalOrder {
    #[default]
    DepthFirst,
    BreadthFirst,
}

/// Callbacks driven by [`traverse`]; all default to doing nothing
pub trait GraphVisitor {
    fn start(&mut self) {}

    /// Every time a state leaves the pending list, visited or not
    fn reached(&mut self, _graph: &SearchGraph, _state: StateId, _level: usize) {}

    /// First time a state is reached
    fn visit(&mut self, _graph: &SearchGraph, _state: StateId, _level: usize) {}

    fn arc(&mut self, _graph: &SearchGraph, _from: StateId, _arc: &SearchStateArc, _level: usize) {}

    fn finish(&mut self) {}
}

/// Visit the graph from `start`; returns the number of distinct states seen
pub fn traverse<V: GraphVisitor + ?Sized>(
    graph: &SearchGraph,
    start: StateId,
    order: TraversalOrder,
    visitor: &mut V,
) -> usize {
    let mut pending = VecDeque::new();
    let mut visited: HashSet<&str> = HashSet::new();

    visitor.start();
    pending.push_back((start, 0));

    while let Some((id, level)) = pending.pop_front() {
        visitor.reached(graph, id, level);

        let state = graph.state(id);
        if !visited.insert(state.signature()) {
            continue;
        }

        visitor.visit(graph, id, level);
        // Reversed so that depth-first pops the first arc first
        for arc in state.arcs().iter().rev() {
            visitor.arc(graph, id, arc, level);
            match order {
                TraversalOrder::DepthFirst => pending.push_front((arc.to, level + 1)),
                TraversalOrder::BreadthFirst => pending.push_back((arc.to, level + 1)),
            }
        }
    }

    visitor.finish();
    visited.len()
}

/// Text dump, one `level signature 1 type` line per visited state
#[derive(Debug, Clone, Default)]
pub struct GraphDumper {
    out: String,
}

impl GraphDumper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

impl GraphVisitor for GraphDumper {
    fn visit(&mut self, graph: &SearchGraph, state: StateId, level: usize) {
        let state = graph.state(state);
        // Writing into a String cannot fail
        let _ = writeln!(
            self.out,
            "{} {} 1 {}",
            level,
            state.signature(),
            state.kind().type_label()
        );
    }
}

/// Dump everything reachable from the graph's initial state
pub fn dump_graph(graph: &SearchGraph, order: TraversalOrder) -> String {
    let mut dumper = GraphDumper::new();
    if let Some(initial) = graph.initial_state() {
        traverse(graph, initial, order, &mut dumper);
    }
    dumper.into_string()
}

/// Checks that signature equality and state identity coincide
///
/// Every reached state is recorded by id and by signature; a state whose
/// signature maps to a different id, or an id seen with two signatures,
/// is reported.
#[derive(Debug, Clone, Default)]
pub struct SignatureAudit {
    by_id: HashMap<StateId, String>,
    by_signature: HashMap<String, StateId>,
    mismatches: Vec<String>,
}

impl SignatureAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mismatches(&self) -> &[String] {
        &self.mismatches
    }

    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Distinct signatures recorded
    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}

impl GraphVisitor for SignatureAudit {
    fn reached(&mut self, graph: &SearchGraph, state: StateId, _level: usize) {
        let signature = graph.state(state).signature();

        let known_signature = self.by_id.entry(state).or_insert_with(|| signature.to_string());
        if known_signature.as_str() != signature {
            self.mismatches.push(format!(
                "state {} seen as {} and {}",
                state.index(),
                known_signature,
                signature
            ));
        }

        let known_state = *self.by_signature.entry(signature.to_string()).or_insert(state);
        if known_state != state {
            self.mismatches.push(format!(
                "signature {} held by states {} and {}",
                signature,
                known_state.index(),
                state.index()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateKind;

    /// a -> b, a -> c, b -> d, c -> d, d -> a
    fn diamond() -> (SearchGraph, Vec<StateId>) {
        let mut graph = SearchGraph::new();
        let ids: Vec<StateId> = ["a", "b", "c", "d"]
            .iter()
            .map(|n| graph.get_or_insert(StateKind::Branch(n.to_string()), None).0)
            .collect();
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3), (3, 0)] {
            graph.attach(ids[from], SearchStateArc::certain(ids[to]));
        }
        graph.set_initial(ids[0]);
        (graph, ids)
    }

    #[derive(Default)]
    struct Order(Vec<(String, usize)>);

    impl GraphVisitor for Order {
        fn visit(&mut self, graph: &SearchGraph, state: StateId, level: usize) {
            self.0.push((graph.state(state).signature().to_string(), level));
        }
    }

    #[test]
    fn test_depth_first_order() {
        let (graph, ids) = diamond();
        let mut order = Order::default();
        let seen = traverse(&graph, ids[0], TraversalOrder::DepthFirst, &mut order);

        assert_eq!(seen, 4);
        let names: Vec<&str> = order.0.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["B:a", "B:b", "B:d", "B:c"]);
    }

    #[test]
    fn test_breadth_first_order_and_levels() {
        let (graph, ids) = diamond();
        let mut order = Order::default();
        traverse(&graph, ids[0], TraversalOrder::BreadthFirst, &mut order);

        // c is queued before b because arcs are walked in reverse
        assert_eq!(
            order.0,
            vec![
                ("B:a".to_string(), 0),
                ("B:c".to_string(), 1),
                ("B:b".to_string(), 1),
                ("B:d".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_dump_format() {
        let (graph, _) = diamond();
        let dump = dump_graph(&graph, TraversalOrder::DepthFirst);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "0 B:a 1 other");
        assert_eq!(lines[2], "2 B:d 1 other");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_audit_accepts_cached_graph() {
        let (graph, ids) = diamond();
        let mut audit = SignatureAudit::new();
        traverse(&graph, ids[0], TraversalOrder::BreadthFirst, &mut audit);
        assert!(audit.is_consistent());
        assert_eq!(audit.len(), 4);
    }

    #[test]
    fn test_audit_flags_shared_signature() {
        // Same signature, different ids, as if a state escaped the cache
        let mut one = SearchGraph::new();
        let mut other = SearchGraph::new();
        other.get_or_insert(StateKind::Branch("pad".into()), None);
        let (x, _) = one.get_or_insert(StateKind::Branch("x".into()), None);
        let (y, _) = other.get_or_insert(StateKind::Branch("x".into()), None);

        let mut audit = SignatureAudit::new();
        audit.reached(&one, x, 0);
        audit.reached(&other, y, 0);

        assert!(!audit.is_consistent());
        assert!(audit.mismatches()[0].contains("B:x"));
    }
}
