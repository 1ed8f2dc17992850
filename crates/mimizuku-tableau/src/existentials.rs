//! 存在制約展開戦略 - 生成順・深さ優先・個体再利用

use crate::graph::{CompletionGraph, NodeId};
use mimizuku_model::{AtomicConcept, Concept, Individual};
use std::collections::{HashMap, HashSet};

/// Picks which pending existential to expand next and how to build its
/// witness. Creation-order expands the oldest node first (breadth-like),
/// depth-first the newest. Individual reuse satisfies atomic-filler
/// existentials with one shared root node per concept instead of a fresh
/// child; this is complete only for EL-style ontologies, so reuse can be
/// suppressed per concept.
#[derive(Debug)]
pub enum ExistentialStrategy {
    CreationOrder,
    DepthFirst,
    IndividualReuse {
        el_mode: bool,
        reuse_always: HashSet<AtomicConcept>,
        reuse_never: HashSet<AtomicConcept>,
        reused: HashMap<AtomicConcept, NodeId>,
        fresh: u64,
    },
}

impl ExistentialStrategy {
    pub fn individual_reuse(
        el_mode: bool,
        reuse_always: HashSet<AtomicConcept>,
        reuse_never: HashSet<AtomicConcept>,
    ) -> Self {
        ExistentialStrategy::IndividualReuse {
            el_mode,
            reuse_always,
            reuse_never,
            reused: HashMap::new(),
            fresh: 0,
        }
    }

    pub fn is_individual_reuse(&self) -> bool {
        matches!(self, ExistentialStrategy::IndividualReuse { .. })
    }

    /// Forgets per-query state. Called at the start of every
    /// satisfiability check so reuse decisions never leak across queries.
    pub fn reset(&mut self) {
        if let ExistentialStrategy::IndividualReuse { reused, .. } = self {
            reused.clear();
        }
    }

    /// Selects the node to expand from a creation-ordered list of nodes
    /// with pending existentials.
    pub fn select(&self, pending: &[NodeId]) -> Option<NodeId> {
        match self {
            ExistentialStrategy::DepthFirst => pending.last().copied(),
            _ => pending.first().copied(),
        }
    }

    /// Produces the witness node for `∃role.concept` at `node`: either a
    /// fresh child, or (under individual reuse, for an eligible atomic
    /// filler) a shared root node representing the concept.
    pub fn witness(
        &mut self,
        graph: &mut CompletionGraph,
        node: NodeId,
        concept: &Concept,
    ) -> NodeId {
        if let ExistentialStrategy::IndividualReuse {
            el_mode,
            reuse_always,
            reuse_never,
            reused,
            fresh,
        } = self
        {
            if let Concept::Atomic(a) = concept {
                let eligible =
                    (*el_mode || reuse_always.contains(a)) && !reuse_never.contains(a);
                if eligible {
                    // Stale map entries can survive backtracking; accept
                    // one only when it still looks like the node we made.
                    if let Some(&existing) = reused.get(a) {
                        if existing.index() < graph.len()
                            && graph.node(existing).individual().is_some()
                            && graph.has_label(existing, concept)
                        {
                            return graph.canonical(existing);
                        }
                    }
                    *fresh += 1;
                    let ind = Individual::create_anonymous(&format!(
                        "internal:reuse#{}#{}",
                        a.iri(),
                        fresh
                    ));
                    let root = graph.create_node(Some(ind), None);
                    reused.insert(*a, root);
                    return root;
                }
            }
        }
        graph.create_node(None, Some(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_order_picks_oldest_and_depth_first_newest() {
        let mut graph = CompletionGraph::new();
        let a = graph.create_node(None, None);
        let b = graph.create_node(None, None);
        let c = graph.create_node(None, None);
        let pending = vec![a, b, c];
        assert_eq!(ExistentialStrategy::CreationOrder.select(&pending), Some(a));
        assert_eq!(ExistentialStrategy::DepthFirst.select(&pending), Some(c));
        assert_eq!(ExistentialStrategy::CreationOrder.select(&[]), None);
    }

    #[test]
    fn reuse_returns_the_same_root_per_concept() {
        let mut graph = CompletionGraph::new();
        let a = graph.create_node(None, None);
        let b = graph.create_node(None, None);
        let mut strategy =
            ExistentialStrategy::individual_reuse(true, HashSet::new(), HashSet::new());
        let concept = Concept::atomic("ex:C");
        let first = strategy.witness(&mut graph, a, &concept);
        graph.add_label(first, concept.clone());
        let second = strategy.witness(&mut graph, b, &concept);
        assert_eq!(first, second);
        // The reused node is a root, not a child of either source.
        assert_eq!(graph.node(first).parent(), None);
    }

    #[test]
    fn reuse_never_forces_fresh_children() {
        let mut graph = CompletionGraph::new();
        let a = graph.create_node(None, None);
        let mut never = HashSet::new();
        never.insert(AtomicConcept::create("ex:C"));
        let mut strategy = ExistentialStrategy::individual_reuse(true, HashSet::new(), never);
        let concept = Concept::atomic("ex:C");
        let w1 = strategy.witness(&mut graph, a, &concept);
        let w2 = strategy.witness(&mut graph, a, &concept);
        assert_ne!(w1, w2);
        assert_eq!(graph.node(w1).parent(), Some(a));
    }

    #[test]
    fn complex_fillers_never_reuse() {
        let mut graph = CompletionGraph::new();
        let a = graph.create_node(None, None);
        let mut strategy =
            ExistentialStrategy::individual_reuse(true, HashSet::new(), HashSet::new());
        let concept = Concept::some(
            mimizuku_model::Role::create("ex:r"),
            Concept::atomic("ex:C"),
        );
        let w = strategy.witness(&mut graph, a, &concept);
        assert_eq!(graph.node(w).parent(), Some(a));
    }
}
