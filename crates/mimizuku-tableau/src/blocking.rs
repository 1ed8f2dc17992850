//! ブロッキング - 停止性を保証する直接/間接ブロック判定

use crate::graph::{BlockingStatus, CompletionGraph, NodeId};
use mimizuku_model::{Concept, Role};
use std::collections::{BTreeSet, HashSet};

/// How much of a node's neighbourhood participates in blocking
/// comparisons. Single blocking compares labels only and is sound for
/// logics without inverse roles; pairwise blocking additionally compares
/// the parent's labels and the connecting edge roles; the reflexive
/// variant also folds in self-loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectBlockingChecker {
    Single,
    Pairwise,
    PairwiseReflexive,
}

/// Everything a checker compares between a potential blocker and a
/// blocked node, in a hashable, order-independent form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockingSignature {
    Single {
        labels: BTreeSet<Concept>,
    },
    Pairwise {
        labels: BTreeSet<Concept>,
        parent_labels: BTreeSet<Concept>,
        edge_roles: BTreeSet<Role>,
    },
    PairwiseReflexive {
        labels: BTreeSet<Concept>,
        parent_labels: BTreeSet<Concept>,
        edge_roles: BTreeSet<Role>,
        self_loops: BTreeSet<Role>,
    },
}

impl DirectBlockingChecker {
    pub fn signature(self, graph: &CompletionGraph, id: NodeId) -> BlockingSignature {
        let labels: BTreeSet<Concept> = graph.node(id).labels().iter().cloned().collect();
        match self {
            DirectBlockingChecker::Single => BlockingSignature::Single { labels },
            DirectBlockingChecker::Pairwise => {
                let (parent_labels, edge_roles) = Self::parent_parts(graph, id);
                BlockingSignature::Pairwise {
                    labels,
                    parent_labels,
                    edge_roles,
                }
            }
            DirectBlockingChecker::PairwiseReflexive => {
                let (parent_labels, edge_roles) = Self::parent_parts(graph, id);
                let self_loops = graph.edge_roles(id, id).into_iter().collect();
                BlockingSignature::PairwiseReflexive {
                    labels,
                    parent_labels,
                    edge_roles,
                    self_loops,
                }
            }
        }
    }

    fn parent_parts(
        graph: &CompletionGraph,
        id: NodeId,
    ) -> (BTreeSet<Concept>, BTreeSet<Role>) {
        match graph.node(id).parent() {
            Some(parent) => {
                let parent = graph.canonical(parent);
                let labels = graph.node(parent).labels().iter().cloned().collect();
                let roles = graph.edge_roles(parent, id).into_iter().collect();
                (labels, roles)
            }
            None => (BTreeSet::new(), BTreeSet::new()),
        }
    }
}

/// Signatures of unblocked tree nodes of previously completed graphs.
/// A pending expansion whose signature is already known to be
/// completable can be blocked without a witness node. Never used when
/// the ontology has nominals.
#[derive(Debug)]
pub struct BlockingSignatureCache {
    checker: DirectBlockingChecker,
    signatures: HashSet<BlockingSignature>,
}

impl BlockingSignatureCache {
    pub fn new(checker: DirectBlockingChecker) -> Self {
        BlockingSignatureCache {
            checker,
            signatures: HashSet::new(),
        }
    }

    pub fn contains(&self, signature: &BlockingSignature) -> bool {
        self.signatures.contains(signature)
    }

    /// Harvests signatures from a clash-free completed graph.
    pub fn add_graph(&mut self, graph: &CompletionGraph) {
        for id in graph.live_nodes() {
            let node = graph.node(id);
            if node.is_tree_node() && !node.blocking().is_blocked() {
                self.signatures.insert(self.checker.signature(graph, id));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Where blocker candidates are searched for: among the blocked node's
/// ancestors only, or anywhere among older nodes.
#[derive(Debug)]
pub enum BlockingStrategy {
    Ancestor {
        checker: DirectBlockingChecker,
        cache: Option<BlockingSignatureCache>,
    },
    Anywhere {
        checker: DirectBlockingChecker,
        cache: Option<BlockingSignatureCache>,
    },
}

impl BlockingStrategy {
    pub fn checker(&self) -> DirectBlockingChecker {
        match self {
            BlockingStrategy::Ancestor { checker, .. } | BlockingStrategy::Anywhere { checker, .. } => {
                *checker
            }
        }
    }

    fn cache(&self) -> Option<&BlockingSignatureCache> {
        match self {
            BlockingStrategy::Ancestor { cache, .. } | BlockingStrategy::Anywhere { cache, .. } => {
                cache.as_ref()
            }
        }
    }

    /// Recomputes the blocking status of every live node, in creation
    /// order. A node is indirectly blocked when any ancestor is directly
    /// blocked; a tree node is directly blocked by the oldest unblocked
    /// candidate with an equal signature, or by a cache hit.
    pub fn compute(&self, graph: &mut CompletionGraph) {
        let checker = self.checker();
        let live = graph.live_nodes();
        for &id in &live {
            let status = self.status_for(graph, checker, id);
            graph.set_blocking(id, status);
        }
    }

    fn status_for(
        &self,
        graph: &CompletionGraph,
        checker: DirectBlockingChecker,
        id: NodeId,
    ) -> BlockingStatus {
        if let Some(parent) = graph.node(id).parent() {
            if graph.node(graph.canonical(parent)).blocking().is_blocked() {
                return BlockingStatus::IndirectlyBlocked;
            }
        }
        if !graph.node(id).is_tree_node() {
            return BlockingStatus::Unblocked;
        }
        let signature = checker.signature(graph, id);
        if let Some(cache) = self.cache() {
            if cache.contains(&signature) {
                return BlockingStatus::DirectlyBlocked(None);
            }
        }
        let candidates: Vec<NodeId> = match self {
            BlockingStrategy::Ancestor { .. } => {
                let mut ancestors = Vec::new();
                let mut current = graph.node(id).parent();
                while let Some(p) = current {
                    let p = graph.canonical(p);
                    ancestors.push(p);
                    current = graph.node(p).parent();
                }
                ancestors.reverse();
                ancestors
            }
            BlockingStrategy::Anywhere { .. } => {
                graph.live_nodes().into_iter().filter(|&n| n < id).collect()
            }
        };
        for candidate in candidates {
            if graph.node(candidate).blocking().is_blocked() {
                continue;
            }
            if checker.signature(graph, candidate) == signature {
                return BlockingStatus::DirectlyBlocked(Some(candidate));
            }
        }
        BlockingStatus::Unblocked
    }

    /// Feeds the signature cache from a completed clash-free graph.
    pub fn graph_completed(&mut self, graph: &CompletionGraph) {
        let cache = match self {
            BlockingStrategy::Ancestor { cache, .. } | BlockingStrategy::Anywhere { cache, .. } => {
                cache
            }
        };
        if let Some(cache) = cache.as_mut() {
            cache.add_graph(graph);
        }
    }
}
