//! 完備化グラフ - ノードアリーナ・ラベル・辺・マージ・取り消しログ

use mimizuku_model::{AtomicConcept, Concept, Individual, Role};
use std::collections::{HashMap, HashSet};

/// Index into the node arena. Ids are assigned in creation order, so
/// comparing ids compares node ages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Blocking state of a node, recomputed before each round of existential
/// expansion. Statuses are never trailed: they are derived data and any
/// rewind is followed by a fresh recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockingStatus {
    #[default]
    Unblocked,
    /// Blocked by a specific node, or by a cached signature from an
    /// earlier completed graph (no witness node in this graph).
    DirectlyBlocked(Option<NodeId>),
    /// Some ancestor is directly blocked.
    IndirectlyBlocked,
}

impl BlockingStatus {
    pub fn is_blocked(self) -> bool {
        !matches!(self, BlockingStatus::Unblocked)
    }
}

#[derive(Debug)]
pub struct Node {
    individual: Option<Individual>,
    parent: Option<NodeId>,
    labels: HashSet<Concept>,
    /// Role-labelled links to neighbour nodes, keyed by the neighbour.
    /// An edge u -r-> v is recorded as r in u's entry for v and as the
    /// inverse of r in v's entry for u, so each node sees every incident
    /// edge in its own outgoing direction.
    neighbours: HashMap<NodeId, HashSet<Role>>,
    merged_into: Option<NodeId>,
    blocking: BlockingStatus,
}

impl Node {
    pub fn individual(&self) -> Option<&Individual> {
        self.individual.as_ref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn labels(&self) -> &HashSet<Concept> {
        &self.labels
    }

    pub fn is_merged(&self) -> bool {
        self.merged_into.is_some()
    }

    pub fn blocking(&self) -> BlockingStatus {
        self.blocking
    }

    /// Tree nodes are the anonymous children introduced by existential
    /// expansion; only they are ever blocked.
    pub fn is_tree_node(&self) -> bool {
        self.parent.is_some() && self.individual.is_none()
    }
}

/// One reversible mutation. Entries are appended in application order
/// and undone in reverse, so an entry may reference nodes created by
/// earlier entries only.
#[derive(Debug, Clone)]
enum TrailEntry {
    NodeCreated(NodeId),
    LabelAdded(NodeId, Concept),
    EdgeAdded(NodeId, Role, NodeId),
    Merged(NodeId),
    InequalityAdded(NodeId, NodeId),
}

/// The tableau's working structure: an arena of nodes with concept
/// labels, role-labelled edges, an inequality relation, and a trail of
/// undoable mutations. A checkpoint is just a trail length; rewinding
/// truncates the trail and reverses everything after the mark.
#[derive(Debug, Default)]
pub struct CompletionGraph {
    nodes: Vec<Node>,
    node_by_individual: HashMap<Individual, NodeId>,
    inequalities: HashSet<(NodeId, NodeId)>,
    trail: Vec<TrailEntry>,
    clash: bool,
}

impl CompletionGraph {
    pub fn new() -> Self {
        CompletionGraph::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Follows merge links to the surviving representative.
    pub fn canonical(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(next) = self.nodes[current.index()].merged_into {
            current = next;
        }
        current
    }

    /// Live canonical node ids in creation order.
    pub fn live_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len() as u32)
            .map(NodeId)
            .filter(|id| !self.nodes[id.index()].is_merged())
            .collect()
    }

    pub fn is_clashed(&self) -> bool {
        self.clash
    }

    pub fn set_clash(&mut self) {
        self.clash = true;
    }

    pub fn checkpoint(&self) -> usize {
        self.trail.len()
    }

    pub fn create_node(&mut self, individual: Option<Individual>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            individual,
            parent,
            labels: HashSet::new(),
            neighbours: HashMap::new(),
            merged_into: None,
            blocking: BlockingStatus::Unblocked,
        });
        if let Some(ind) = individual {
            self.node_by_individual.insert(ind, id);
        }
        self.trail.push(TrailEntry::NodeCreated(id));
        id
    }

    /// The canonical node representing `individual`, if one exists.
    pub fn node_for(&self, individual: &Individual) -> Option<NodeId> {
        self.node_by_individual
            .get(individual)
            .map(|&id| self.canonical(id))
    }

    /// Adds `concept` to the node's label, detecting literal-level
    /// clashes. Returns true when the label actually changed.
    pub fn add_label(&mut self, id: NodeId, concept: Concept) -> bool {
        let id = self.canonical(id);
        if self.nodes[id.index()].labels.contains(&concept) {
            return false;
        }
        self.check_label_clash(id, &concept);
        self.nodes[id.index()].labels.insert(concept.clone());
        self.trail.push(TrailEntry::LabelAdded(id, concept));
        true
    }

    pub fn has_label(&self, id: NodeId, concept: &Concept) -> bool {
        self.nodes[self.canonical(id).index()].labels.contains(concept)
    }

    fn check_label_clash(&mut self, id: NodeId, concept: &Concept) {
        let clash = match concept {
            Concept::Nothing => true,
            Concept::Atomic(a) => {
                *a == AtomicConcept::nothing()
                    || self.nodes[id.index()].labels.contains(&Concept::Complement(*a))
            }
            Concept::Complement(a) => {
                *a == AtomicConcept::thing()
                    || self.nodes[id.index()].labels.contains(&Concept::Atomic(*a))
            }
            Concept::InRange(r) => self.nodes[id.index()].labels.contains(&Concept::NotInRange(*r)),
            Concept::NotInRange(r) => self.nodes[id.index()].labels.contains(&Concept::InRange(*r)),
            _ => false,
        };
        if clash {
            self.clash = true;
        }
    }

    /// Adds a role edge between two nodes, recording the inverse
    /// direction on the target. Returns true when the edge is new.
    pub fn add_edge(&mut self, from: NodeId, role: Role, to: NodeId) -> bool {
        let from = self.canonical(from);
        let to = self.canonical(to);
        if self.has_edge(from, &role, to) {
            return false;
        }
        self.nodes[from.index()]
            .neighbours
            .entry(to)
            .or_default()
            .insert(role);
        self.nodes[to.index()]
            .neighbours
            .entry(from)
            .or_default()
            .insert(role.inverse());
        self.trail.push(TrailEntry::EdgeAdded(from, role, to));
        true
    }

    pub fn has_edge(&self, from: NodeId, role: &Role, to: NodeId) -> bool {
        let from = self.canonical(from);
        let to = self.canonical(to);
        self.nodes[from.index()].neighbours.iter().any(|(&nbr, roles)| {
            self.canonical(nbr) == to && roles.contains(role)
        })
    }

    /// Canonical neighbours reachable from `from` over `role`, deduplicated.
    pub fn neighbours(&self, from: NodeId, role: &Role) -> Vec<NodeId> {
        let from = self.canonical(from);
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for (&nbr, roles) in &self.nodes[from.index()].neighbours {
            if roles.contains(role) {
                let target = self.canonical(nbr);
                if seen.insert(target) {
                    result.push(target);
                }
            }
        }
        result.sort();
        result
    }

    /// Roles labelling the edge from `from` to `to`.
    pub fn edge_roles(&self, from: NodeId, to: NodeId) -> HashSet<Role> {
        let from = self.canonical(from);
        let to = self.canonical(to);
        let mut roles = HashSet::new();
        for (&nbr, edge_roles) in &self.nodes[from.index()].neighbours {
            if self.canonical(nbr) == to {
                roles.extend(edge_roles.iter().copied());
            }
        }
        roles
    }

    /// Asserts that two nodes denote distinct elements. A clash arises
    /// when they are already the same node.
    pub fn assert_distinct(&mut self, a: NodeId, b: NodeId) -> bool {
        let a = self.canonical(a);
        let b = self.canonical(b);
        if a == b {
            self.clash = true;
            return false;
        }
        let pair = if a < b { (a, b) } else { (b, a) };
        if !self.inequalities.insert(pair) {
            return false;
        }
        self.trail.push(TrailEntry::InequalityAdded(pair.0, pair.1));
        true
    }

    pub fn are_distinct(&self, a: NodeId, b: NodeId) -> bool {
        let a = self.canonical(a);
        let b = self.canonical(b);
        self.inequalities.iter().any(|&(p, q)| {
            let p = self.canonical(p);
            let q = self.canonical(q);
            (p == a && q == b) || (p == b && q == a)
        })
    }

    /// Merges `from` into `into`: unions labels and edges onto `into`
    /// and redirects `from` through a merge link. Merging two nodes
    /// asserted distinct raises a clash. Returns true when a merge
    /// actually happened.
    pub fn merge(&mut self, from: NodeId, into: NodeId) -> bool {
        let from = self.canonical(from);
        let into = self.canonical(into);
        if from == into {
            return false;
        }
        if self.are_distinct(from, into) {
            self.clash = true;
            return false;
        }
        let labels: Vec<Concept> = self.nodes[from.index()].labels.iter().cloned().collect();
        let edges: Vec<(NodeId, Role)> = self.nodes[from.index()]
            .neighbours
            .iter()
            .flat_map(|(&nbr, roles)| roles.iter().map(move |&r| (nbr, r)))
            .collect();
        self.nodes[from.index()].merged_into = Some(into);
        self.trail.push(TrailEntry::Merged(from));
        for label in labels {
            self.add_label(into, label);
        }
        for (nbr, role) in edges {
            // canonical(nbr) maps self-loops on `from` onto `into`
            self.add_edge(into, role, nbr);
        }
        // A pre-existing inequality may now relate two merged nodes.
        let violated = self.inequalities.iter().any(|&(p, q)| self.canonical(p) == self.canonical(q));
        if violated {
            self.clash = true;
        }
        true
    }

    pub fn set_blocking(&mut self, id: NodeId, status: BlockingStatus) {
        self.nodes[id.index()].blocking = status;
    }

    /// Rewinds to a checkpoint, reversing every mutation after it and
    /// clearing the clash flag.
    pub fn rewind(&mut self, mark: usize) {
        while self.trail.len() > mark {
            match self.trail.pop() {
                Some(TrailEntry::NodeCreated(id)) => {
                    let node = self.nodes.pop();
                    debug_assert_eq!(id.index(), self.nodes.len());
                    if let Some(node) = node {
                        if let Some(ind) = node.individual {
                            self.node_by_individual.remove(&ind);
                        }
                    }
                }
                Some(TrailEntry::LabelAdded(id, concept)) => {
                    self.nodes[id.index()].labels.remove(&concept);
                }
                Some(TrailEntry::EdgeAdded(from, role, to)) => {
                    Self::remove_edge_half(&mut self.nodes[from.index()], to, role);
                    Self::remove_edge_half(&mut self.nodes[to.index()], from, role.inverse());
                }
                Some(TrailEntry::Merged(id)) => {
                    self.nodes[id.index()].merged_into = None;
                }
                Some(TrailEntry::InequalityAdded(a, b)) => {
                    self.inequalities.remove(&(a, b));
                }
                None => break,
            }
        }
        self.clash = false;
    }

    fn remove_edge_half(node: &mut Node, neighbour: NodeId, role: Role) {
        if let Some(roles) = node.neighbours.get_mut(&neighbour) {
            roles.remove(&role);
            if roles.is_empty() {
                node.neighbours.remove(&neighbour);
            }
        }
    }
}
