//! ハイパータブロー飽和エンジン - 規則適用・分岐・バックトラック

use crate::blocking::BlockingStrategy;
use crate::existentials::ExistentialStrategy;
use crate::graph::{CompletionGraph, NodeId};
use crate::monitor::TableauMonitor;
use mimizuku_model::{
    Atom, AtomicConcept, Concept, DlClause, DlOntology, Individual, Role, Term, Variable,
};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

type Bindings = HashMap<Variable, NodeId>;

/// One way to continue after a nondeterministic choice.
#[derive(Debug, Clone)]
enum Alternative {
    /// Add a concept to a node's label (disjunction and choose-rule).
    Label(NodeId, Concept),
    /// Merge the first node into the second (at-most rule).
    Merge(NodeId, NodeId),
    /// Assert the atoms of one head disjunct under fixed bindings.
    HeadDisjunct { atoms: Vec<Atom>, bindings: Bindings },
}

/// A point the search can return to: a trail mark plus the untried
/// alternatives of the choice made there.
#[derive(Debug)]
struct BranchPoint {
    mark: usize,
    alternatives: Vec<Alternative>,
    next: usize,
}

enum Resolved {
    Node(NodeId),
    Unbound(Variable),
    /// An individual constant with no node in the graph.
    Missing,
}

/// The saturation engine. Holds the base assertions of one knowledge
/// base; `is_satisfiable` layers query atoms on top, saturates, and
/// rewinds, so the base graph is shared across any number of queries.
pub struct Tableau {
    clauses: Vec<DlClause>,
    negative_role_facts: Vec<(Role, Individual, Individual)>,
    graph: CompletionGraph,
    blocking: BlockingStrategy,
    strategy: ExistentialStrategy,
    monitor: Option<Box<dyn TableauMonitor>>,
    branch_points: Vec<BranchPoint>,
    /// The base facts themselves clash; every query is unsatisfiable
    /// and the rewound clash flag must not hide it.
    base_clash: bool,
}

impl Tableau {
    /// Builds the engine and asserts the ontology's ground facts as the
    /// permanent base of the completion graph.
    pub fn new(
        ontology: &DlOntology,
        blocking: BlockingStrategy,
        strategy: ExistentialStrategy,
        monitor: Option<Box<dyn TableauMonitor>>,
    ) -> Self {
        let mut tableau = Tableau {
            clauses: ontology.dl_clauses.clone(),
            negative_role_facts: Vec::new(),
            graph: CompletionGraph::new(),
            blocking,
            strategy,
            monitor,
            branch_points: Vec::new(),
            base_clash: false,
        };
        for individual in &ontology.individuals {
            tableau.node_for_individual(individual);
        }
        let empty = Bindings::new();
        for fact in &ontology.positive_facts {
            tableau.assert_atom(fact, &empty);
        }
        let negatives: Vec<Atom> = ontology.negative_facts.clone();
        for fact in &negatives {
            tableau.assert_negative_fact(fact);
        }
        tableau.base_clash = tableau.graph.is_clashed();
        tableau
    }

    pub fn graph(&self) -> &CompletionGraph {
        &self.graph
    }

    /// Appends internally generated clauses and facts to the base. The
    /// additions are permanent and survive query rewinds.
    pub fn extend_with_definitions(
        &mut self,
        clauses: Vec<DlClause>,
        positive_facts: Vec<Atom>,
        negative_facts: Vec<Atom>,
    ) {
        self.clauses.extend(clauses);
        let empty = Bindings::new();
        for fact in &positive_facts {
            self.assert_atom(fact, &empty);
        }
        for fact in &negative_facts {
            self.assert_negative_fact(fact);
        }
        self.base_clash = self.base_clash || self.graph.is_clashed();
    }

    pub fn is_abox_satisfiable(&mut self) -> bool {
        self.is_satisfiable(&[])
    }

    /// Checks whether the base together with the extra ground atoms is
    /// satisfiable. The graph is rewound to the base state afterwards.
    pub fn is_satisfiable(&mut self, extra: &[Atom]) -> bool {
        self.monitor_event(|m| m.satisfiability_started());
        trace!(extra = extra.len(), "satisfiability check started");
        if self.base_clash {
            self.monitor_event(|m| m.satisfiability_finished(false));
            return false;
        }
        let mark = self.graph.checkpoint();
        self.branch_points.clear();
        self.strategy.reset();
        let empty = Bindings::new();
        for atom in extra {
            self.assert_atom(atom, &empty);
        }
        let satisfiable = self.saturate();
        if satisfiable {
            self.blocking.graph_completed(&self.graph);
        }
        self.graph.rewind(mark);
        self.branch_points.clear();
        debug!(satisfiable, "satisfiability check finished");
        self.monitor_event(|m| m.satisfiability_finished(satisfiable));
        satisfiable
    }

    /// Runs rule applications to the fixpoint, backtracking over the
    /// recorded branch points on clashes. Returns true when a clash-free
    /// fully expanded graph is reached.
    fn saturate(&mut self) -> bool {
        loop {
            if self.graph.is_clashed() {
                self.monitor_event(|m| m.clash_detected());
                if !self.backtrack() {
                    return false;
                }
                continue;
            }
            if self.apply_deterministic() {
                continue;
            }
            if self.apply_clauses() {
                continue;
            }
            if self.apply_disjunctions() {
                continue;
            }
            if self.apply_choose() {
                continue;
            }
            if self.apply_at_most() {
                continue;
            }
            if self.apply_existentials() {
                continue;
            }
            return true;
        }
    }

    // --- nondeterminism ---------------------------------------------------

    fn branch(&mut self, mut alternatives: Vec<Alternative>) {
        debug_assert!(!alternatives.is_empty());
        let first = alternatives.remove(0);
        let mark = self.graph.checkpoint();
        self.branch_points.push(BranchPoint {
            mark,
            alternatives,
            next: 0,
        });
        let level = self.branch_points.len();
        self.monitor_event(|m| m.branch_point_pushed(level));
        self.apply_alternative(first);
    }

    /// Rewinds to the innermost branch point with an untried alternative
    /// and applies it. Returns false when the search space is exhausted.
    fn backtrack(&mut self) -> bool {
        loop {
            let Some(point) = self.branch_points.last_mut() else {
                return false;
            };
            if point.next >= point.alternatives.len() {
                self.branch_points.pop();
                continue;
            }
            let alternative = point.alternatives[point.next].clone();
            point.next += 1;
            let mark = point.mark;
            self.graph.rewind(mark);
            let level = self.branch_points.len();
            self.monitor_event(|m| m.backtrack_performed(level));
            self.apply_alternative(alternative);
            return true;
        }
    }

    fn apply_alternative(&mut self, alternative: Alternative) {
        match alternative {
            Alternative::Label(node, concept) => {
                self.graph.add_label(node, concept);
            }
            Alternative::Merge(from, into) => {
                self.graph.merge(from, into);
            }
            Alternative::HeadDisjunct { atoms, bindings } => {
                for atom in &atoms {
                    self.assert_atom(atom, &bindings);
                    if self.graph.is_clashed() {
                        break;
                    }
                }
            }
        }
    }

    // --- deterministic rules ----------------------------------------------

    /// ⊓-decomposition, ∀-propagation, nominal merging, and negative
    /// role fact checking. Returns true when anything changed.
    fn apply_deterministic(&mut self) -> bool {
        let mut changed = false;
        for id in self.graph.live_nodes() {
            let labels: Vec<Concept> = self.graph.node(id).labels().iter().cloned().collect();
            for concept in labels {
                match concept {
                    Concept::And(conjuncts) => {
                        for conjunct in conjuncts {
                            changed |= self.graph.add_label(id, conjunct);
                        }
                    }
                    Concept::AllValuesFrom { role, concept } => {
                        for neighbour in self.graph.neighbours(id, &role) {
                            changed |= self.graph.add_label(neighbour, (*concept).clone());
                        }
                    }
                    Concept::Nominal(individual) => {
                        let target = self.node_for_individual(&individual);
                        if self.graph.canonical(id) != self.graph.canonical(target) {
                            changed |= self.graph.merge(id, target);
                        }
                    }
                    _ => {}
                }
                if self.graph.is_clashed() {
                    return true;
                }
            }
        }
        for (role, from, to) in &self.negative_role_facts {
            if let (Some(f), Some(t)) = (self.graph.node_for(from), self.graph.node_for(to)) {
                if self.graph.has_edge(f, role, t) {
                    self.graph.set_clash();
                    return true;
                }
            }
        }
        changed
    }

    // --- DL-clause firing -------------------------------------------------

    /// Hyperresolution step: for every clause and every binding of its
    /// body, make some head disjunct true. Single-disjunct heads are
    /// asserted directly; multi-disjunct heads open a branch point; an
    /// empty head is an immediate clash.
    fn apply_clauses(&mut self) -> bool {
        let mut changed = false;
        for index in 0..self.clauses.len() {
            let clause = self.clauses[index].clone();
            let matches = self.match_body(&clause.body);
            for bindings in matches {
                if self.graph.is_clashed() {
                    return true;
                }
                if clause.head.is_empty() {
                    trace!(clause = %clause, "empty head fired");
                    self.graph.set_clash();
                    return true;
                }
                let satisfied = clause
                    .head
                    .iter()
                    .any(|disjunct| disjunct.iter().all(|atom| self.atom_holds(atom, &bindings)));
                if satisfied {
                    continue;
                }
                if clause.head.len() == 1 {
                    for atom in &clause.head[0] {
                        changed |= self.assert_atom(atom, &bindings);
                        if self.graph.is_clashed() {
                            return true;
                        }
                    }
                } else {
                    let alternatives = clause
                        .head
                        .iter()
                        .map(|disjunct| Alternative::HeadDisjunct {
                            atoms: disjunct.clone(),
                            bindings: bindings.clone(),
                        })
                        .collect();
                    self.branch(alternatives);
                    return true;
                }
            }
        }
        changed
    }

    fn match_body(&self, atoms: &[Atom]) -> Vec<Bindings> {
        let mut results = Vec::new();
        let mut bindings = Bindings::new();
        self.match_rest(atoms, &mut bindings, &mut results);
        results
    }

    fn match_rest(&self, atoms: &[Atom], bindings: &mut Bindings, out: &mut Vec<Bindings>) {
        let Some((atom, rest)) = atoms.split_first() else {
            out.push(bindings.clone());
            return;
        };
        match atom {
            Atom::Concept { concept, term } => match self.resolve(term, bindings) {
                Resolved::Node(node) => {
                    if Self::is_universal_concept(concept) || self.graph.has_label(node, concept) {
                        self.match_rest(rest, bindings, out);
                    }
                }
                Resolved::Unbound(var) => {
                    for node in self.graph.live_nodes() {
                        if Self::is_universal_concept(concept)
                            || self.graph.has_label(node, concept)
                        {
                            bindings.insert(var, node);
                            self.match_rest(rest, bindings, out);
                            bindings.remove(&var);
                        }
                    }
                }
                Resolved::Missing => {}
            },
            Atom::Role { role, from, to } => {
                let role = Role::Atomic(*role);
                match (self.resolve(from, bindings), self.resolve(to, bindings)) {
                    (Resolved::Node(f), Resolved::Node(t)) => {
                        if self.graph.has_edge(f, &role, t) {
                            self.match_rest(rest, bindings, out);
                        }
                    }
                    (Resolved::Node(f), Resolved::Unbound(var)) => {
                        for t in self.graph.neighbours(f, &role) {
                            bindings.insert(var, t);
                            self.match_rest(rest, bindings, out);
                            bindings.remove(&var);
                        }
                    }
                    (Resolved::Unbound(var), Resolved::Node(t)) => {
                        for f in self.graph.neighbours(t, &role.inverse()) {
                            bindings.insert(var, f);
                            self.match_rest(rest, bindings, out);
                            bindings.remove(&var);
                        }
                    }
                    (Resolved::Unbound(u), Resolved::Unbound(v)) if u == v => {
                        for node in self.graph.live_nodes() {
                            if self.graph.has_edge(node, &role, node) {
                                bindings.insert(u, node);
                                self.match_rest(rest, bindings, out);
                                bindings.remove(&u);
                            }
                        }
                    }
                    (Resolved::Unbound(u), Resolved::Unbound(v)) => {
                        for f in self.graph.live_nodes() {
                            for t in self.graph.neighbours(f, &role) {
                                bindings.insert(u, f);
                                bindings.insert(v, t);
                                self.match_rest(rest, bindings, out);
                                bindings.remove(&v);
                                bindings.remove(&u);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Atom::Equal(s, t) => {
                if let (Resolved::Node(a), Resolved::Node(b)) =
                    (self.resolve(s, bindings), self.resolve(t, bindings))
                {
                    if self.graph.canonical(a) == self.graph.canonical(b) {
                        self.match_rest(rest, bindings, out);
                    }
                }
            }
            Atom::NotEqual(s, t) => {
                if let (Resolved::Node(a), Resolved::Node(b)) =
                    (self.resolve(s, bindings), self.resolve(t, bindings))
                {
                    if self.graph.are_distinct(a, b) {
                        self.match_rest(rest, bindings, out);
                    }
                }
            }
            Atom::InRange { range, term } => {
                if let Resolved::Node(node) = self.resolve(term, bindings) {
                    if self.graph.has_label(node, &Concept::InRange(*range)) {
                        self.match_rest(rest, bindings, out);
                    }
                }
            }
            Atom::NotInRange { range, term } => {
                if let Resolved::Node(node) = self.resolve(term, bindings) {
                    if self.graph.has_label(node, &Concept::NotInRange(*range)) {
                        self.match_rest(rest, bindings, out);
                    }
                }
            }
        }
    }

    /// ⊤ holds at every node without being recorded in any label set.
    fn is_universal_concept(concept: &Concept) -> bool {
        matches!(concept, Concept::Thing)
            || *concept == Concept::Atomic(AtomicConcept::thing())
    }

    fn resolve(&self, term: &Term, bindings: &Bindings) -> Resolved {
        match term {
            Term::Variable(var) => match bindings.get(var) {
                Some(&node) => Resolved::Node(self.graph.canonical(node)),
                None => Resolved::Unbound(*var),
            },
            Term::Individual(individual) => match self.graph.node_for(individual) {
                Some(node) => Resolved::Node(node),
                None => Resolved::Missing,
            },
        }
    }

    fn atom_holds(&self, atom: &Atom, bindings: &Bindings) -> bool {
        match atom {
            Atom::Concept { concept, term } => match self.resolve(term, bindings) {
                Resolved::Node(node) => {
                    Self::is_universal_concept(concept) || self.graph.has_label(node, concept)
                }
                _ => false,
            },
            Atom::Role { role, from, to } => {
                match (self.resolve(from, bindings), self.resolve(to, bindings)) {
                    (Resolved::Node(f), Resolved::Node(t)) => {
                        self.graph.has_edge(f, &Role::Atomic(*role), t)
                    }
                    _ => false,
                }
            }
            Atom::Equal(s, t) => match (self.resolve(s, bindings), self.resolve(t, bindings)) {
                (Resolved::Node(a), Resolved::Node(b)) => {
                    self.graph.canonical(a) == self.graph.canonical(b)
                }
                _ => false,
            },
            Atom::NotEqual(s, t) => match (self.resolve(s, bindings), self.resolve(t, bindings)) {
                (Resolved::Node(a), Resolved::Node(b)) => self.graph.are_distinct(a, b),
                _ => false,
            },
            Atom::InRange { range, term } => match self.resolve(term, bindings) {
                Resolved::Node(node) => self.graph.has_label(node, &Concept::InRange(*range)),
                _ => false,
            },
            Atom::NotInRange { range, term } => match self.resolve(term, bindings) {
                Resolved::Node(node) => self.graph.has_label(node, &Concept::NotInRange(*range)),
                _ => false,
            },
        }
    }

    /// Makes a ground or bound atom true in the graph, creating nodes
    /// for individual constants on demand (fresh head constants become
    /// root nodes the first time a clause derives them). Returns true
    /// when the graph changed.
    fn assert_atom(&mut self, atom: &Atom, bindings: &Bindings) -> bool {
        match atom {
            Atom::Concept { concept, term } => match self.node_for_term(term, bindings) {
                Some(node) => self.graph.add_label(node, concept.clone()),
                None => false,
            },
            Atom::Role { role, from, to } => {
                match (
                    self.node_for_term(from, bindings),
                    self.node_for_term(to, bindings),
                ) {
                    (Some(f), Some(t)) => self.graph.add_edge(f, Role::Atomic(*role), t),
                    _ => false,
                }
            }
            Atom::Equal(s, t) => {
                match (
                    self.node_for_term(s, bindings),
                    self.node_for_term(t, bindings),
                ) {
                    (Some(a), Some(b)) => {
                        let a = self.graph.canonical(a);
                        let b = self.graph.canonical(b);
                        // keep the older node as the representative
                        if a < b {
                            self.graph.merge(b, a)
                        } else {
                            self.graph.merge(a, b)
                        }
                    }
                    _ => false,
                }
            }
            Atom::NotEqual(s, t) => {
                match (
                    self.node_for_term(s, bindings),
                    self.node_for_term(t, bindings),
                ) {
                    (Some(a), Some(b)) => self.graph.assert_distinct(a, b),
                    _ => false,
                }
            }
            Atom::InRange { range, term } => match self.node_for_term(term, bindings) {
                Some(node) => self.graph.add_label(node, Concept::InRange(*range)),
                None => false,
            },
            Atom::NotInRange { range, term } => match self.node_for_term(term, bindings) {
                Some(node) => self.graph.add_label(node, Concept::NotInRange(*range)),
                None => false,
            },
        }
    }

    fn assert_negative_fact(&mut self, fact: &Atom) {
        let empty = Bindings::new();
        match fact {
            Atom::Concept { concept, term } => match concept.negation() {
                Some(negated) => {
                    self.assert_atom(&Atom::Concept { concept: negated, term: *term }, &empty);
                }
                None => {
                    warn!(fact = %fact, "negative fact with a non-literal concept ignored");
                }
            },
            Atom::Role { role, from, to } => {
                match (from, to) {
                    (Term::Individual(f), Term::Individual(t)) => {
                        self.node_for_individual(f);
                        self.node_for_individual(t);
                        self.negative_role_facts.push((Role::Atomic(*role), *f, *t));
                    }
                    _ => warn!(fact = %fact, "non-ground negative role fact ignored"),
                }
            }
            Atom::Equal(s, t) => {
                self.assert_atom(&Atom::NotEqual(*s, *t), &empty);
            }
            Atom::NotEqual(s, t) => {
                self.assert_atom(&Atom::Equal(*s, *t), &empty);
            }
            Atom::InRange { range, term } => {
                self.assert_atom(&Atom::NotInRange { range: *range, term: *term }, &empty);
            }
            Atom::NotInRange { range, term } => {
                self.assert_atom(&Atom::InRange { range: *range, term: *term }, &empty);
            }
        }
    }

    fn node_for_term(&mut self, term: &Term, bindings: &Bindings) -> Option<NodeId> {
        match term {
            Term::Variable(var) => bindings.get(var).map(|&node| self.graph.canonical(node)),
            Term::Individual(individual) => Some(self.node_for_individual(individual)),
        }
    }

    fn node_for_individual(&mut self, individual: &Individual) -> NodeId {
        if let Some(node) = self.graph.node_for(individual) {
            return node;
        }
        let node = self.graph.create_node(Some(*individual), None);
        self.monitor_event(|m| m.node_created(node));
        node
    }

    // --- disjunctions -----------------------------------------------------

    /// ⊔-rule: for a disjunction label with no disjunct present, pick
    /// one that is not already falsified. Returns true when a choice or
    /// clash was made.
    fn apply_disjunctions(&mut self) -> bool {
        for id in self.graph.live_nodes() {
            let labels: Vec<Concept> = self.graph.node(id).labels().iter().cloned().collect();
            for concept in labels {
                let Concept::Or(disjuncts) = concept else {
                    continue;
                };
                if disjuncts.iter().any(|d| self.graph.has_label(id, d)) {
                    continue;
                }
                let open: Vec<Concept> = disjuncts
                    .iter()
                    .filter(|d| match d.negation() {
                        Some(negated) => !self.graph.has_label(id, &negated),
                        None => true,
                    })
                    .cloned()
                    .collect();
                match open.len() {
                    0 => self.graph.set_clash(),
                    1 => {
                        let only = open.into_iter().next().unwrap_or(Concept::Nothing);
                        self.graph.add_label(id, only);
                    }
                    _ => {
                        let alternatives = open
                            .into_iter()
                            .map(|d| Alternative::Label(id, d))
                            .collect();
                        self.branch(alternatives);
                    }
                }
                return true;
            }
        }
        false
    }

    // --- at-most restrictions ---------------------------------------------

    /// Choose-rule: under a ≤n R.C label, every R-neighbour must commit
    /// to C or to its negation before counting.
    fn apply_choose(&mut self) -> bool {
        for id in self.graph.live_nodes() {
            let labels: Vec<Concept> = self.graph.node(id).labels().iter().cloned().collect();
            for concept in labels {
                let Concept::AtMost { role, concept: filler, .. } = concept else {
                    continue;
                };
                let Some(negated) = filler.negation() else {
                    continue;
                };
                if matches!(*filler, Concept::Thing) {
                    continue;
                }
                for neighbour in self.graph.neighbours(id, &role) {
                    if !self.graph.has_label(neighbour, &filler)
                        && !self.graph.has_label(neighbour, &negated)
                    {
                        self.branch(vec![
                            Alternative::Label(neighbour, (*filler).clone()),
                            Alternative::Label(neighbour, negated),
                        ]);
                        return true;
                    }
                }
            }
        }
        false
    }

    /// ≤-rule: when a node has more qualifying R-neighbours than a ≤n
    /// label allows, nondeterministically merge a non-distinct pair; if
    /// all pairs are asserted distinct, clash.
    fn apply_at_most(&mut self) -> bool {
        for id in self.graph.live_nodes() {
            let labels: Vec<Concept> = self.graph.node(id).labels().iter().cloned().collect();
            for concept in labels {
                let Concept::AtMost { cardinality, role, concept: filler } = concept else {
                    continue;
                };
                let members: Vec<NodeId> = self
                    .graph
                    .neighbours(id, &role)
                    .into_iter()
                    .filter(|&n| {
                        matches!(*filler, Concept::Thing) || self.graph.has_label(n, &filler)
                    })
                    .collect();
                if members.len() as u32 <= cardinality {
                    continue;
                }
                let mut alternatives = Vec::new();
                for i in 0..members.len() {
                    for j in (i + 1)..members.len() {
                        if !self.graph.are_distinct(members[i], members[j]) {
                            // merge the younger node into the older one
                            alternatives.push(Alternative::Merge(members[j], members[i]));
                        }
                    }
                }
                match alternatives.len() {
                    0 => self.graph.set_clash(),
                    1 => {
                        if let Some(alternative) = alternatives.into_iter().next() {
                            self.apply_alternative(alternative);
                        }
                    }
                    _ => self.branch(alternatives),
                }
                return true;
            }
        }
        false
    }

    // --- existential restrictions -----------------------------------------

    /// Recomputes blocking, then expands one pending ∃/≥ label on the
    /// node chosen by the existential strategy. Blocked nodes are never
    /// expanded. Returns false when no existential is pending, which
    /// makes the graph fully expanded.
    fn apply_existentials(&mut self) -> bool {
        self.blocking.compute(&mut self.graph);
        let mut pending = Vec::new();
        for id in self.graph.live_nodes() {
            if self.graph.node(id).blocking().is_blocked() {
                continue;
            }
            if self.first_unsatisfied_existential(id).is_some() {
                pending.push(id);
            }
        }
        let Some(node) = self.strategy.select(&pending) else {
            return false;
        };
        let Some(concept) = self.first_unsatisfied_existential(node) else {
            return false;
        };
        match concept {
            Concept::SomeValuesFrom { role, concept: filler } => {
                let witness = self.strategy.witness(&mut self.graph, node, &filler);
                self.monitor_event(|m| m.node_created(witness));
                self.graph.add_edge(node, role, witness);
                self.graph.add_label(witness, (*filler).clone());
            }
            Concept::AtLeast { cardinality, role, concept: filler } => {
                let mut created: Vec<NodeId> = Vec::new();
                for _ in 0..cardinality {
                    let child = self.graph.create_node(None, Some(node));
                    self.monitor_event(|m| m.node_created(child));
                    self.graph.add_edge(node, role, child);
                    self.graph.add_label(child, (*filler).clone());
                    for &sibling in &created {
                        self.graph.assert_distinct(child, sibling);
                    }
                    created.push(child);
                }
            }
            _ => {}
        }
        true
    }

    fn first_unsatisfied_existential(&self, id: NodeId) -> Option<Concept> {
        let mut labels: Vec<&Concept> = self.graph.node(id).labels().iter().collect();
        labels.sort();
        for concept in labels {
            match concept {
                Concept::SomeValuesFrom { role, concept: filler } => {
                    let satisfied = self.graph.neighbours(id, role).into_iter().any(|n| {
                        matches!(**filler, Concept::Thing) || self.graph.has_label(n, filler)
                    });
                    if !satisfied {
                        return Some(concept.clone());
                    }
                }
                Concept::AtLeast { cardinality, role, concept: filler } => {
                    let count = self
                        .graph
                        .neighbours(id, role)
                        .into_iter()
                        .filter(|&n| {
                            matches!(**filler, Concept::Thing) || self.graph.has_label(n, filler)
                        })
                        .count();
                    if (count as u32) < *cardinality {
                        return Some(concept.clone());
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn monitor_event(&mut self, event: impl FnOnce(&mut dyn TableauMonitor)) {
        if let Some(monitor) = self.monitor.as_mut() {
            event(monitor.as_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocking::{BlockingStrategy, DirectBlockingChecker};
    use mimizuku_model::{AtomicRole, DlOntology};

    fn engine(ontology: &DlOntology) -> Tableau {
        Tableau::new(
            ontology,
            BlockingStrategy::Anywhere {
                checker: DirectBlockingChecker::Pairwise,
                cache: None,
            },
            ExistentialStrategy::CreationOrder,
            None,
        )
    }

    fn subsumption(sub: &str, sup: &str) -> DlClause {
        DlClause::new(
            vec![Atom::concept(Concept::atomic(sub), Term::var("x"))],
            vec![vec![Atom::concept(Concept::atomic(sup), Term::var("x"))]],
        )
    }

    fn unsatisfiable(name: &str) -> DlClause {
        DlClause::new(
            vec![Atom::concept(Concept::atomic(name), Term::var("x"))],
            vec![],
        )
    }

    mod deterministic {
        use super::*;

        #[test]
        fn subsumption_propagates_to_instances() {
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(subsumption("ex:Penguin", "ex:Bird"));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:Penguin"),
                Term::individual("ex:tux"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            // tux cannot avoid being a bird
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:Bird"),
                Term::individual("ex:tux"),
            )]));
        }

        #[test]
        fn empty_head_makes_the_body_unsatisfiable() {
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(unsatisfiable("ex:Square"));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:Square"),
                Term::individual("ex:s"),
            ));
            let mut tableau = engine(&ontology);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn universal_restriction_propagates_over_edges() {
            let mut ontology = DlOntology::new();
            let parent_of = AtomicRole::create("ex:parentOf");
            ontology.add_positive_fact(Atom::concept(
                Concept::all(Role::Atomic(parent_of), Concept::atomic("ex:Happy")),
                Term::individual("ex:a"),
            ));
            ontology.add_positive_fact(Atom::role(
                parent_of,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:Happy"),
                Term::individual("ex:b"),
            )]));
        }

        #[test]
        fn top_bodied_clauses_fire_on_every_node() {
            // ⊤ ⊑ C constrains every element, named or anonymous
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::Thing, Term::var("x"))],
                vec![vec![Atom::concept(Concept::atomic("ex:C"), Term::var("x"))]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:D"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:a"),
            )]));
        }

        #[test]
        fn negative_role_fact_clashes_with_asserted_edge() {
            let mut ontology = DlOntology::new();
            let knows = AtomicRole::create("ex:knows");
            ontology.add_positive_fact(Atom::role(
                knows,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            ontology.add_negative_fact(Atom::role(
                knows,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            let mut tableau = engine(&ontology);
            assert!(!tableau.is_abox_satisfiable());
        }
    }

    mod branching {
        use super::*;

        #[test]
        fn disjunction_backtracks_over_dead_alternatives() {
            // A ⊑ B ⊔ C, B ⊑ ⊥: only the C alternative survives
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::atomic("ex:A"), Term::var("x"))],
                vec![
                    vec![Atom::concept(Concept::atomic("ex:B"), Term::var("x"))],
                    vec![Atom::concept(Concept::atomic("ex:C"), Term::var("x"))],
                ],
            ));
            ontology.add_dl_clause(unsatisfiable("ex:B"));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());

            // closing the C alternative as well exhausts the search
            let mut closed = ontology.clone();
            closed.add_dl_clause(unsatisfiable("ex:C"));
            let mut tableau = engine(&closed);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn lloyd_topor_heads_assert_all_conjuncts() {
            // A ⊑ (B ⊓ C) expressed as a conjunctive head disjunct
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::atomic("ex:A"), Term::var("x"))],
                vec![vec![
                    Atom::concept(Concept::atomic("ex:B"), Term::var("x")),
                    Atom::concept(Concept::atomic("ex:C"), Term::var("x")),
                ]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:B"),
                Term::individual("ex:a"),
            )]));
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:a"),
            )]));
        }

        #[test]
        fn clause_with_fresh_head_constant_derives_facts_about_it() {
            // B(x) → C(ex:fresh): firing materializes the constant once
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::atomic("ex:B"), Term::var("x"))],
                vec![vec![Atom::concept(
                    Concept::atomic("ex:C"),
                    Term::individual("ex:fresh"),
                )]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:B"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:fresh"),
            )]));
        }

        #[test]
        fn equality_head_atoms_merge_named_individuals() {
            // r(x,y) ∧ r(x,z) → y ≈ z makes r functional
            let mut ontology = DlOntology::new();
            let r = AtomicRole::create("ex:r");
            ontology.add_dl_clause(DlClause::new(
                vec![
                    Atom::role(r, Term::var("x"), Term::var("y")),
                    Atom::role(r, Term::var("x"), Term::var("z")),
                ],
                vec![vec![Atom::Equal(Term::var("y"), Term::var("z"))]],
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:c"),
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:C"),
                Term::individual("ex:b"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            // b and c were merged, so c carries C as well
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:c"),
            )]));

            let mut contradictory = ontology.clone();
            contradictory.add_positive_fact(Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&contradictory);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn inequality_head_atoms_block_merging() {
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![
                    Atom::concept(Concept::atomic("ex:C"), Term::var("x")),
                    Atom::concept(Concept::atomic("ex:D"), Term::var("y")),
                ],
                vec![vec![Atom::NotEqual(Term::var("x"), Term::var("y"))]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:C"),
                Term::individual("ex:b"),
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:D"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());

            let mut merged = ontology.clone();
            merged.add_positive_fact(Atom::Equal(
                Term::individual("ex:b"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&merged);
            assert!(!tableau.is_abox_satisfiable());
        }
    }

    mod cardinality {
        use super::*;

        #[test]
        fn at_most_merges_interchangeable_neighbours() {
            let mut ontology = DlOntology::new();
            let r = AtomicRole::create("ex:r");
            ontology.add_positive_fact(Atom::concept(
                Concept::at_most(1, Role::Atomic(r), Concept::Thing),
                Term::individual("ex:a"),
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());

            let mut distinct = ontology.clone();
            distinct.add_positive_fact(Atom::NotEqual(
                Term::individual("ex:b"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&distinct);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn choose_rule_commits_neighbours_before_counting() {
            // ≤1 r.C over two neighbours, one forced into C, one kept
            // open: satisfiable by choosing ¬C for the open one.
            let mut ontology = DlOntology::new();
            let r = AtomicRole::create("ex:r");
            ontology.add_positive_fact(Atom::concept(
                Concept::at_most(1, Role::Atomic(r), Concept::atomic("ex:C")),
                Term::individual("ex:a"),
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:b"),
            ));
            ontology.add_positive_fact(Atom::role(
                r,
                Term::individual("ex:a"),
                Term::individual("ex:c"),
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:C"),
                Term::individual("ex:b"),
            ));
            ontology.add_positive_fact(Atom::NotEqual(
                Term::individual("ex:b"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());

            // forcing the second neighbour into C closes every branch
            let mut forced = ontology.clone();
            forced.add_positive_fact(Atom::concept(
                Concept::atomic("ex:C"),
                Term::individual("ex:c"),
            ));
            let mut tableau = engine(&forced);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn at_least_requires_distinct_witnesses() {
            let mut ontology = DlOntology::new();
            let r = AtomicRole::create("ex:r");
            ontology.add_positive_fact(Atom::concept(
                Concept::at_least(2, Role::Atomic(r), Concept::Thing),
                Term::individual("ex:a"),
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::at_most(1, Role::Atomic(r), Concept::Thing),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(!tableau.is_abox_satisfiable());
        }
    }

    mod termination {
        use super::*;

        #[test]
        fn cyclic_existentials_terminate_under_blocking() {
            // Person ⊑ ∃hasParent.Person generates an infinite tree
            // without blocking.
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::atomic("ex:Person"), Term::var("x"))],
                vec![vec![Atom::concept(
                    Concept::some(Role::create("ex:hasParent"), Concept::atomic("ex:Person")),
                    Term::var("x"),
                )]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:Person"),
                Term::individual("ex:alice"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
        }

        #[test]
        fn queries_leave_the_base_graph_untouched() {
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(subsumption("ex:A", "ex:B"));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            let before = tableau.graph().len();
            let mark = tableau.graph().checkpoint();
            assert!(tableau.is_satisfiable(&[Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:anon-root"),
            )]));
            assert_eq!(tableau.graph().len(), before);
            assert_eq!(tableau.graph().checkpoint(), mark);
        }
    }

    mod definitions {
        use super::*;

        #[test]
        fn extended_definitions_survive_query_rewinds() {
            let mut ontology = DlOntology::new();
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            // before the definition, a can avoid being a B
            assert!(tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:B"),
                Term::individual("ex:a"),
            )]));

            tableau.extend_with_definitions(
                vec![subsumption("ex:A", "ex:B")],
                vec![Atom::concept(Concept::atomic("ex:A"), Term::individual("ex:b"))],
                vec![],
            );
            // the clause and the fact are part of the base now; query
            // rewinds must not peel them off
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:B"),
                Term::individual("ex:a"),
            )]));
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:B"),
                Term::individual("ex:b"),
            )]));
            assert!(tableau.is_abox_satisfiable());
        }

        #[test]
        fn extended_negative_facts_are_permanent() {
            let mut ontology = DlOntology::new();
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            tableau.extend_with_definitions(
                vec![],
                vec![],
                vec![Atom::concept(Concept::atomic("ex:B"), Term::individual("ex:a"))],
            );
            assert!(tableau.is_abox_satisfiable());
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::atomic("ex:B"),
                Term::individual("ex:a"),
            )]));
        }
    }

    mod nominals {
        use super::*;

        #[test]
        fn nominal_labels_merge_with_their_individual() {
            // A ⊑ {b}: every A instance is b itself
            let mut ontology = DlOntology::new();
            ontology.add_dl_clause(DlClause::new(
                vec![Atom::concept(Concept::atomic("ex:A"), Term::var("x"))],
                vec![vec![Atom::concept(
                    Concept::Nominal(Individual::create("ex:b")),
                    Term::var("x"),
                )]],
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:A"),
                Term::individual("ex:a"),
            ));
            ontology.add_positive_fact(Atom::concept(
                Concept::atomic("ex:C"),
                Term::individual("ex:a"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
            // a ≈ b, so b carries C
            assert!(!tableau.is_satisfiable(&[Atom::concept(
                Concept::complement("ex:C"),
                Term::individual("ex:b"),
            )]));
        }
    }

    mod ranges {
        use super::*;
        use mimizuku_model::DataRange;

        #[test]
        fn opposite_range_memberships_clash() {
            let mut ontology = DlOntology::new();
            let range = DataRange::create("xsd:integer");
            ontology.add_positive_fact(Atom::in_range(range, Term::individual("ex:v")));
            ontology.add_negative_fact(Atom::in_range(range, Term::individual("ex:v")));
            let mut tableau = engine(&ontology);
            assert!(!tableau.is_abox_satisfiable());
        }

        #[test]
        fn unrelated_ranges_do_not_clash() {
            let mut ontology = DlOntology::new();
            ontology.add_positive_fact(Atom::in_range(
                DataRange::create("xsd:integer"),
                Term::individual("ex:v"),
            ));
            ontology.add_negative_fact(Atom::in_range(
                DataRange::create("xsd:string"),
                Term::individual("ex:v"),
            ));
            let mut tableau = engine(&ontology);
            assert!(tableau.is_abox_satisfiable());
        }
    }
}
