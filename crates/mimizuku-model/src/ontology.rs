//! DL オントロジーコンテナ - 節・事実・シグネチャ・特徴フラグ

use crate::model::{Atom, AtomicConcept, AtomicRole, Concept, DlClause, Individual, Role, Term};
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Compiled knowledge base: DL-clauses, ground facts, the signature, and
/// feature flags describing which constructs occur. The engine reads the
/// flags to pick blocking and caching behaviour; the flag fields are
/// public so a front-end compiler can override what the collectors
/// derive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlOntology {
    pub iri: Option<Symbol>,
    pub dl_clauses: Vec<DlClause>,
    pub positive_facts: Vec<Atom>,
    pub negative_facts: Vec<Atom>,
    pub atomic_concepts: HashSet<AtomicConcept>,
    pub atomic_roles: HashSet<AtomicRole>,
    pub individuals: HashSet<Individual>,
    pub has_inverse_roles: bool,
    pub has_at_most_restrictions: bool,
    pub has_nominals: bool,
    pub has_reflexivity: bool,
    /// Whether the clausification guarantees the NI-rule preconditions;
    /// never derived here, the front-end compiler must set it.
    pub can_use_ni_rule: bool,
}

impl DlOntology {
    pub fn new() -> Self {
        DlOntology::default()
    }

    pub fn add_dl_clause(&mut self, clause: DlClause) {
        for atom in clause.body.iter().chain(clause.head.iter().flatten()) {
            self.collect_atom(atom);
        }
        self.dl_clauses.push(clause);
    }

    /// Adds a ground fact asserted to hold.
    pub fn add_positive_fact(&mut self, fact: Atom) {
        self.collect_atom(&fact);
        self.positive_facts.push(fact);
    }

    /// Adds a ground fact asserted not to hold.
    pub fn add_negative_fact(&mut self, fact: Atom) {
        self.collect_atom(&fact);
        self.negative_facts.push(fact);
    }

    pub fn contains_atomic_concept(&self, concept: &AtomicConcept) -> bool {
        self.atomic_concepts.contains(concept)
    }

    /// Clauses violating DL-safety, in input order.
    pub fn non_admissible_dl_clauses(&self) -> Vec<&DlClause> {
        self.dl_clauses
            .iter()
            .filter(|clause| !clause.is_admissible())
            .collect()
    }

    fn collect_atom(&mut self, atom: &Atom) {
        match atom {
            Atom::Concept { concept, term } => {
                self.collect_concept(concept);
                self.collect_term(term);
            }
            Atom::Role { role, from, to } => {
                self.atomic_roles.insert(*role);
                self.collect_term(from);
                self.collect_term(to);
            }
            Atom::Equal(s, t) | Atom::NotEqual(s, t) => {
                self.collect_term(s);
                self.collect_term(t);
            }
            Atom::InRange { term, .. } | Atom::NotInRange { term, .. } => {
                self.collect_term(term);
            }
        }
    }

    fn collect_term(&mut self, term: &Term) {
        if let Term::Individual(i) = term {
            self.individuals.insert(*i);
        }
    }

    fn collect_concept(&mut self, concept: &Concept) {
        match concept {
            Concept::Thing | Concept::Nothing | Concept::InRange(_) | Concept::NotInRange(_) => {}
            Concept::Atomic(a) | Concept::Complement(a) => {
                self.atomic_concepts.insert(*a);
            }
            Concept::And(cs) | Concept::Or(cs) => {
                for c in cs {
                    self.collect_concept(c);
                }
            }
            Concept::SomeValuesFrom { role, concept } | Concept::AllValuesFrom { role, concept } => {
                self.collect_role(role);
                self.collect_concept(concept);
            }
            Concept::AtLeast { role, concept, .. } => {
                self.collect_role(role);
                self.collect_concept(concept);
            }
            Concept::AtMost { role, concept, .. } => {
                self.has_at_most_restrictions = true;
                self.collect_role(role);
                self.collect_concept(concept);
            }
            Concept::Nominal(i) => {
                self.has_nominals = true;
                self.individuals.insert(*i);
            }
        }
    }

    fn collect_role(&mut self, role: &Role) {
        if role.is_inverse() {
            self.has_inverse_roles = true;
        }
        self.atomic_roles.insert(role.atomic_role());
    }
}
