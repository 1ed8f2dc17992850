//! 包含判定オラクル - タブロー検査のメモ化層

use mimizuku_model::{Atom, AtomicConcept, Concept, Individual, Term};
use mimizuku_tableau::Tableau;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Memoizing front for the tableau. Every entailment question is
/// reduced to one satisfiability check over the shared base graph, with
/// results cached per concept and per ordered concept pair. Taxonomy
/// construction re-asks many overlapping questions, so the maps carry
/// most of its cost.
pub struct SubsumptionChecker {
    tableau: Tableau,
    known_concepts: HashSet<AtomicConcept>,
    abox_satisfiable: Option<bool>,
    satisfiability: HashMap<AtomicConcept, bool>,
    subsumptions: HashMap<(AtomicConcept, AtomicConcept), bool>,
    fresh: u64,
}

impl SubsumptionChecker {
    pub fn new(tableau: Tableau, known_concepts: HashSet<AtomicConcept>) -> Self {
        SubsumptionChecker {
            tableau,
            known_concepts,
            abox_satisfiable: None,
            satisfiability: HashMap::new(),
            subsumptions: HashMap::new(),
            fresh: 0,
        }
    }

    pub fn tableau_mut(&mut self) -> &mut Tableau {
        &mut self.tableau
    }

    pub fn is_known(&self, concept: &AtomicConcept) -> bool {
        self.known_concepts.contains(concept)
    }

    pub fn is_abox_satisfiable(&mut self) -> bool {
        if let Some(result) = self.abox_satisfiable {
            return result;
        }
        let result = self.tableau.is_abox_satisfiable();
        self.abox_satisfiable = Some(result);
        result
    }

    /// Concept satisfiability w.r.t. the knowledge base: can some
    /// element be a `concept` instance? A name absent from the signature
    /// is unconstrained, so the question collapses to base consistency.
    pub fn is_satisfiable(&mut self, concept: AtomicConcept) -> bool {
        if concept == AtomicConcept::nothing() {
            return false;
        }
        if concept == AtomicConcept::thing() || !self.is_known(&concept) {
            return self.is_abox_satisfiable();
        }
        if let Some(&result) = self.satisfiability.get(&concept) {
            return result;
        }
        let root = self.fresh_root();
        let result = self.tableau.is_satisfiable(&[Atom::concept(
            Concept::Atomic(concept),
            Term::Individual(root),
        )]);
        trace!(concept = concept.iri(), result, "concept satisfiability");
        self.satisfiability.insert(concept, result);
        result
    }

    /// Entailed subsumption: does every `sub` instance belong to `sup`?
    /// Checked by refutation: a fresh root that is `sub` but not `sup`
    /// must be unsatisfiable.
    pub fn is_subsumed_by(&mut self, sub: AtomicConcept, sup: AtomicConcept) -> bool {
        if sub == sup || sup == AtomicConcept::thing() || sub == AtomicConcept::nothing() {
            return true;
        }
        if sup == AtomicConcept::nothing() {
            return !self.is_satisfiable(sub);
        }
        if let Some(&result) = self.subsumptions.get(&(sub, sup)) {
            return result;
        }
        let root = self.fresh_root();
        let satisfiable = self.tableau.is_satisfiable(&[
            Atom::concept(Concept::Atomic(sub), Term::Individual(root)),
            Atom::concept(Concept::Complement(sup), Term::Individual(root)),
        ]);
        let result = !satisfiable;
        trace!(sub = sub.iri(), sup = sup.iri(), result, "subsumption");
        self.subsumptions.insert((sub, sup), result);
        result
    }

    /// Entailed instance membership for a named individual.
    pub fn is_instance_of(&mut self, individual: &Individual, concept: AtomicConcept) -> bool {
        if concept == AtomicConcept::thing() {
            return true;
        }
        if concept == AtomicConcept::nothing() {
            return !self.is_abox_satisfiable();
        }
        !self.tableau.is_satisfiable(&[Atom::concept(
            Concept::Complement(concept),
            Term::Individual(*individual),
        )])
    }

    fn fresh_root(&mut self) -> Individual {
        self.fresh += 1;
        Individual::create_anonymous(&format!("internal:query-root#{}", self.fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimizuku_model::{DlClause, DlOntology};
    use mimizuku_tableau::{
        BlockingStrategy, DirectBlockingChecker, ExistentialStrategy, Tableau,
    };

    fn subsumption(sub: &str, sup: &str) -> DlClause {
        DlClause::new(
            vec![Atom::concept(Concept::atomic(sub), Term::var("x"))],
            vec![vec![Atom::concept(Concept::atomic(sup), Term::var("x"))]],
        )
    }

    fn checker(ontology: DlOntology) -> SubsumptionChecker {
        let known = ontology.atomic_concepts.clone();
        let tableau = Tableau::new(
            &ontology,
            BlockingStrategy::Anywhere {
                checker: DirectBlockingChecker::Pairwise,
                cache: None,
            },
            ExistentialStrategy::CreationOrder,
            None,
        );
        SubsumptionChecker::new(tableau, known)
    }

    #[test]
    fn entailed_subsumptions_are_recognized() {
        let mut ontology = DlOntology::new();
        ontology.add_dl_clause(subsumption("ex:Penguin", "ex:Bird"));
        ontology.add_dl_clause(subsumption("ex:Bird", "ex:Animal"));
        let mut checker = checker(ontology);
        let penguin = AtomicConcept::create("ex:Penguin");
        let bird = AtomicConcept::create("ex:Bird");
        let animal = AtomicConcept::create("ex:Animal");
        assert!(checker.is_subsumed_by(penguin, bird));
        assert!(checker.is_subsumed_by(penguin, animal));
        assert!(!checker.is_subsumed_by(bird, penguin));
        // memoized path answers the same
        assert!(checker.is_subsumed_by(penguin, animal));
    }

    #[test]
    fn unknown_names_are_unconstrained() {
        let mut ontology = DlOntology::new();
        ontology.add_dl_clause(subsumption("ex:A", "ex:B"));
        let mut checker = checker(ontology);
        let ghost = AtomicConcept::create("ex:Ghost");
        let b = AtomicConcept::create("ex:B");
        assert!(checker.is_satisfiable(ghost));
        assert!(!checker.is_subsumed_by(ghost, b));
        assert!(checker.is_subsumed_by(ghost, AtomicConcept::thing()));
    }

    #[test]
    fn unsatisfiable_concepts_are_subsumed_by_everything() {
        let mut ontology = DlOntology::new();
        ontology.add_dl_clause(subsumption("ex:Square", "ex:Shape"));
        ontology.add_dl_clause(DlClause::new(
            vec![Atom::concept(Concept::atomic("ex:Square"), Term::var("x"))],
            vec![],
        ));
        let mut checker = checker(ontology);
        let square = AtomicConcept::create("ex:Square");
        assert!(!checker.is_satisfiable(square));
        assert!(checker.is_subsumed_by(square, AtomicConcept::nothing()));
        assert!(checker.is_subsumed_by(square, AtomicConcept::create("ex:Shape")));
    }

    #[test]
    fn instance_checks_follow_entailment() {
        let mut ontology = DlOntology::new();
        ontology.add_dl_clause(subsumption("ex:Penguin", "ex:Bird"));
        ontology.add_positive_fact(Atom::concept(
            Concept::atomic("ex:Penguin"),
            Term::individual("ex:tux"),
        ));
        let mut checker = checker(ontology);
        let tux = Individual::create("ex:tux");
        assert!(checker.is_instance_of(&tux, AtomicConcept::create("ex:Penguin")));
        assert!(checker.is_instance_of(&tux, AtomicConcept::create("ex:Bird")));
        assert!(!checker.is_instance_of(&tux, AtomicConcept::create("ex:Fish")));
    }
}
