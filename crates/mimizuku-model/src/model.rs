//! DL 知識ベースの正規化済みデータモデル - 概念・ロール・アトム・DL節

use crate::symbol::{intern, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub const THING_IRI: &str = "http://www.w3.org/2002/07/owl#Thing";
pub const NOTHING_IRI: &str = "http://www.w3.org/2002/07/owl#Nothing";

/// Named (atomic) concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomicConcept(Symbol);

impl AtomicConcept {
    pub fn create(name: &str) -> Self {
        AtomicConcept(intern(name))
    }

    /// owl:Thing (⊤)
    pub fn thing() -> Self {
        AtomicConcept(intern(THING_IRI))
    }

    /// owl:Nothing (⊥)
    pub fn nothing() -> Self {
        AtomicConcept(intern(NOTHING_IRI))
    }

    pub fn iri(&self) -> &'static str {
        self.0.as_str()
    }
}

/// Named role (object property)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AtomicRole(Symbol);

impl AtomicRole {
    pub fn create(name: &str) -> Self {
        AtomicRole(intern(name))
    }

    pub fn iri(&self) -> &'static str {
        self.0.as_str()
    }
}

/// A role or its inverse. `inverse()` is involutive: taking the inverse
/// of an inverse yields the underlying atomic role again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Atomic(AtomicRole),
    Inverse(AtomicRole),
}

impl Role {
    pub fn create(name: &str) -> Self {
        Role::Atomic(AtomicRole::create(name))
    }

    pub fn inverse(self) -> Role {
        match self {
            Role::Atomic(r) => Role::Inverse(r),
            Role::Inverse(r) => Role::Atomic(r),
        }
    }

    pub fn atomic_role(self) -> AtomicRole {
        match self {
            Role::Atomic(r) | Role::Inverse(r) => r,
        }
    }

    pub fn is_inverse(self) -> bool {
        matches!(self, Role::Inverse(_))
    }
}

/// Opaque data range. The engine treats ranges as names with a decidable
/// membership predicate; a clash arises only when the same range is
/// asserted both positively and negatively for one term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataRange(Symbol);

impl DataRange {
    pub fn create(name: &str) -> Self {
        DataRange(intern(name))
    }

    pub fn iri(&self) -> &'static str {
        self.0.as_str()
    }
}

/// Individual constant. Named individuals come from the input knowledge
/// base; anonymous individuals are introduced internally (query roots,
/// fresh head constants) and never appear in reasoning results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Individual {
    symbol: Symbol,
    named: bool,
}

impl Individual {
    pub fn create(name: &str) -> Self {
        Individual {
            symbol: intern(name),
            named: true,
        }
    }

    pub fn create_anonymous(name: &str) -> Self {
        Individual {
            symbol: intern(name),
            named: false,
        }
    }

    pub fn iri(&self) -> &'static str {
        self.symbol.as_str()
    }

    pub fn is_named(&self) -> bool {
        self.named
    }
}

/// Clause variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variable(Symbol);

impl Variable {
    pub fn create(name: &str) -> Self {
        Variable(intern(name))
    }

    pub fn name(&self) -> &'static str {
        self.0.as_str()
    }
}

/// Argument position of an atom: a clause variable or an individual constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Variable(Variable),
    Individual(Individual),
}

impl Term {
    pub fn var(name: &str) -> Self {
        Term::Variable(Variable::create(name))
    }

    pub fn individual(name: &str) -> Self {
        Term::Individual(Individual::create(name))
    }
}

/// Concept expression in negation normal form. Complements are pushed
/// down to atomic concepts; complex negations never occur.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Concept {
    /// owl:Thing (⊤)
    Thing,
    /// owl:Nothing (⊥)
    Nothing,
    /// Named concept A
    Atomic(AtomicConcept),
    /// ¬A for atomic A
    Complement(AtomicConcept),
    /// C1 ⊓ ... ⊓ Cn
    And(Vec<Concept>),
    /// C1 ⊔ ... ⊔ Cn
    Or(Vec<Concept>),
    /// ∃R.C
    SomeValuesFrom { role: Role, concept: Box<Concept> },
    /// ∀R.C
    AllValuesFrom { role: Role, concept: Box<Concept> },
    /// ≥n R.C
    AtLeast {
        cardinality: u32,
        role: Role,
        concept: Box<Concept>,
    },
    /// ≤n R.C
    AtMost {
        cardinality: u32,
        role: Role,
        concept: Box<Concept>,
    },
    /// {i}
    Nominal(Individual),
    /// Membership in an opaque data range
    InRange(DataRange),
    /// Non-membership in an opaque data range
    NotInRange(DataRange),
}

impl Concept {
    pub fn atomic(name: &str) -> Self {
        Concept::Atomic(AtomicConcept::create(name))
    }

    pub fn complement(name: &str) -> Self {
        Concept::Complement(AtomicConcept::create(name))
    }

    pub fn some(role: Role, concept: Concept) -> Self {
        Concept::SomeValuesFrom {
            role,
            concept: Box::new(concept),
        }
    }

    pub fn all(role: Role, concept: Concept) -> Self {
        Concept::AllValuesFrom {
            role,
            concept: Box::new(concept),
        }
    }

    pub fn at_least(cardinality: u32, role: Role, concept: Concept) -> Self {
        Concept::AtLeast {
            cardinality,
            role,
            concept: Box::new(concept),
        }
    }

    pub fn at_most(cardinality: u32, role: Role, concept: Concept) -> Self {
        Concept::AtMost {
            cardinality,
            role,
            concept: Box::new(concept),
        }
    }

    /// The NNF negation when it is expressible without rewriting,
    /// i.e. for literal-level concepts. Used by the choose-rule and for
    /// detecting falsified disjuncts.
    pub fn negation(&self) -> Option<Concept> {
        match self {
            Concept::Thing => Some(Concept::Nothing),
            Concept::Nothing => Some(Concept::Thing),
            Concept::Atomic(a) => Some(Concept::Complement(*a)),
            Concept::Complement(a) => Some(Concept::Atomic(*a)),
            Concept::InRange(r) => Some(Concept::NotInRange(*r)),
            Concept::NotInRange(r) => Some(Concept::InRange(*r)),
            _ => None,
        }
    }

    /// True for ⊤, atomic concepts, and their complements (the only
    /// concept forms permitted in clause bodies).
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Concept::Thing | Concept::Atomic(_) | Concept::Complement(_)
        )
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concept::Thing => write!(f, "⊤"),
            Concept::Nothing => write!(f, "⊥"),
            Concept::Atomic(a) => write!(f, "{}", a.iri()),
            Concept::Complement(a) => write!(f, "¬{}", a.iri()),
            Concept::And(cs) => {
                write!(f, "(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ⊓ ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Concept::Or(cs) => {
                write!(f, "(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ⊔ ")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, ")")
            }
            Concept::SomeValuesFrom { role, concept } => write!(f, "∃{role}.{concept}"),
            Concept::AllValuesFrom { role, concept } => write!(f, "∀{role}.{concept}"),
            Concept::AtLeast {
                cardinality,
                role,
                concept,
            } => write!(f, "≥{cardinality} {role}.{concept}"),
            Concept::AtMost {
                cardinality,
                role,
                concept,
            } => write!(f, "≤{cardinality} {role}.{concept}"),
            Concept::Nominal(i) => write!(f, "{{{}}}", i.iri()),
            Concept::InRange(r) => write!(f, "{}", r.iri()),
            Concept::NotInRange(r) => write!(f, "¬{}", r.iri()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Atomic(r) => write!(f, "{}", r.iri()),
            Role::Inverse(r) => write!(f, "{}⁻", r.iri()),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(v) => write!(f, "?{}", v.name()),
            Term::Individual(i) => write!(f, "{}", i.iri()),
        }
    }
}

/// Atom of a DL-clause or ground fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Atom {
    /// C(t). In clause bodies the concept must be a literal; heads may
    /// carry arbitrary concept expressions.
    Concept { concept: Concept, term: Term },
    /// r(s, t)
    Role {
        role: AtomicRole,
        from: Term,
        to: Term,
    },
    /// s ≈ t
    Equal(Term, Term),
    /// s ≉ t
    NotEqual(Term, Term),
    /// dr(t)
    InRange { range: DataRange, term: Term },
    /// ¬dr(t)
    NotInRange { range: DataRange, term: Term },
}

impl Atom {
    pub fn concept(concept: Concept, term: Term) -> Self {
        Atom::Concept { concept, term }
    }

    pub fn role(role: AtomicRole, from: Term, to: Term) -> Self {
        Atom::Role { role, from, to }
    }

    pub fn in_range(range: DataRange, term: Term) -> Self {
        Atom::InRange { range, term }
    }

    pub fn not_in_range(range: DataRange, term: Term) -> Self {
        Atom::NotInRange { range, term }
    }

    pub fn terms(&self) -> Vec<Term> {
        match self {
            Atom::Concept { term, .. } | Atom::InRange { term, .. } | Atom::NotInRange { term, .. } => {
                vec![*term]
            }
            Atom::Role { from, to, .. } => vec![*from, *to],
            Atom::Equal(s, t) | Atom::NotEqual(s, t) => vec![*s, *t],
        }
    }

    pub fn collect_variables(&self, out: &mut HashSet<Variable>) {
        for term in self.terms() {
            if let Term::Variable(v) = term {
                out.insert(v);
            }
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Concept { concept, term } => write!(f, "{concept}({term})"),
            Atom::Role { role, from, to } => write!(f, "{}({from}, {to})", role.iri()),
            Atom::Equal(s, t) => write!(f, "{s} ≈ {t}"),
            Atom::NotEqual(s, t) => write!(f, "{s} ≉ {t}"),
            Atom::InRange { range, term } => write!(f, "{}({term})", range.iri()),
            Atom::NotInRange { range, term } => write!(f, "¬{}({term})", range.iri()),
        }
    }
}

/// Universally quantified implication: a conjunctive body entails a
/// disjunction of conjunctions (Lloyd-Topor heads).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DlClause {
    pub body: Vec<Atom>,
    pub head: Vec<Vec<Atom>>,
}

impl DlClause {
    pub fn new(body: Vec<Atom>, head: Vec<Vec<Atom>>) -> Self {
        DlClause { body, head }
    }

    /// Variables bound by the body: those occurring in body concept and
    /// role atoms. Equality, inequality, and data-range body atoms do
    /// not bind.
    pub fn bound_variables(&self) -> HashSet<Variable> {
        let mut bound = HashSet::new();
        for atom in &self.body {
            if matches!(atom, Atom::Concept { .. } | Atom::Role { .. }) {
                atom.collect_variables(&mut bound);
            }
        }
        bound
    }

    /// DL-safety check. A clause is admissible when every body concept
    /// atom is a literal, and every variable occurring in the head or in
    /// a non-binding body atom is bound by a body concept or role atom.
    pub fn is_admissible(&self) -> bool {
        for atom in &self.body {
            if let Atom::Concept { concept, .. } = atom {
                if !concept.is_literal() {
                    return false;
                }
            }
        }
        let bound = self.bound_variables();
        let mut required = HashSet::new();
        for atom in &self.body {
            if !matches!(atom, Atom::Concept { .. } | Atom::Role { .. }) {
                atom.collect_variables(&mut required);
            }
        }
        for disjunct in &self.head {
            for atom in disjunct {
                atom.collect_variables(&mut required);
            }
        }
        required.is_subset(&bound)
    }
}

impl fmt::Display for DlClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, atom) in self.body.iter().enumerate() {
            if i > 0 {
                write!(f, " ∧ ")?;
            }
            write!(f, "{atom}")?;
        }
        write!(f, " → ")?;
        if self.head.is_empty() {
            write!(f, "⊥")?;
        }
        for (i, disjunct) in self.head.iter().enumerate() {
            if i > 0 {
                write!(f, " ∨ ")?;
            }
            if disjunct.len() > 1 {
                write!(f, "[")?;
            }
            for (j, atom) in disjunct.iter().enumerate() {
                if j > 0 {
                    write!(f, " ∧ ")?;
                }
                write!(f, "{atom}")?;
            }
            if disjunct.len() > 1 {
                write!(f, "]")?;
            }
        }
        Ok(())
    }
}
