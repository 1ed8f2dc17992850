//! mimizuku-model - DL 知識ベースの正規化済みモデル
//!
//! Shared vocabulary of the Mimizuku reasoning engine: interned IRIs,
//! concepts in negation normal form, DL-clauses with Lloyd-Topor heads,
//! ground facts, and the `DlOntology` container the tableau consumes.

pub mod model;
pub mod ontology;
pub mod symbol;

pub use model::{
    Atom, AtomicConcept, AtomicRole, Concept, DataRange, DlClause, Individual, Role, Term,
    Variable, NOTHING_IRI, THING_IRI,
};
pub use ontology::DlOntology;
pub use symbol::{intern, Symbol};
