//! mimizuku - DL 知識ベースのためのタブロー推論エンジン
//!
//! Answers consistency, concept satisfiability, subsumption,
//! classification, and realization questions over knowledge bases given
//! as DL-clauses with ground facts. The heavy lifting happens in
//! [`mimizuku_tableau`]; this crate validates configurations, wires the
//! engine, memoizes entailment checks, and builds the concept
//! hierarchy.
//!
//! ```
//! use mimizuku::{Configuration, Reasoner};
//! use mimizuku_model::{Atom, AtomicConcept, Concept, DlClause, DlOntology, Term};
//!
//! let mut ontology = DlOntology::new();
//! // Penguin ⊑ Bird
//! ontology.add_dl_clause(DlClause::new(
//!     vec![Atom::concept(Concept::atomic("ex:Penguin"), Term::var("x"))],
//!     vec![vec![Atom::concept(Concept::atomic("ex:Bird"), Term::var("x"))]],
//! ));
//! let mut reasoner = Reasoner::new(ontology, Configuration::default()).unwrap();
//! assert!(reasoner.is_consistent());
//! assert!(reasoner.is_subsumed_by(
//!     AtomicConcept::create("ex:Penguin"),
//!     AtomicConcept::create("ex:Bird"),
//! ));
//! ```

pub mod config;
pub mod hierarchy;
pub mod oracle;
pub mod reasoner;

pub use config::{
    BlockingSignatureCacheType, BlockingStrategyType, Configuration, DirectBlockingType,
    ExistentialStrategyType, SubsumptionCacheStrategyType, TableauMonitorType,
};
pub use hierarchy::{Hierarchy, Position, PositionId};
pub use oracle::SubsumptionChecker;
pub use reasoner::Reasoner;

use thiserror::Error;

/// Errors surfaced while loading a knowledge base or building reasoning
/// results. Unsatisfiability and inconsistency are answers, not errors.
#[derive(Error, Debug)]
pub enum ReasonerError {
    /// The configuration cannot be used with the given ontology.
    #[error("Incompatible configuration: {0}")]
    IncompatibleConfiguration(String),
    /// The ontology contains DL-clauses violating DL-safety.
    #[error("The following DL-clauses are not admissible:\n{0}")]
    NonAdmissibleClauses(String),
    /// Classification produced an internally inconsistent hierarchy.
    #[error("Hierarchy construction failure: {0}")]
    HierarchyConstruction(String),
    /// Reading an auxiliary file (reuse concept lists) failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
