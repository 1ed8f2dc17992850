//! mimizuku-tableau - ハイパータブロー飽和エンジン
//!
//! Saturates a completion graph under the DL-clauses of a knowledge
//! base: deterministic rule application, hyperresolution with branching
//! heads, merging under at-most restrictions, existential expansion
//! guarded by blocking, and chronological backtracking over an undo
//! trail.

pub mod blocking;
pub mod existentials;
pub mod graph;
pub mod monitor;
pub mod tableau;

pub use blocking::{BlockingSignatureCache, BlockingStrategy, DirectBlockingChecker};
pub use existentials::ExistentialStrategy;
pub use graph::{BlockingStatus, CompletionGraph, Node, NodeId};
pub use monitor::{MonitorFork, TableauMonitor, TimingMonitor};
pub use tableau::Tableau;
