//! リーズナー設定 - ブロッキング・展開戦略・キャッシュ方針

use mimizuku_model::AtomicConcept;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Which tableau monitor the reasoner installs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableauMonitorType {
    None,
    /// Log per-check timing and search counters through `tracing`.
    Timing,
}

/// Which direct blocking checker to use. `Optimal` defers the choice to
/// the ontology's features: single blocking unless inverse roles occur,
/// pairwise blocking otherwise, the reflexive variant when reflexivity
/// is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectBlockingType {
    Single,
    PairWise,
    PairWiseReflexive,
    Optimal,
}

/// Where blocker candidates are searched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingStrategyType {
    Anywhere,
    Ancestor,
}

/// Whether signatures of completed graphs are cached for later blocking.
/// The cache is never built when the ontology has nominals, regardless
/// of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockingSignatureCacheType {
    Cached,
    NotCached,
}

/// How pending existential restrictions are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExistentialStrategyType {
    CreationOrder,
    DepthFirst,
    El,
    IndividualReuse,
}

/// When the subsumption oracle is seeded with a full classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubsumptionCacheStrategyType {
    /// Classify while loading the ontology.
    Immediate,
    /// Classify on the first query that can profit from the hierarchy.
    JustInTime,
    /// Classify only when classification is explicitly requested.
    OnRequest,
}

/// Reasoner settings. Plain data: building a `Configuration` performs no
/// validation, the checks happen when a reasoner is constructed from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub tableau_monitor_type: TableauMonitorType,
    pub direct_blocking_type: DirectBlockingType,
    pub blocking_strategy_type: BlockingStrategyType,
    pub blocking_signature_cache_type: BlockingSignatureCacheType,
    pub existential_strategy_type: ExistentialStrategyType,
    pub subsumption_cache_strategy_type: SubsumptionCacheStrategyType,
    /// Reject ontologies containing non-admissible DL-clauses.
    pub check_clauses: bool,
    /// Extend the knowledge base so that arbitrary concept-expression
    /// queries stay cheap.
    pub prepare_for_expressive_queries: bool,
    /// Concepts whose existential fillers are always satisfied by a
    /// shared reused individual (individual-reuse strategies only).
    pub reuse_always: HashSet<AtomicConcept>,
    /// Concepts never satisfied by reuse.
    pub reuse_never: HashSet<AtomicConcept>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            tableau_monitor_type: TableauMonitorType::None,
            direct_blocking_type: DirectBlockingType::Optimal,
            blocking_strategy_type: BlockingStrategyType::Anywhere,
            blocking_signature_cache_type: BlockingSignatureCacheType::Cached,
            existential_strategy_type: ExistentialStrategyType::CreationOrder,
            subsumption_cache_strategy_type: SubsumptionCacheStrategyType::Immediate,
            check_clauses: true,
            prepare_for_expressive_queries: false,
            reuse_always: HashSet::new(),
            reuse_never: HashSet::new(),
        }
    }
}

impl Configuration {
    /// Loads the always-reuse concept set from a newline-delimited file
    /// of concept IRIs. Blank lines are skipped.
    pub fn load_reuse_always(&mut self, path: &Path) -> io::Result<()> {
        self.reuse_always = Self::load_concepts(path)?;
        Ok(())
    }

    /// Loads the never-reuse concept set, same format.
    pub fn load_reuse_never(&mut self, path: &Path) -> io::Result<()> {
        self.reuse_never = Self::load_concepts(path)?;
        Ok(())
    }

    fn load_concepts(path: &Path) -> io::Result<HashSet<AtomicConcept>> {
        let text = fs::read_to_string(path)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(AtomicConcept::create)
            .collect())
    }
}
