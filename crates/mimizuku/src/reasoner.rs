//! リーズナーファサード - 設定検証・エンジン組み立て・推論サービス

use crate::config::{
    BlockingSignatureCacheType, BlockingStrategyType, Configuration, DirectBlockingType,
    ExistentialStrategyType, SubsumptionCacheStrategyType, TableauMonitorType,
};
use crate::hierarchy::{build_hierarchy, Hierarchy, Position, PositionId};
use crate::oracle::SubsumptionChecker;
use crate::ReasonerError;
use mimizuku_model::{AtomicConcept, DlOntology, Individual};
use mimizuku_tableau::{
    BlockingSignatureCache, BlockingStrategy, DirectBlockingChecker, ExistentialStrategy,
    MonitorFork, Tableau, TableauMonitor, TimingMonitor,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// The reasoner: validates a configuration against an ontology, wires
/// the tableau engine accordingly, and answers the standard reasoning
/// questions. Classification and realization results are computed once
/// and kept.
pub struct Reasoner {
    config: Configuration,
    ontology: DlOntology,
    checker: SubsumptionChecker,
    hierarchy: Option<Hierarchy>,
    realization: Option<HashMap<PositionId, HashSet<Individual>>>,
}

impl Reasoner {
    pub fn new(ontology: DlOntology, config: Configuration) -> Result<Self, ReasonerError> {
        Self::with_monitor(ontology, config, None)
    }

    /// Like `new`, with an externally supplied tableau monitor. When the
    /// configuration also names a monitor, events go to both.
    pub fn with_monitor(
        ontology: DlOntology,
        config: Configuration,
        external_monitor: Option<Box<dyn TableauMonitor>>,
    ) -> Result<Self, ReasonerError> {
        let reuse = matches!(
            config.existential_strategy_type,
            ExistentialStrategyType::El | ExistentialStrategyType::IndividualReuse
        );
        if reuse && ontology.has_nominals {
            return Err(ReasonerError::IncompatibleConfiguration(
                "individual reuse strategies cannot be used with nominals".to_owned(),
            ));
        }
        if reuse
            && ontology.has_at_most_restrictions
            && ontology.has_inverse_roles
            && !ontology.can_use_ni_rule
        {
            return Err(ReasonerError::IncompatibleConfiguration(
                "individual reuse strategies cannot be used with both at-most restrictions and inverse roles"
                    .to_owned(),
            ));
        }
        if config.check_clauses {
            let bad = ontology.non_admissible_dl_clauses();
            if !bad.is_empty() {
                let listing = bad
                    .iter()
                    .map(|clause| clause.to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                return Err(ReasonerError::NonAdmissibleClauses(listing));
            }
        }

        let monitor = Self::assemble_monitor(&config, external_monitor);
        let checker_kind = Self::select_blocking_checker(&config, &ontology);
        let cache = match config.blocking_signature_cache_type {
            // caching signatures is unsound in the presence of nominals
            BlockingSignatureCacheType::Cached if !ontology.has_nominals => {
                Some(BlockingSignatureCache::new(checker_kind))
            }
            _ => None,
        };
        let blocking = match config.blocking_strategy_type {
            BlockingStrategyType::Anywhere => BlockingStrategy::Anywhere {
                checker: checker_kind,
                cache,
            },
            BlockingStrategyType::Ancestor => BlockingStrategy::Ancestor {
                checker: checker_kind,
                cache,
            },
        };
        let strategy = match config.existential_strategy_type {
            ExistentialStrategyType::CreationOrder => ExistentialStrategy::CreationOrder,
            ExistentialStrategyType::DepthFirst => ExistentialStrategy::DepthFirst,
            ExistentialStrategyType::El => ExistentialStrategy::individual_reuse(
                true,
                config.reuse_always.clone(),
                config.reuse_never.clone(),
            ),
            ExistentialStrategyType::IndividualReuse => ExistentialStrategy::individual_reuse(
                false,
                config.reuse_always.clone(),
                config.reuse_never.clone(),
            ),
        };

        info!(
            concepts = ontology.atomic_concepts.len(),
            roles = ontology.atomic_roles.len(),
            individuals = ontology.individuals.len(),
            clauses = ontology.dl_clauses.len(),
            "loading knowledge base"
        );
        let tableau = Tableau::new(&ontology, blocking, strategy, monitor);
        let checker = SubsumptionChecker::new(tableau, ontology.atomic_concepts.clone());
        let mut reasoner = Reasoner {
            config,
            ontology,
            checker,
            hierarchy: None,
            realization: None,
        };
        let classify_now = reasoner.config.subsumption_cache_strategy_type
            == SubsumptionCacheStrategyType::Immediate
            || reasoner.config.prepare_for_expressive_queries;
        if classify_now {
            reasoner.classify()?;
        }
        Ok(reasoner)
    }

    fn assemble_monitor(
        config: &Configuration,
        external: Option<Box<dyn TableauMonitor>>,
    ) -> Option<Box<dyn TableauMonitor>> {
        let configured: Option<Box<dyn TableauMonitor>> = match config.tableau_monitor_type {
            TableauMonitorType::None => None,
            TableauMonitorType::Timing => Some(Box::new(TimingMonitor::new())),
        };
        match (configured, external) {
            (Some(a), Some(b)) => Some(Box::new(MonitorFork::new(a, b))),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// `Optimal` picks the cheapest checker that is sound for the
    /// ontology's features.
    fn select_blocking_checker(
        config: &Configuration,
        ontology: &DlOntology,
    ) -> DirectBlockingChecker {
        match config.direct_blocking_type {
            DirectBlockingType::Single => DirectBlockingChecker::Single,
            DirectBlockingType::PairWise => DirectBlockingChecker::Pairwise,
            DirectBlockingType::PairWiseReflexive => DirectBlockingChecker::PairwiseReflexive,
            DirectBlockingType::Optimal => {
                if config.prepare_for_expressive_queries {
                    DirectBlockingChecker::PairwiseReflexive
                } else if ontology.has_at_most_restrictions && ontology.has_inverse_roles {
                    if ontology.has_reflexivity {
                        DirectBlockingChecker::PairwiseReflexive
                    } else {
                        DirectBlockingChecker::Pairwise
                    }
                } else {
                    DirectBlockingChecker::Single
                }
            }
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn ontology(&self) -> &DlOntology {
        &self.ontology
    }

    /// Whether the concept name occurs in the loaded knowledge base
    /// (⊤ and ⊥ always count as defined).
    pub fn is_class_name_defined(&self, concept: &AtomicConcept) -> bool {
        *concept == AtomicConcept::thing()
            || *concept == AtomicConcept::nothing()
            || self.ontology.contains_atomic_concept(concept)
    }

    pub fn is_consistent(&mut self) -> bool {
        self.checker.is_abox_satisfiable()
    }

    /// Concept satisfiability. Names absent from the signature are
    /// unconstrained and therefore satisfiable whenever the knowledge
    /// base is consistent.
    pub fn is_class_satisfiable(&mut self, concept: AtomicConcept) -> bool {
        self.ensure_cache_policy();
        if let Some(hierarchy) = &self.hierarchy {
            if hierarchy.top().id() == hierarchy.bottom().id() {
                // inconsistent knowledge base, nothing is satisfiable
                return false;
            }
            if let Some(position) = hierarchy.position(&concept) {
                return !position.is_bottom();
            }
        }
        self.checker.is_satisfiable(concept)
    }

    /// Entailed subsumption between two named concepts. Answered from
    /// the hierarchy when one is available, from the oracle otherwise.
    pub fn is_subsumed_by(&mut self, sub: AtomicConcept, sup: AtomicConcept) -> bool {
        self.ensure_cache_policy();
        if let Some(hierarchy) = &self.hierarchy {
            if let (Some(sub_position), Some(sup_position)) =
                (hierarchy.position(&sub), hierarchy.position(&sup))
            {
                return sub_position
                    .ancestors()
                    .iter()
                    .any(|ancestor| ancestor.id() == sup_position.id());
            }
        }
        self.checker.is_subsumed_by(sub, sup)
    }

    /// Classifies the signature concepts, building the concept hierarchy
    /// if it has not been built yet.
    pub fn classify(&mut self) -> Result<&Hierarchy, ReasonerError> {
        if self.hierarchy.is_none() {
            let concepts: BTreeSet<AtomicConcept> =
                self.ontology.atomic_concepts.iter().copied().collect();
            debug!(concepts = concepts.len(), "classification started");
            let hierarchy = build_hierarchy(&mut self.checker, &concepts)?;
            self.hierarchy = Some(hierarchy);
        }
        self.hierarchy
            .as_ref()
            .ok_or_else(|| ReasonerError::HierarchyConstruction("hierarchy missing".to_owned()))
    }

    /// Forces the subsumption cache to be fully seeded, regardless of
    /// the configured cache strategy.
    pub fn seed_subsumption_cache(&mut self) -> Result<(), ReasonerError> {
        self.classify().map(|_| ())
    }

    pub fn is_subsumption_cache_seeded(&self) -> bool {
        self.hierarchy.is_some()
    }

    /// The hierarchy position of a named concept, classifying first when
    /// needed. Unknown names have no position.
    pub fn position(&mut self, concept: &AtomicConcept) -> Result<Option<Position<'_>>, ReasonerError> {
        self.classify()?;
        Ok(self.hierarchy.as_ref().and_then(|h| h.position(concept)))
    }

    pub fn hierarchy(&mut self) -> Result<&Hierarchy, ReasonerError> {
        self.classify()
    }

    /// Sorted taxonomy dump, concept IRI to sorted ancestor IRIs.
    pub fn sorted_ancestor_lists(
        &mut self,
    ) -> Result<std::collections::BTreeMap<String, BTreeSet<String>>, ReasonerError> {
        Ok(self.classify()?.sorted_ancestor_lists())
    }

    /// All named individuals entailed to be instances of the concept.
    pub fn instances_of(
        &mut self,
        concept: &AtomicConcept,
    ) -> Result<HashSet<Individual>, ReasonerError> {
        self.ensure_realized()?;
        let Some(hierarchy) = self.hierarchy.as_ref() else {
            return Ok(HashSet::new());
        };
        let Some(position) = hierarchy.position(concept) else {
            return Ok(HashSet::new());
        };
        let descendant_ids: Vec<PositionId> =
            position.descendants().iter().map(|p| p.id()).collect();
        let realization = self.realization.as_ref();
        let mut result = HashSet::new();
        if let Some(realization) = realization {
            for id in descendant_ids {
                if let Some(members) = realization.get(&id) {
                    result.extend(members.iter().copied());
                }
            }
        }
        Ok(result)
    }

    /// Named individuals whose most specific entailed concepts include
    /// this one.
    pub fn direct_instances_of(
        &mut self,
        concept: &AtomicConcept,
    ) -> Result<HashSet<Individual>, ReasonerError> {
        self.ensure_realized()?;
        let Some(hierarchy) = self.hierarchy.as_ref() else {
            return Ok(HashSet::new());
        };
        let Some(position) = hierarchy.position(concept) else {
            return Ok(HashSet::new());
        };
        let id = position.id();
        Ok(self
            .realization
            .as_ref()
            .and_then(|r| r.get(&id))
            .cloned()
            .unwrap_or_default())
    }

    /// Computes, once, the most specific hierarchy positions of every
    /// named individual. Membership is downward-closed along the
    /// hierarchy, so an individual is a direct member of the deepest
    /// positions it belongs to.
    fn ensure_realized(&mut self) -> Result<(), ReasonerError> {
        if self.realization.is_some() {
            return Ok(());
        }
        self.classify()?;
        let Some(hierarchy) = self.hierarchy.as_ref() else {
            return Ok(());
        };
        let individuals: Vec<Individual> = self
            .ontology
            .individuals
            .iter()
            .filter(|i| i.is_named())
            .copied()
            .collect();
        let consistent = self.checker.is_abox_satisfiable();
        let mut realization: HashMap<PositionId, HashSet<Individual>> = HashMap::new();
        if !consistent {
            // every membership is entailed; park everyone at the single
            // collapsed position
            let bottom = hierarchy.bottom().id();
            realization.insert(bottom, individuals.into_iter().collect());
            self.realization = Some(realization);
            return Ok(());
        }
        // membership per position, memoized per individual
        for individual in individuals {
            let mut member_of: HashMap<PositionId, bool> = HashMap::new();
            let mut stack = vec![hierarchy.top().id()];
            member_of.insert(hierarchy.top().id(), true);
            let mut deepest: Vec<PositionId> = Vec::new();
            while let Some(current) = stack.pop() {
                let position = hierarchy.position_by_id(current);
                let mut deeper = false;
                for child in position.children() {
                    let id = child.id();
                    let member = match member_of.get(&id) {
                        Some(&m) => m,
                        None => {
                            let representative = child
                                .equivalents()
                                .iter()
                                .next()
                                .copied()
                                .unwrap_or_else(AtomicConcept::thing);
                            // no one is a ⊥ instance in a consistent base
                            let m = !child.is_bottom()
                                && self.checker.is_instance_of(&individual, representative);
                            member_of.insert(id, m);
                            if m {
                                stack.push(id);
                            }
                            m
                        }
                    };
                    deeper = deeper || member;
                }
                if !deeper {
                    deepest.push(current);
                }
            }
            for id in deepest {
                realization.entry(id).or_default().insert(individual);
            }
        }
        debug!("realization finished");
        self.realization = Some(realization);
        Ok(())
    }

    /// Applies the configured cache strategy: just-in-time classifies on
    /// the first query that can use the hierarchy; on-request leaves the
    /// oracle to answer until classification is explicitly demanded.
    fn ensure_cache_policy(&mut self) {
        if self.config.subsumption_cache_strategy_type == SubsumptionCacheStrategyType::JustInTime
            && self.hierarchy.is_none()
        {
            // a failure here will surface again on the explicit path
            let _ = self.classify();
        }
    }
}
