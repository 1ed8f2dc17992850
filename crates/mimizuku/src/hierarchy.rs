//! 概念階層 - トップ/ボトム探索による分類とその結果表現

use crate::oracle::SubsumptionChecker;
use crate::ReasonerError;
use mimizuku_model::AtomicConcept;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, trace};

/// Index of a position in its hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PositionData {
    equivalents: BTreeSet<AtomicConcept>,
    parents: BTreeSet<PositionId>,
    children: BTreeSet<PositionId>,
}

/// The classification result: a directed acyclic graph of positions,
/// each holding a set of mutually equivalent concepts, with direct
/// subsumption edges between them. ⊤ and ⊥ always have positions; an
/// inconsistent knowledge base collapses to a single position holding
/// every concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    positions: Vec<PositionData>,
    by_concept: HashMap<AtomicConcept, PositionId>,
    top: PositionId,
    bottom: PositionId,
}

/// A borrow of one position with navigation into its hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct Position<'a> {
    hierarchy: &'a Hierarchy,
    id: PositionId,
}

impl Hierarchy {
    pub fn top(&self) -> Position<'_> {
        Position { hierarchy: self, id: self.top }
    }

    pub fn bottom(&self) -> Position<'_> {
        Position { hierarchy: self, id: self.bottom }
    }

    pub fn position(&self, concept: &AtomicConcept) -> Option<Position<'_>> {
        self.by_concept
            .get(concept)
            .map(|&id| Position { hierarchy: self, id })
    }

    pub(crate) fn position_by_id(&self, id: PositionId) -> Position<'_> {
        Position { hierarchy: self, id }
    }

    pub fn contains(&self, concept: &AtomicConcept) -> bool {
        self.by_concept.contains_key(concept)
    }

    /// Number of positions, ⊤ and ⊥ included.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Concept IRI to sorted list of ancestor concept IRIs (the concept
    /// itself included), as a sorted map. A stable dump of the whole
    /// taxonomy for diffing and debugging.
    pub fn sorted_ancestor_lists(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut result = BTreeMap::new();
        for (&concept, &id) in &self.by_concept {
            let position = Position { hierarchy: self, id };
            let mut ancestors = BTreeSet::new();
            for ancestor in position.ancestors() {
                for equivalent in ancestor.equivalents() {
                    ancestors.insert(equivalent.iri().to_owned());
                }
            }
            result.insert(concept.iri().to_owned(), ancestors);
        }
        result
    }
}

impl<'a> Position<'a> {
    pub fn id(&self) -> PositionId {
        self.id
    }

    fn data(&self) -> &'a PositionData {
        &self.hierarchy.positions[self.id.0]
    }

    /// The concepts proved mutually equivalent at this position.
    pub fn equivalents(&self) -> &'a BTreeSet<AtomicConcept> {
        &self.data().equivalents
    }

    pub fn is_top(&self) -> bool {
        self.id == self.hierarchy.top
    }

    pub fn is_bottom(&self) -> bool {
        self.id == self.hierarchy.bottom
    }

    /// Direct (non-transitive) parent positions.
    pub fn parents(&self) -> Vec<Position<'a>> {
        self.data()
            .parents
            .iter()
            .map(|&id| Position { hierarchy: self.hierarchy, id })
            .collect()
    }

    /// Direct child positions.
    pub fn children(&self) -> Vec<Position<'a>> {
        self.data()
            .children
            .iter()
            .map(|&id| Position { hierarchy: self.hierarchy, id })
            .collect()
    }

    /// All positions reachable upwards, this position included.
    pub fn ancestors(&self) -> Vec<Position<'a>> {
        self.closure(|data| &data.parents)
    }

    /// All positions reachable downwards, this position included.
    pub fn descendants(&self) -> Vec<Position<'a>> {
        self.closure(|data| &data.children)
    }

    fn closure(
        &self,
        step: impl Fn(&PositionData) -> &BTreeSet<PositionId>,
    ) -> Vec<Position<'a>> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(self.id);
        queue.push_back(self.id);
        while let Some(current) = queue.pop_front() {
            for &next in step(&self.hierarchy.positions[current.0]) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        seen.into_iter()
            .map(|id| Position { hierarchy: self.hierarchy, id })
            .collect()
    }
}

/// Builds the concept hierarchy by inserting each satisfiable concept
/// with a top-search for its direct subsumers and a bottom-search for
/// its direct subsumees. Each search walks the hierarchy built so far,
/// so the number of oracle calls stays proportional to concept count
/// times hierarchy depth rather than concept count squared.
pub fn build_hierarchy(
    oracle: &mut SubsumptionChecker,
    concepts: &BTreeSet<AtomicConcept>,
) -> Result<Hierarchy, ReasonerError> {
    let thing = AtomicConcept::thing();
    let nothing = AtomicConcept::nothing();

    if !oracle.is_abox_satisfiable() {
        // Everything is equivalent to everything in an inconsistent
        // knowledge base.
        let mut equivalents: BTreeSet<AtomicConcept> = concepts.clone();
        equivalents.insert(thing);
        equivalents.insert(nothing);
        let mut by_concept = HashMap::new();
        for &concept in &equivalents {
            by_concept.insert(concept, PositionId(0));
        }
        debug!("inconsistent knowledge base, hierarchy collapsed");
        return Ok(Hierarchy {
            positions: vec![PositionData {
                equivalents,
                parents: BTreeSet::new(),
                children: BTreeSet::new(),
            }],
            by_concept,
            top: PositionId(0),
            bottom: PositionId(0),
        });
    }

    let top = PositionId(0);
    let bottom = PositionId(1);
    let mut positions = vec![
        PositionData {
            equivalents: BTreeSet::from([thing]),
            parents: BTreeSet::new(),
            children: BTreeSet::from([bottom]),
        },
        PositionData {
            equivalents: BTreeSet::from([nothing]),
            parents: BTreeSet::from([top]),
            children: BTreeSet::new(),
        },
    ];
    let mut by_concept = HashMap::from([(thing, top), (nothing, bottom)]);

    for &concept in concepts {
        if concept == thing || concept == nothing {
            continue;
        }
        if !oracle.is_satisfiable(concept) {
            trace!(concept = concept.iri(), "unsatisfiable, placed at bottom");
            positions[bottom.0].equivalents.insert(concept);
            insert_mapping(&mut by_concept, concept, bottom)?;
            continue;
        }
        // equivalence with an already-placed concept short-circuits the
        // searches entirely
        let parents = top_search(oracle, &positions, top, concept);
        let children = bottom_search(oracle, &positions, bottom, concept);
        let shared: Vec<PositionId> = parents.intersection(&children).copied().collect();
        if let Some(&existing) = shared.first() {
            positions[existing.0].equivalents.insert(concept);
            insert_mapping(&mut by_concept, concept, existing)?;
            continue;
        }
        if parents.is_empty() || children.is_empty() {
            return Err(ReasonerError::HierarchyConstruction(format!(
                "no position found for {}",
                concept.iri()
            )));
        }
        let id = PositionId(positions.len());
        positions.push(PositionData {
            equivalents: BTreeSet::from([concept]),
            parents: parents.clone(),
            children: children.clone(),
        });
        // unlink parent-child edges the new position now mediates
        for &parent in &parents {
            for &child in &children {
                if positions[parent.0].children.remove(&child) {
                    positions[child.0].parents.remove(&parent);
                }
            }
        }
        for &parent in &parents {
            positions[parent.0].children.insert(id);
        }
        for &child in &children {
            positions[child.0].parents.insert(id);
        }
        insert_mapping(&mut by_concept, concept, id)?;
    }

    debug!(
        concepts = by_concept.len(),
        positions = positions.len(),
        "classification finished"
    );
    Ok(Hierarchy {
        positions,
        by_concept,
        top,
        bottom,
    })
}

fn insert_mapping(
    by_concept: &mut HashMap<AtomicConcept, PositionId>,
    concept: AtomicConcept,
    id: PositionId,
) -> Result<(), ReasonerError> {
    if by_concept.insert(concept, id).is_some() {
        return Err(ReasonerError::HierarchyConstruction(format!(
            "{} occurs at two positions",
            concept.iri()
        )));
    }
    Ok(())
}

fn representative(positions: &[PositionData], id: PositionId) -> AtomicConcept {
    // positions always hold at least one equivalent
    positions[id.0]
        .equivalents
        .iter()
        .next()
        .copied()
        .unwrap_or_else(AtomicConcept::thing)
}

/// Minimal positions whose concepts subsume `concept`, found by walking
/// down from ⊤.
fn top_search(
    oracle: &mut SubsumptionChecker,
    positions: &[PositionData],
    top: PositionId,
    concept: AtomicConcept,
) -> BTreeSet<PositionId> {
    let mut result = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([top]);
    visited.insert(top);
    while let Some(current) = queue.pop_front() {
        let mut narrower = false;
        let children: Vec<PositionId> = positions[current.0].children.iter().copied().collect();
        for child in children {
            if oracle.is_subsumed_by(concept, representative(positions, child)) {
                narrower = true;
                if visited.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        if !narrower {
            result.insert(current);
        }
    }
    result
}

/// Maximal positions whose concepts are subsumed by `concept`, found by
/// walking up from ⊥.
fn bottom_search(
    oracle: &mut SubsumptionChecker,
    positions: &[PositionData],
    bottom: PositionId,
    concept: AtomicConcept,
) -> BTreeSet<PositionId> {
    let mut result = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([bottom]);
    visited.insert(bottom);
    while let Some(current) = queue.pop_front() {
        let mut broader = false;
        let parents: Vec<PositionId> = positions[current.0].parents.iter().copied().collect();
        for parent in parents {
            if oracle.is_subsumed_by(representative(positions, parent), concept) {
                broader = true;
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        if !broader {
            result.insert(current);
        }
    }
    result
}
