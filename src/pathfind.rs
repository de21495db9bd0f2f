//! Strongest-path search between two entities.
//!
//! Path strength composes multiplicatively, so each hop is given the additive
//! cost `-ln(strength / 100)` and the search minimizes total cost with a
//! best-first queue. All costs are non-negative, so the first time the target
//! is popped the path is optimal.
//!
//! Nodes are expanded at most once per hop depth (`(node, hops)` visited set),
//! not once globally: a longer but cheaper route may reach a node at a deeper
//! level and still be the one that finishes within `max_hops`.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use serde::{Deserialize, Serialize};

use crate::entity::{ClaimId, EntityId};
use crate::error::ValidationError;
use crate::graph::store::GraphStore;
use crate::graph::{MAX_STRENGTH, Relationship, RelationshipKind};

/// Default hop bound.
pub const DEFAULT_MAX_HOPS: usize = 6;

/// Resolution of the fixed-point cost key used for ordering.
const COST_SCALE: f64 = 1e12;

/// A path request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathQuery {
    pub from: EntityId,
    pub to: EntityId,
    pub max_hops: usize,
    /// Edges weaker than this are ignored.
    pub min_strength: u8,
    /// Traverse only these kinds; empty means all.
    #[serde(default)]
    pub kinds: Vec<RelationshipKind>,
    /// Entities that may not appear on the path.
    #[serde(default)]
    pub exclude: Vec<EntityId>,
    /// Skip edges whose relationship claim is attested below this score.
    /// Enforced by the [`EdgeGate`] passed to [`find_path`].
    #[serde(default)]
    pub min_conviction: Option<u8>,
}

impl PathQuery {
    pub fn new(from: impl Into<EntityId>, to: impl Into<EntityId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            max_hops: DEFAULT_MAX_HOPS,
            min_strength: 0,
            kinds: Vec::new(),
            exclude: Vec::new(),
            min_conviction: None,
        }
    }

    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    /// Values above 100 are kept as given and rejected by [`Self::validate`].
    pub fn with_min_strength(mut self, min_strength: u8) -> Self {
        self.min_strength = min_strength;
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = RelationshipKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn excluding(mut self, entities: impl IntoIterator<Item = EntityId>) -> Self {
        self.exclude = entities.into_iter().collect();
        self
    }

    pub fn with_min_conviction(mut self, floor: u8) -> Self {
        self.min_conviction = Some(floor);
        self
    }

    /// Strict validation for callers that treat `from == to` as an error.
    ///
    /// [`find_path`] itself answers such queries with "no path".
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.from.as_str().is_empty() {
            return Err(ValidationError::EmptyId { field: "from" });
        }
        if self.to.as_str().is_empty() {
            return Err(ValidationError::EmptyId { field: "to" });
        }
        if self.from == self.to {
            return Err(ValidationError::SelfPath {
                entity: self.from.to_string(),
            });
        }
        if self.min_strength > MAX_STRENGTH {
            return Err(ValidationError::StrengthOutOfRange {
                value: self.min_strength as i64,
            });
        }
        if let Some(floor) = self.min_conviction.filter(|&f| f > 100) {
            return Err(ValidationError::ConvictionOutOfRange {
                value: floor as i64,
            });
        }
        Ok(())
    }

    /// Canonical form: filter lists sorted and deduplicated, so equivalent
    /// queries compare equal.
    pub fn normalized(&self) -> Self {
        let mut q = self.clone();
        q.kinds.sort();
        q.kinds.dedup();
        q.exclude.sort();
        q.exclude.dedup();
        q
    }

    fn admits_kind(&self, kind: RelationshipKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// One traversed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: EntityId,
    pub to: EntityId,
    pub kind: RelationshipKind,
    pub strength: u8,
    pub claim_id: ClaimId,
}

/// A found path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub hops: Vec<Hop>,
    pub hop_count: usize,
    /// Σ −ln(strength/100) over the hops.
    pub total_cost: f64,
    /// Product of hop strengths on a 0–100 scale.
    pub path_strength: f64,
    /// Geometric mean hop strength on a 0–100 scale.
    pub geometric_mean: f64,
}

impl Path {
    /// Entities along the path, endpoints included.
    pub fn entities(&self) -> Vec<&EntityId> {
        let mut out: Vec<&EntityId> = Vec::with_capacity(self.hops.len() + 1);
        if let Some(first) = self.hops.first() {
            out.push(&first.from);
        }
        out.extend(self.hops.iter().map(|h| &h.to));
        out
    }
}

/// Per-edge admission check applied during the search.
///
/// Implementations must not touch the graph store's writers; the search calls
/// this with no store locks held.
pub trait EdgeGate {
    fn admits(&self, relationship: &Relationship) -> bool;
}

/// Admits every edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl EdgeGate for AdmitAll {
    fn admits(&self, _relationship: &Relationship) -> bool {
        true
    }
}

impl<F> EdgeGate for F
where
    F: Fn(&Relationship) -> bool,
{
    fn admits(&self, relationship: &Relationship) -> bool {
        self(relationship)
    }
}

/// Additive cost of traversing an edge; `None` for strength 0.
pub fn hop_cost(strength: u8) -> Option<f64> {
    if strength == 0 {
        return None;
    }
    let s = strength.min(MAX_STRENGTH) as f64 / MAX_STRENGTH as f64;
    Some(-s.ln())
}

fn cost_key(cost: f64) -> u64 {
    (cost * COST_SCALE).round() as u64
}

/// A partial path on the frontier.
#[derive(Debug, Clone)]
struct Frontier {
    key: u64,
    cost: f64,
    origin: EntityId,
    hops: Vec<Hop>,
}

impl Frontier {
    fn head(&self) -> &EntityId {
        self.hops.last().map_or(&self.origin, |h| &h.to)
    }

    fn visits(&self, entity: &EntityId) -> bool {
        &self.origin == entity || self.hops.iter().any(|h| &h.to == entity)
    }

    fn extend(&self, rel: &Relationship, next: &EntityId, cost: f64) -> Self {
        let total = self.cost + cost;
        let mut hops = Vec::with_capacity(self.hops.len() + 1);
        hops.extend(self.hops.iter().cloned());
        hops.push(Hop {
            from: self.head().clone(),
            to: next.clone(),
            kind: rel.kind,
            strength: rel.strength,
            claim_id: rel.claim_id(),
        });
        Self {
            key: cost_key(total),
            cost: total,
            origin: self.origin.clone(),
            hops,
        }
    }

    fn into_path(self) -> Path {
        let hop_count = self.hops.len();
        Path {
            hops: self.hops,
            hop_count,
            total_cost: self.cost,
            path_strength: 100.0 * (-self.cost).exp(),
            geometric_mean: 100.0 * (-self.cost / hop_count.max(1) as f64).exp(),
        }
    }
}

// Cheapest first, then fewer hops, then the lexicographically smallest node
// sequence, then kind sequence. Total over distinct partial paths.
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.hops.len().cmp(&other.hops.len()))
            .then_with(|| {
                self.hops
                    .iter()
                    .map(|h| &h.to)
                    .cmp(other.hops.iter().map(|h| &h.to))
            })
            .then_with(|| {
                self.hops
                    .iter()
                    .map(|h| h.kind)
                    .cmp(other.hops.iter().map(|h| h.kind))
            })
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

/// Find the lowest-cost simple path for `query`.
///
/// Returns `None` when `from == to`, `max_hops == 0`, either endpoint is
/// unknown or excluded, or no admissible path exists within the bound.
pub fn find_path(store: &GraphStore, query: &PathQuery, gate: &dyn EdgeGate) -> Option<Path> {
    if query.from == query.to || query.max_hops == 0 {
        return None;
    }
    if !store.has_entity(&query.from) || !store.has_entity(&query.to) {
        return None;
    }
    let excluded: HashSet<&EntityId> = query.exclude.iter().collect();
    if excluded.contains(&query.from) || excluded.contains(&query.to) {
        return None;
    }

    let mut heap = BinaryHeap::new();
    heap.push(Reverse(Frontier {
        key: 0,
        cost: 0.0,
        origin: query.from.clone(),
        hops: Vec::new(),
    }));
    let mut expanded: HashSet<(EntityId, usize)> = HashSet::new();

    while let Some(Reverse(state)) = heap.pop() {
        if state.head() == &query.to {
            tracing::debug!(
                from = %query.from,
                to = %query.to,
                hops = state.hops.len(),
                expanded = expanded.len(),
                "path found"
            );
            return Some(state.into_path());
        }
        let depth = state.hops.len();
        if !expanded.insert((state.head().clone(), depth)) || depth >= query.max_hops {
            continue;
        }

        for rel in store.neighbors(state.head(), query.min_strength) {
            if !query.admits_kind(rel.kind) {
                continue;
            }
            let next = rel.other(state.head());
            if excluded.contains(next) || state.visits(next) {
                continue;
            }
            let Some(cost) = hop_cost(rel.strength) else {
                continue;
            };
            if !gate.admits(&rel) {
                continue;
            }
            heap.push(Reverse(state.extend(&rel, next, cost)));
        }
    }

    tracing::debug!(from = %query.from, to = %query.to, expanded = expanded.len(), "no path");
    None
}
