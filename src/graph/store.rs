//! In-memory relationship graph with sharded, per-entity write serialization.
//!
//! Edges live in a `DashMap` arena keyed by [`EdgeKey`]; each entity owns an
//! adjacency set of the keys incident to it. Readers never block on writers of
//! unrelated entities. Writers take the lock stripes of both endpoints (in
//! stripe order), so updates touching the same entity are serialized while
//! updates to disjoint entities proceed in parallel.

use std::collections::BTreeSet;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::error::GraphError;

use super::{EdgeKey, HistoryPoint, MAX_STRENGTH, Relationship, RelationshipKind};

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Default number of writer lock stripes.
pub const DEFAULT_LOCK_STRIPES: usize = 64;

/// What a mutation did to an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    /// The observation was already recorded; nothing changed.
    Unchanged,
    Removed,
}

/// Outcome of an edge mutation, handed to on-commit hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeChange {
    pub key: EdgeKey,
    pub kind: ChangeKind,
    /// Current strength after the change (`None` once removed).
    pub strength: Option<u8>,
    /// Strength before the change (`None` if the edge is new).
    pub previous: Option<u8>,
}

impl EdgeChange {
    pub fn is_mutation(&self) -> bool {
        self.kind != ChangeKind::Unchanged
    }

    /// Whether the edge became passable or stronger.
    pub fn strengthened(&self) -> bool {
        match (self.previous, self.strength) {
            (None, Some(_)) => true,
            (Some(before), Some(after)) => after > before,
            _ => false,
        }
    }
}

/// Sharded in-memory relationship graph.
pub struct GraphStore {
    /// Edge arena.
    edges: DashMap<EdgeKey, Relationship>,
    /// Entity → keys of incident edges. Entities without edges keep an empty set.
    adjacency: DashMap<EntityId, BTreeSet<EdgeKey>>,
    /// Relationship claim id → edge key.
    claims: DashMap<ClaimId, EdgeKey>,
    /// Writer lock stripes, selected by entity hash.
    stripes: Box<[Mutex<()>]>,
    hasher: RandomState,
    edge_count: AtomicUsize,
}

impl GraphStore {
    /// Create an empty graph with the default stripe count.
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_LOCK_STRIPES)
    }

    /// Create an empty graph with `stripes` writer lock stripes (at least one).
    pub fn with_stripes(stripes: usize) -> Self {
        Self {
            edges: DashMap::new(),
            adjacency: DashMap::new(),
            claims: DashMap::new(),
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
            edge_count: AtomicUsize::new(0),
        }
    }

    fn stripe_of(&self, entity: &EntityId) -> usize {
        (self.hasher.hash_one(entity) % self.stripes.len() as u64) as usize
    }

    /// Lock the stripes of both endpoints in index order.
    fn lock_pair(&self, a: &EntityId, b: &EntityId) -> Vec<MutexGuard<'_, ()>> {
        let (i, j) = {
            let (x, y) = (self.stripe_of(a), self.stripe_of(b));
            (x.min(y), x.max(y))
        };
        let mut guards = Vec::with_capacity(2);
        guards.push(self.stripes[i].lock().expect("graph stripe lock poisoned"));
        if j != i {
            guards.push(self.stripes[j].lock().expect("graph stripe lock poisoned"));
        }
        guards
    }

    /// Register an entity that has no edges yet.
    pub fn ensure_entity(&self, entity: &EntityId) {
        if !self.adjacency.contains_key(entity) {
            self.adjacency.entry(entity.clone()).or_default();
        }
    }

    /// Insert or update the edge `(a, b, kind)`.
    pub fn upsert_edge(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
        strength: i64,
        timestamp: Timestamp,
    ) -> GraphResult<EdgeChange> {
        self.upsert_edge_with(a, b, kind, strength, timestamp, None, |_| {})
    }

    /// Insert or update the edge `(a, b, kind)`, running `on_commit` inside the
    /// writers' critical section when the graph actually changed.
    ///
    /// `strength` is clamped to `[0, 100]`. An existing edge of the same kind
    /// gets the observation appended to its history at timestamp position;
    /// a duplicate observation is a no-op.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_edge_with<F>(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
        strength: i64,
        timestamp: Timestamp,
        label: Option<String>,
        on_commit: F,
    ) -> GraphResult<EdgeChange>
    where
        F: FnOnce(&EdgeChange),
    {
        if a == b {
            return Err(GraphError::InvalidEdge {
                entity: a.to_string(),
            });
        }

        let point = HistoryPoint {
            timestamp,
            strength: strength.clamp(0, MAX_STRENGTH as i64) as u8,
            label,
        };
        let key = EdgeKey::new(a.clone(), b.clone(), kind);

        let _guards = self.lock_pair(a, b);

        let (change_kind, previous, current) = match self.edges.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let rel = occupied.get_mut();
                let previous = rel.strength;
                let applied = rel.record(point);
                let kind = if applied {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Unchanged
                };
                (kind, Some(previous), rel.strength)
            }
            Entry::Vacant(vacant) => {
                let rel = Relationship::new(&key, point);
                let strength = rel.strength;
                vacant.insert(rel);
                (ChangeKind::Created, None, strength)
            }
        };

        if change_kind == ChangeKind::Created {
            self.adjacency
                .entry(key.low.clone())
                .or_default()
                .insert(key.clone());
            self.adjacency
                .entry(key.high.clone())
                .or_default()
                .insert(key.clone());
            self.claims.insert(key.claim_id(), key.clone());
            self.edge_count.fetch_add(1, Ordering::Relaxed);
        }

        let change = EdgeChange {
            key,
            kind: change_kind,
            strength: Some(current),
            previous,
        };
        if change.is_mutation() {
            on_commit(&change);
        }
        Ok(change)
    }

    /// Hard-delete the edge `(a, b, kind)`. Returns the removed relationship.
    pub fn remove_edge(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
    ) -> Option<Relationship> {
        self.remove_edge_with(a, b, kind, |_| {})
    }

    /// Hard-delete the edge, running `on_commit` inside the writers' critical
    /// section if an edge was removed.
    pub fn remove_edge_with<F>(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
        on_commit: F,
    ) -> Option<Relationship>
    where
        F: FnOnce(&EdgeChange),
    {
        let key = EdgeKey::new(a.clone(), b.clone(), kind);
        let _guards = self.lock_pair(a, b);

        let (_, removed) = self.edges.remove(&key)?;
        for endpoint in [&key.low, &key.high] {
            if let Some(mut adj) = self.adjacency.get_mut(endpoint) {
                adj.remove(&key);
            }
        }
        self.claims.remove(&key.claim_id());
        self.edge_count.fetch_sub(1, Ordering::Relaxed);

        on_commit(&EdgeChange {
            key,
            kind: ChangeKind::Removed,
            strength: None,
            previous: Some(removed.strength),
        });
        Some(removed)
    }

    /// All edges incident to `entity` with `strength >= min_strength`.
    ///
    /// Ordering is not part of the contract.
    pub fn neighbors(&self, entity: &EntityId, min_strength: u8) -> Vec<Relationship> {
        let keys: Vec<EdgeKey> = match self.adjacency.get(entity) {
            Some(adj) => adj.iter().cloned().collect(),
            None => return vec![],
        };
        keys.iter()
            .filter_map(|key| {
                let rel = self.edges.get(key)?;
                (rel.strength >= min_strength).then(|| rel.value().clone())
            })
            .collect()
    }

    /// Look up a single edge.
    pub fn edge(&self, a: &EntityId, b: &EntityId, kind: RelationshipKind) -> Option<Relationship> {
        let key = EdgeKey::new(a.clone(), b.clone(), kind);
        self.edges.get(&key).map(|r| r.value().clone())
    }

    /// The edge owning a relationship claim id, if any.
    pub fn edge_for_claim(&self, claim: &ClaimId) -> Option<EdgeKey> {
        self.claims.get(claim).map(|k| k.value().clone())
    }

    /// Number of edges incident to `entity`.
    pub fn degree(&self, entity: &EntityId) -> usize {
        self.adjacency.get(entity).map(|adj| adj.len()).unwrap_or(0)
    }

    pub fn has_entity(&self, entity: &EntityId) -> bool {
        self.adjacency.contains_key(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.edge_count.load(Ordering::Relaxed)
    }

    /// All known entities, sorted.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.adjacency.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Snapshot of every relationship, sorted by edge key.
    pub fn relationships(&self) -> Vec<Relationship> {
        let mut rels: Vec<Relationship> = self.edges.iter().map(|e| e.value().clone()).collect();
        rels.sort_by_key(|r| r.key());
        rels
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("entities", &self.entity_count())
            .field("relationships", &self.relationship_count())
            .field("stripes", &self.stripes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::from(s)
    }

    const PRO: RelationshipKind = RelationshipKind::Professional;

    #[test]
    fn upsert_creates_both_nodes() {
        let g = GraphStore::new();
        let change = g.upsert_edge(&id("a"), &id("b"), PRO, 80, 10).unwrap();
        assert_eq!(change.kind, ChangeKind::Created);
        assert!(g.has_entity(&id("a")));
        assert!(g.has_entity(&id("b")));
        assert_eq!(g.entity_count(), 2);
        assert_eq!(g.relationship_count(), 1);
    }

    #[test]
    fn self_edge_is_rejected() {
        let g = GraphStore::new();
        let err = g.upsert_edge(&id("a"), &id("a"), PRO, 50, 1).unwrap_err();
        assert!(matches!(err, GraphError::InvalidEdge { .. }));
        assert_eq!(g.entity_count(), 0);
    }

    #[test]
    fn same_kind_updates_instead_of_duplicating() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 40, 10).unwrap();
        let change = g.upsert_edge(&id("b"), &id("a"), PRO, 90, 20).unwrap();
        assert_eq!(change.kind, ChangeKind::Updated);
        assert_eq!(g.relationship_count(), 1);
        let rel = g.edge(&id("a"), &id("b"), PRO).unwrap();
        assert_eq!(rel.strength, 90);
        assert_eq!(rel.history.len(), 2);
    }

    #[test]
    fn different_kinds_are_separate_edges() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 40, 10).unwrap();
        g.upsert_edge(&id("a"), &id("b"), RelationshipKind::Family, 90, 10)
            .unwrap();
        assert_eq!(g.relationship_count(), 2);
        assert_eq!(g.degree(&id("a")), 2);
    }

    #[test]
    fn strength_is_clamped() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 250, 1).unwrap();
        g.upsert_edge(&id("a"), &id("c"), PRO, -7, 1).unwrap();
        assert_eq!(g.edge(&id("a"), &id("b"), PRO).unwrap().strength, 100);
        assert_eq!(g.edge(&id("a"), &id("c"), PRO).unwrap().strength, 0);
    }

    #[test]
    fn neighbors_respect_min_strength() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 80, 1).unwrap();
        g.upsert_edge(&id("a"), &id("c"), PRO, 20, 1).unwrap();
        let strong = g.neighbors(&id("a"), 50);
        assert_eq!(strong.len(), 1);
        assert_eq!(strong[0].other(&id("a")), &id("b"));
        assert_eq!(g.neighbors(&id("a"), 0).len(), 2);
        assert!(g.neighbors(&id("zzz"), 0).is_empty());
    }

    #[test]
    fn remove_is_hard_delete_but_entities_remain() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 80, 1).unwrap();
        let removed = g.remove_edge(&id("b"), &id("a"), PRO);
        assert!(removed.is_some());
        assert_eq!(g.relationship_count(), 0);
        assert!(g.neighbors(&id("a"), 0).is_empty());
        assert!(g.has_entity(&id("a")));
        assert!(g.remove_edge(&id("a"), &id("b"), PRO).is_none());
    }

    #[test]
    fn on_commit_runs_only_for_mutations() {
        let g = GraphStore::new();
        let mut seen = Vec::new();
        g.upsert_edge_with(&id("a"), &id("b"), PRO, 50, 1, None, |c| seen.push(c.kind))
            .unwrap();
        g.upsert_edge_with(&id("a"), &id("b"), PRO, 50, 1, None, |c| seen.push(c.kind))
            .unwrap();
        g.remove_edge_with(&id("a"), &id("b"), PRO, |c| seen.push(c.kind));
        assert_eq!(seen, vec![ChangeKind::Created, ChangeKind::Removed]);
    }

    #[test]
    fn changes_report_previous_strength() {
        let g = GraphStore::new();
        let created = g.upsert_edge(&id("a"), &id("b"), PRO, 50, 10).unwrap();
        assert_eq!(created.previous, None);
        assert!(created.strengthened());

        let up = g.upsert_edge(&id("a"), &id("b"), PRO, 70, 20).unwrap();
        assert_eq!((up.previous, up.strength), (Some(50), Some(70)));
        assert!(up.strengthened());

        let down = g.upsert_edge(&id("a"), &id("b"), PRO, 30, 30).unwrap();
        assert!(!down.strengthened());

        // An older point lands in history without moving current strength.
        let late = g.upsert_edge(&id("a"), &id("b"), PRO, 99, 5).unwrap();
        assert_eq!(late.kind, ChangeKind::Updated);
        assert_eq!((late.previous, late.strength), (Some(30), Some(30)));
        assert!(!late.strengthened());

        let mut removed = None;
        g.remove_edge_with(&id("a"), &id("b"), PRO, |c| removed = Some(c.clone()));
        let removed = removed.unwrap();
        assert_eq!((removed.previous, removed.strength), (Some(30), None));
        assert!(!removed.strengthened());
    }

    #[test]
    fn claim_index_tracks_edges() {
        let g = GraphStore::new();
        g.upsert_edge(&id("a"), &id("b"), PRO, 50, 1).unwrap();
        let key = EdgeKey::new(id("a"), id("b"), PRO);
        assert_eq!(g.edge_for_claim(&key.claim_id()), Some(key.clone()));
        g.remove_edge(&id("a"), &id("b"), PRO);
        assert_eq!(g.edge_for_claim(&key.claim_id()), None);
    }

    #[test]
    fn ensure_entity_registers_isolated_node() {
        let g = GraphStore::new();
        g.ensure_entity(&id("lonely"));
        assert!(g.has_entity(&id("lonely")));
        assert_eq!(g.degree(&id("lonely")), 0);
    }

    #[test]
    fn concurrent_writers_on_disjoint_entities() {
        let g = GraphStore::with_stripes(8);
        std::thread::scope(|s| {
            for t in 0..8 {
                let g = &g;
                s.spawn(move || {
                    for i in 0..50 {
                        let a = id(&format!("t{t}-{i}"));
                        let b = id(&format!("t{t}-{}", i + 1));
                        g.upsert_edge(&a, &b, PRO, 60, i as u64).unwrap();
                    }
                });
            }
        });
        assert_eq!(g.relationship_count(), 8 * 50);
    }

    #[test]
    fn concurrent_writers_on_same_edge_converge() {
        let g = GraphStore::with_stripes(4);
        std::thread::scope(|s| {
            for t in 0..4u64 {
                let g = &g;
                s.spawn(move || {
                    for i in 0..25u64 {
                        let ts = t * 100 + i;
                        g.upsert_edge(&id("a"), &id("b"), PRO, ts as i64 % 101, ts)
                            .unwrap();
                    }
                });
            }
        });
        let rel = g.edge(&id("a"), &id("b"), PRO).unwrap();
        assert_eq!(rel.history.len(), 100);
        assert_eq!(rel.last_interaction, 324);
        assert_eq!(rel.strength, (324 % 101) as u8);
    }
}
