//! Graph analytics: network statistics and degree centrality.
//!
//! Network statistics run on a point-in-time snapshot copied into a `petgraph`
//! undirected graph, so they never hold store locks while computing. Degrees
//! come straight from the store's adjacency index.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use serde::Serialize;

use crate::entity::EntityId;

use super::store::GraphStore;

/// Aggregate metrics over the whole relationship graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub entity_count: usize,
    pub relationship_count: usize,
    /// Mean strength over all relationships (0.0 when there are none).
    pub avg_strength: f64,
    /// Number of connected components, isolated entities included.
    pub component_count: usize,
    /// Entity count of the largest connected component.
    pub largest_component: usize,
}

/// Degree of a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegreeCentrality {
    pub entity: EntityId,
    pub degree: usize,
}

/// Build an undirected petgraph snapshot of the store.
fn snapshot(store: &GraphStore) -> UnGraph<EntityId, u8> {
    let mut graph = UnGraph::new_undirected();
    let mut index: HashMap<EntityId, NodeIndex> = HashMap::new();
    for entity in store.entities() {
        let idx = graph.add_node(entity.clone());
        index.insert(entity, idx);
    }
    for rel in store.relationships() {
        let (Some(&a), Some(&b)) = (index.get(&rel.participant_a), index.get(&rel.participant_b))
        else {
            continue;
        };
        graph.add_edge(a, b, rel.strength);
    }
    graph
}

/// Compute network-level statistics.
pub fn network_stats(store: &GraphStore) -> NetworkStats {
    let graph = snapshot(store);

    let relationship_count = graph.edge_count();
    let avg_strength = if relationship_count == 0 {
        0.0
    } else {
        graph.edge_weights().map(|&s| s as f64).sum::<f64>() / relationship_count as f64
    };

    let mut components = UnionFind::<usize>::new(graph.node_count());
    for edge in graph.raw_edges() {
        components.union(edge.source().index(), edge.target().index());
    }
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for node in graph.node_indices() {
        *sizes.entry(components.find(node.index())).or_default() += 1;
    }

    NetworkStats {
        entity_count: graph.node_count(),
        relationship_count,
        avg_strength,
        component_count: sizes.len(),
        largest_component: sizes.values().copied().max().unwrap_or(0),
    }
}

/// Degree of every entity, sorted by degree desc then id asc.
pub fn degree_centrality(store: &GraphStore) -> Vec<DegreeCentrality> {
    let mut results: Vec<DegreeCentrality> = store
        .entities()
        .into_iter()
        .map(|entity| {
            let degree = store.degree(&entity);
            DegreeCentrality { entity, degree }
        })
        .collect();
    results.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.entity.cmp(&b.entity)));
    results
}
