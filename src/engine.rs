//! Engine facade: top-level API for the trust graph.
//!
//! The `TrustEngine` owns the graph store, the attestation ledger, the score
//! cache and the reputation source. Mutations go through it so that cache
//! invalidation happens inside the writer's critical section; queries go
//! through it so that results are cached and gated consistently.

use std::sync::Arc;

use serde::Serialize;

use crate::attestation::{Attestation, AttestationFilter, AttestationLedger};
use crate::cache::{CacheStats, ScoreCache};
use crate::config::EngineConfig;
use crate::conviction::{ConvictionBreakdown, ConvictionCalculator, ConvictionScore};
use crate::entity::{ClaimId, EntityId, Timestamp, now_secs};
use crate::error::{NotFoundError, TrustResult};
use crate::graph::analytics::{self, DegreeCentrality, NetworkStats};
use crate::graph::store::{EdgeChange, GraphStore};
use crate::graph::{Relationship, RelationshipKind};
use crate::ingest::{TrustCommand, TrustEvent};
use crate::pathfind::{self, AdmitAll, EdgeGate, Path, PathQuery};
use crate::reputation::{NoReputation, ReputationSource};

/// Outcome of replaying an event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Events accepted, including idempotent re-deliveries.
    pub applied: usize,
    /// Events that failed validation or application.
    pub rejected: usize,
}

/// The trust graph and conviction engine.
pub struct TrustEngine {
    config: EngineConfig,
    graph: Arc<GraphStore>,
    ledger: Arc<AttestationLedger>,
    cache: Arc<ScoreCache>,
    calculator: ConvictionCalculator,
    reputation: Arc<dyn ReputationSource>,
}

impl TrustEngine {
    /// Create an engine with no reputation source (every attester gets the
    /// default reputation).
    pub fn new(config: EngineConfig) -> TrustResult<Self> {
        Self::with_reputation(config, Arc::new(NoReputation))
    }

    /// Create an engine backed by `reputation`.
    pub fn with_reputation(
        config: EngineConfig,
        reputation: Arc<dyn ReputationSource>,
    ) -> TrustResult<Self> {
        config.validate()?;

        let graph = Arc::new(GraphStore::with_stripes(config.graph.lock_stripes));
        let cache = Arc::new(ScoreCache::new(
            config.cache.clone(),
            config.conviction.recompute_interval_secs,
        ));
        let calculator = ConvictionCalculator::new(config.conviction.clone());

        tracing::info!(
            half_life_days = config.conviction.half_life_days,
            max_hops = config.path.max_hops,
            lock_stripes = config.graph.lock_stripes,
            "trust engine initialized"
        );

        Ok(Self {
            config,
            graph,
            ledger: Arc::new(AttestationLedger::new()),
            cache,
            calculator,
            reputation,
        })
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert or update a relationship. Strength is clamped to `[0, 100]`.
    pub fn upsert_edge(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
        strength: i64,
        timestamp: Timestamp,
    ) -> TrustResult<EdgeChange> {
        self.upsert_edge_labeled(a, b, kind, strength, timestamp, None)
    }

    /// [`Self::upsert_edge`] with an optional label on the history point.
    pub fn upsert_edge_labeled(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
        strength: i64,
        timestamp: Timestamp,
        label: Option<String>,
    ) -> TrustResult<EdgeChange> {
        let change = self
            .graph
            .upsert_edge_with(a, b, kind, strength, timestamp, label, |change| {
                self.invalidate_edge(change)
            })?;
        tracing::debug!(edge = %change.key, change = ?change.kind, strength = ?change.strength, "upsert edge");
        Ok(change)
    }

    /// Hard-delete a relationship. Its attestations stay in the ledger.
    pub fn remove_edge(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
    ) -> Option<Relationship> {
        let removed = self
            .graph
            .remove_edge_with(a, b, kind, |change| self.invalidate_edge(change));
        if let Some(rel) = &removed {
            tracing::debug!(edge = %rel.key(), "removed edge");
        }
        removed
    }

    /// Append an attestation. Returns `false` for an exact duplicate.
    pub fn record_attestation(&self, attestation: Attestation) -> bool {
        self.graph.ensure_entity(&attestation.attester_id);
        let appended = self.ledger.append_with(attestation, |added| {
            self.cache.invalidate_claim(&added.target_claim_id);
            // Conviction-gated paths depend on relationship claims.
            if self.graph.edge_for_claim(&added.target_claim_id).is_some() {
                self.cache.invalidate_gated();
            }
        });
        tracing::debug!(appended, "record attestation");
        appended
    }

    /// Validate and apply one raw event. Returns whether state changed.
    pub fn apply(&self, event: &TrustEvent) -> TrustResult<bool> {
        let changed = match event.validate()? {
            TrustCommand::UpsertEdge {
                a,
                b,
                kind,
                strength,
                timestamp,
                label,
            } => self
                .upsert_edge_labeled(&a, &b, kind, strength as i64, timestamp, label)?
                .is_mutation(),
            TrustCommand::RemoveEdge { a, b, kind } => self.remove_edge(&a, &b, kind).is_some(),
            TrustCommand::Attest(attestation) => self.record_attestation(attestation),
        };
        Ok(changed)
    }

    /// Apply a stream of events in order. Rejected events are logged and
    /// counted; they do not stop the replay.
    pub fn replay<I>(&self, events: I) -> ReplaySummary
    where
        I: IntoIterator<Item = TrustEvent>,
    {
        let mut summary = ReplaySummary::default();
        for (index, event) in events.into_iter().enumerate() {
            match self.apply(&event) {
                Ok(_) => summary.applied += 1,
                Err(err) => {
                    summary.rejected += 1;
                    tracing::warn!(index, event = event.type_name(), error = %err, "rejected event");
                }
            }
        }
        tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            entities = self.graph.entity_count(),
            relationships = self.graph.relationship_count(),
            "replay complete"
        );
        summary
    }

    /// Runs inside the graph writer's critical section.
    ///
    /// A weaker or removed edge can only hurt routes that use it. A stronger
    /// one can beat any cached answer, so every path is dropped.
    fn invalidate_edge(&self, change: &EdgeChange) {
        self.cache.invalidate_claim(&change.key.claim_id());
        if change.strengthened() {
            self.cache.invalidate_paths();
        } else {
            self.cache.invalidate_entity(&change.key.low);
            self.cache.invalidate_entity(&change.key.high);
        }
    }

    // ------------------------------------------------------------------
    // Conviction
    // ------------------------------------------------------------------

    /// Conviction for `claim` now. An unattested claim scores 0.
    pub fn conviction(&self, claim: &ClaimId) -> ConvictionScore {
        self.conviction_at(claim, now_secs())
    }

    /// Conviction for `claim` as of `now`, served from cache when fresh.
    pub fn conviction_at(&self, claim: &ClaimId, now: Timestamp) -> ConvictionScore {
        if let Some(score) = self.cache.get_conviction(claim, now) {
            tracing::debug!(claim = %claim, "conviction cache hit");
            return score;
        }
        let epoch = self.cache.conviction_epoch();
        let attestations = self.ledger.for_claim(claim);
        let score = self
            .calculator
            .calculate(claim, &attestations, self.reputation.as_ref(), now);
        tracing::debug!(
            claim = %claim,
            score = score.score,
            attestations = score.attestation_count,
            "conviction computed"
        );
        self.cache.insert_conviction(score.clone(), epoch);
        score
    }

    /// Strict variant: a claim without attestations is an error.
    pub fn require_conviction(&self, claim: &ClaimId) -> TrustResult<ConvictionScore> {
        self.require_conviction_at(claim, now_secs())
    }

    pub fn require_conviction_at(
        &self,
        claim: &ClaimId,
        now: Timestamp,
    ) -> TrustResult<ConvictionScore> {
        if !self.ledger.has_claim(claim) {
            return Err(NotFoundError::Claim {
                claim_id: claim.to_string(),
            }
            .into());
        }
        Ok(self.conviction_at(claim, now))
    }

    /// Full per-attestation breakdown, always freshly computed.
    pub fn conviction_breakdown(&self, claim: &ClaimId, now: Timestamp) -> ConvictionBreakdown {
        let attestations = self.ledger.for_claim(claim);
        self.calculator
            .calculate_with_breakdown(claim, &attestations, self.reputation.as_ref(), now)
    }

    /// Attestations for `claim`, newest first.
    pub fn attestations(&self, claim: &ClaimId, filter: &AttestationFilter) -> Vec<Attestation> {
        self.ledger.list(claim, filter)
    }

    // ------------------------------------------------------------------
    // Paths and graph queries
    // ------------------------------------------------------------------

    /// A query from `from` to `to` with the configured default bounds.
    pub fn path_query(&self, from: impl Into<EntityId>, to: impl Into<EntityId>) -> PathQuery {
        PathQuery::new(from, to)
            .with_max_hops(self.config.path.max_hops)
            .with_min_strength(self.config.path.min_strength)
    }

    /// Strongest path for `query`, or `None`.
    pub fn find_path(&self, query: &PathQuery) -> Option<Path> {
        self.find_path_at(query, now_secs())
    }

    /// Strongest path as of `now`. `now` drives the cache TTL and the
    /// conviction scores used by `min_conviction`.
    pub fn find_path_at(&self, query: &PathQuery, now: Timestamp) -> Option<Path> {
        let key = query.normalized();
        if let Some(cached) = self.cache.get_path(&key, now) {
            tracing::debug!(from = %key.from, to = %key.to, "path cache hit");
            return cached;
        }

        let epoch = self.cache.path_epoch();
        let result = match key.min_conviction {
            Some(floor) => {
                let gate = ConvictionGate {
                    engine: self,
                    floor,
                    now,
                };
                pathfind::find_path(&self.graph, &key, &gate)
            }
            None => pathfind::find_path(&self.graph, &key, &AdmitAll),
        };
        self.cache.insert_path(key, result.clone(), epoch, now);
        result
    }

    /// Relationships incident to `entity` with at least `min_strength`,
    /// strongest first.
    pub fn neighbors(&self, entity: &EntityId, min_strength: u8) -> Vec<Relationship> {
        let mut rels = self.graph.neighbors(entity, min_strength);
        rels.sort_by(|x, y| y.strength.cmp(&x.strength).then_with(|| x.key().cmp(&y.key())));
        rels
    }

    /// Strict variant of [`Self::neighbors`]: an entity no relationship or
    /// attestation has referenced is an error.
    pub fn require_neighbors(
        &self,
        entity: &EntityId,
        min_strength: u8,
    ) -> TrustResult<Vec<Relationship>> {
        if !self.graph.has_entity(entity) {
            return Err(NotFoundError::Entity {
                entity: entity.to_string(),
            }
            .into());
        }
        Ok(self.neighbors(entity, min_strength))
    }

    /// A single relationship, if present.
    pub fn relationship(
        &self,
        a: &EntityId,
        b: &EntityId,
        kind: RelationshipKind,
    ) -> Option<Relationship> {
        self.graph.edge(a, b, kind)
    }

    pub fn network_stats(&self) -> NetworkStats {
        analytics::network_stats(&self.graph)
    }

    pub fn degree_centrality(&self) -> Vec<DegreeCentrality> {
        analytics::degree_centrality(&self.graph)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn ledger(&self) -> &AttestationLedger {
        &self.ledger
    }
}

impl std::fmt::Debug for TrustEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustEngine")
            .field("graph", &self.graph)
            .field("claims", &self.ledger.claim_count())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Skips edges whose relationship claim is attested below a floor.
/// Unattested relationships pass.
struct ConvictionGate<'a> {
    engine: &'a TrustEngine,
    floor: u8,
    now: Timestamp,
}

impl EdgeGate for ConvictionGate<'_> {
    fn admits(&self, relationship: &Relationship) -> bool {
        let claim = relationship.claim_id();
        if !self.engine.ledger.has_claim(&claim) {
            return true;
        }
        self.engine.conviction_at(&claim, self.now).score >= self.floor
    }
}
