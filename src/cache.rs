//! Score cache: memoized path searches and conviction scores.
//!
//! Invalidation is event-driven. The engine calls [`ScoreCache::invalidate_entity`],
//! [`ScoreCache::invalidate_paths`], [`ScoreCache::invalidate_gated`] and
//! [`ScoreCache::invalidate_claim`] from inside the writers' critical
//! section, so once a write has completed no reader can be served a result
//! computed before it. Time only adds a ceiling on top: path entries expire
//! after a TTL, conviction entries after the recompute interval (decay moves
//! scores even with no new evidence).
//!
//! A reader that computes a result while a write is in flight must not store
//! it. Each cache keeps an epoch that every invalidation bumps; readers take the
//! epoch before computing and the insert is dropped if it has moved.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::conviction::ConvictionScore;
use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::pathfind::{Path, PathQuery};

/// Opaque invalidation counter handed out to readers.
pub type Epoch = u64;

/// Cache sizing and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached path queries; 0 disables path caching.
    pub max_path_entries: usize,
    /// Path entries older than this are recomputed.
    pub path_ttl_secs: u64,
    /// Maximum cached conviction scores; 0 disables conviction caching.
    pub max_conviction_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_path_entries: 10_000,
            path_ttl_secs: 1800,
            max_conviction_entries: 10_000,
        }
    }
}

/// Cache counters and sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub path_hits: u64,
    pub path_misses: u64,
    pub conviction_hits: u64,
    pub conviction_misses: u64,
    /// Entries dropped by event-driven invalidation.
    pub invalidations: u64,
    pub path_entries: usize,
    pub conviction_entries: usize,
}

struct PathEntry {
    result: Option<Path>,
    inserted_at: Timestamp,
    seq: u64,
    members: Vec<EntityId>,
}

#[derive(Default)]
struct PathEntries {
    entries: HashMap<PathQuery, PathEntry>,
    by_entity: HashMap<EntityId, HashSet<PathQuery>>,
    /// Insertion order for eviction.
    order: BTreeMap<u64, PathQuery>,
    next_seq: u64,
    epoch: Epoch,
}

impl PathEntries {
    fn remove(&mut self, query: &PathQuery) -> bool {
        let Some(entry) = self.entries.remove(query) else {
            return false;
        };
        self.order.remove(&entry.seq);
        for member in &entry.members {
            if let Some(keys) = self.by_entity.get_mut(member) {
                keys.remove(query);
                if keys.is_empty() {
                    self.by_entity.remove(member);
                }
            }
        }
        true
    }

    /// Remove every entry whose query matches `pred`.
    fn remove_where<P>(&mut self, pred: P) -> usize
    where
        P: Fn(&PathQuery) -> bool,
    {
        let keys: Vec<PathQuery> = self.entries.keys().filter(|q| pred(*q)).cloned().collect();
        keys.iter().filter(|q| self.remove(q)).count()
    }

    fn evict_oldest(&mut self) -> bool {
        match self.order.pop_first() {
            Some((_, oldest)) => {
                self.remove(&oldest);
                true
            }
            None => false,
        }
    }
}

struct ConvictionEntry {
    score: ConvictionScore,
    seq: u64,
}

#[derive(Default)]
struct ConvictionEntries {
    entries: HashMap<ClaimId, ConvictionEntry>,
    order: BTreeMap<u64, ClaimId>,
    next_seq: u64,
    epoch: Epoch,
}

impl ConvictionEntries {
    fn remove(&mut self, claim: &ClaimId) -> bool {
        match self.entries.remove(claim) {
            Some(entry) => {
                self.order.remove(&entry.seq);
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Counters {
    path_hits: AtomicU64,
    path_misses: AtomicU64,
    conviction_hits: AtomicU64,
    conviction_misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Bounded, event-invalidated cache for path results and conviction scores.
pub struct ScoreCache {
    config: CacheConfig,
    conviction_max_age_secs: u64,
    paths: Mutex<PathEntries>,
    convictions: Mutex<ConvictionEntries>,
    counters: Counters,
}

impl ScoreCache {
    pub fn new(config: CacheConfig, conviction_max_age_secs: u64) -> Self {
        Self {
            config,
            conviction_max_age_secs,
            paths: Mutex::new(PathEntries::default()),
            convictions: Mutex::new(ConvictionEntries::default()),
            counters: Counters::default(),
        }
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Current path epoch; pass it back to [`Self::insert_path`].
    pub fn path_epoch(&self) -> Epoch {
        self.paths.lock().expect("path cache lock poisoned").epoch
    }

    /// Cached answer for `query`. `Some(None)` is a cached "no path".
    pub fn get_path(&self, query: &PathQuery, now: Timestamp) -> Option<Option<Path>> {
        let mut paths = self.paths.lock().expect("path cache lock poisoned");
        let fresh = paths
            .entries
            .get(query)
            .map(|e| now.saturating_sub(e.inserted_at) <= self.config.path_ttl_secs);
        match fresh {
            Some(true) => {
                self.counters.path_hits.fetch_add(1, Ordering::Relaxed);
                paths.entries.get(query).map(|e| e.result.clone())
            }
            Some(false) => {
                paths.remove(query);
                self.counters.path_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.path_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a path result computed under `epoch`. Returns `false` if an
    /// invalidation happened since, in which case nothing is stored.
    pub fn insert_path(
        &self,
        query: PathQuery,
        result: Option<Path>,
        epoch: Epoch,
        now: Timestamp,
    ) -> bool {
        if self.config.max_path_entries == 0 {
            return false;
        }
        let mut paths = self.paths.lock().expect("path cache lock poisoned");
        if paths.epoch != epoch {
            return false;
        }

        paths.remove(&query);
        while paths.entries.len() >= self.config.max_path_entries {
            if !paths.evict_oldest() {
                break;
            }
        }

        let mut members = vec![query.from.clone(), query.to.clone()];
        if let Some(path) = &result {
            members.extend(path.hops.iter().map(|h| h.to.clone()));
        }
        members.sort();
        members.dedup();
        for member in &members {
            paths
                .by_entity
                .entry(member.clone())
                .or_default()
                .insert(query.clone());
        }

        let seq = paths.next_seq;
        paths.next_seq += 1;
        paths.order.insert(seq, query.clone());
        paths.entries.insert(
            query,
            PathEntry {
                result,
                inserted_at: now,
                seq,
                members,
            },
        );
        true
    }

    /// Drop every path whose endpoints or route include `entity`.
    pub fn invalidate_entity(&self, entity: &EntityId) -> usize {
        let mut paths = self.paths.lock().expect("path cache lock poisoned");
        paths.epoch += 1;
        let keys = paths.by_entity.remove(entity).unwrap_or_default();
        let removed = keys.iter().filter(|k| paths.remove(k)).count();
        self.counters
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Drop every cached path answer, "no path" included. A new or
    /// strengthened edge anywhere can open a better route for any query.
    pub fn invalidate_paths(&self) -> usize {
        self.invalidate_paths_where(|_| true)
    }

    /// Drop every answer computed under a `min_conviction` floor. Those are
    /// the only path answers that read attestations.
    pub fn invalidate_gated(&self) -> usize {
        self.invalidate_paths_where(|q| q.min_conviction.is_some())
    }

    fn invalidate_paths_where<P>(&self, pred: P) -> usize
    where
        P: Fn(&PathQuery) -> bool,
    {
        let mut paths = self.paths.lock().expect("path cache lock poisoned");
        paths.epoch += 1;
        let removed = paths.remove_where(pred);
        self.counters
            .invalidations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    // ------------------------------------------------------------------
    // Convictions
    // ------------------------------------------------------------------

    /// Current conviction epoch; pass it back to [`Self::insert_conviction`].
    pub fn conviction_epoch(&self) -> Epoch {
        self.convictions
            .lock()
            .expect("conviction cache lock poisoned")
            .epoch
    }

    /// Cached score for `claim`, if computed within the recompute interval
    /// and not after `now`.
    pub fn get_conviction(&self, claim: &ClaimId, now: Timestamp) -> Option<ConvictionScore> {
        let mut convictions = self
            .convictions
            .lock()
            .expect("conviction cache lock poisoned");
        let Some(score) = convictions.entries.get(claim).map(|e| e.score.clone()) else {
            self.counters.conviction_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if now < score.last_updated {
            self.counters.conviction_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        if now - score.last_updated > self.conviction_max_age_secs {
            convictions.remove(claim);
            self.counters.conviction_misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.counters.conviction_hits.fetch_add(1, Ordering::Relaxed);
        Some(score)
    }

    /// Store a score computed under `epoch`. Returns `false` if dropped.
    pub fn insert_conviction(&self, score: ConvictionScore, epoch: Epoch) -> bool {
        if self.config.max_conviction_entries == 0 {
            return false;
        }
        let mut convictions = self
            .convictions
            .lock()
            .expect("conviction cache lock poisoned");
        if convictions.epoch != epoch {
            return false;
        }
        convictions.remove(&score.claim_id);
        while convictions.entries.len() >= self.config.max_conviction_entries {
            match convictions.order.pop_first() {
                Some((_, oldest)) => {
                    convictions.entries.remove(&oldest);
                }
                None => break,
            }
        }
        let seq = convictions.next_seq;
        convictions.next_seq += 1;
        convictions.order.insert(seq, score.claim_id.clone());
        convictions
            .entries
            .insert(score.claim_id.clone(), ConvictionEntry { score, seq });
        true
    }

    /// Drop the cached score for `claim`.
    pub fn invalidate_claim(&self, claim: &ClaimId) -> bool {
        let mut convictions = self
            .convictions
            .lock()
            .expect("conviction cache lock poisoned");
        convictions.epoch += 1;
        let removed = convictions.remove(claim);
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    // ------------------------------------------------------------------

    pub fn stats(&self) -> CacheStats {
        let path_entries = self
            .paths
            .lock()
            .expect("path cache lock poisoned")
            .entries
            .len();
        let conviction_entries = self
            .convictions
            .lock()
            .expect("conviction cache lock poisoned")
            .entries
            .len();
        CacheStats {
            path_hits: self.counters.path_hits.load(Ordering::Relaxed),
            path_misses: self.counters.path_misses.load(Ordering::Relaxed),
            conviction_hits: self.counters.conviction_hits.load(Ordering::Relaxed),
            conviction_misses: self.counters.conviction_misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            path_entries,
            conviction_entries,
        }
    }
}

impl std::fmt::Debug for ScoreCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoreCache")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conviction::{KindCounts, Trend};
    use crate::graph::RelationshipKind;
    use crate::pathfind::Hop;

    fn cache() -> ScoreCache {
        ScoreCache::new(CacheConfig::default(), 3600)
    }

    fn path(route: &[&str]) -> Path {
        let hops: Vec<Hop> = route
            .windows(2)
            .map(|w| Hop {
                from: w[0].into(),
                to: w[1].into(),
                kind: RelationshipKind::Social,
                strength: 100,
                claim_id: "c".into(),
            })
            .collect();
        Path {
            hop_count: hops.len(),
            hops,
            total_cost: 0.0,
            path_strength: 100.0,
            geometric_mean: 100.0,
        }
    }

    fn score(claim: &str, at: Timestamp) -> ConvictionScore {
        ConvictionScore {
            claim_id: claim.into(),
            score: 70,
            attestation_count: 1,
            counts: KindCounts::default(),
            trend: Trend::Stable,
            top_attester_reputation: 0,
            last_updated: at,
        }
    }

    #[test]
    fn path_hit_after_insert() {
        let c = cache();
        let q = PathQuery::new("A", "C");
        let epoch = c.path_epoch();
        assert!(c.insert_path(q.clone(), Some(path(&["A", "B", "C"])), epoch, 100));
        assert_eq!(c.get_path(&q, 100).unwrap().unwrap().hop_count, 2);
        let stats = c.stats();
        assert_eq!(stats.path_hits, 1);
        assert_eq!(stats.path_entries, 1);
    }

    #[test]
    fn negative_results_are_cached() {
        let c = cache();
        let q = PathQuery::new("A", "Z");
        c.insert_path(q.clone(), None, c.path_epoch(), 0);
        assert_eq!(c.get_path(&q, 0), Some(None));
    }

    #[test]
    fn intermediate_entity_invalidates_path() {
        let c = cache();
        let q = PathQuery::new("A", "C");
        c.insert_path(q.clone(), Some(path(&["A", "B", "C"])), c.path_epoch(), 0);
        assert_eq!(c.invalidate_entity(&"B".into()), 1);
        assert!(c.get_path(&q, 0).is_none());
        assert_eq!(c.stats().path_entries, 0);
        assert_eq!(c.stats().invalidations, 1);
    }

    #[test]
    fn endpoint_invalidates_negative_result() {
        let c = cache();
        let q = PathQuery::new("A", "Z");
        c.insert_path(q.clone(), None, c.path_epoch(), 0);
        c.invalidate_entity(&"Z".into());
        assert!(c.get_path(&q, 0).is_none());
    }

    #[test]
    fn path_flush_drops_every_answer() {
        let c = cache();
        c.insert_path(PathQuery::new("A", "C"), Some(path(&["A", "B", "C"])), c.path_epoch(), 0);
        c.insert_path(PathQuery::new("A", "Y"), None, c.path_epoch(), 0);
        let epoch = c.path_epoch();
        assert_eq!(c.invalidate_paths(), 2);
        assert_eq!(c.stats().path_entries, 0);
        assert_ne!(c.path_epoch(), epoch);
        // The reverse index is emptied along with the entries.
        assert_eq!(c.invalidate_entity(&"B".into()), 0);
    }

    #[test]
    fn gated_flush_keeps_ungated_answers() {
        let c = cache();
        let open = PathQuery::new("A", "C");
        let gated = PathQuery::new("A", "C").with_min_conviction(60);
        let gated_miss = PathQuery::new("X", "Z").with_min_conviction(60);
        c.insert_path(open.clone(), Some(path(&["A", "B", "C"])), c.path_epoch(), 0);
        c.insert_path(gated.clone(), Some(path(&["A", "C"])), c.path_epoch(), 0);
        c.insert_path(gated_miss, None, c.path_epoch(), 0);
        assert_eq!(c.invalidate_gated(), 2);
        assert!(c.get_path(&open, 0).is_some());
        assert!(c.get_path(&gated, 0).is_none());
    }

    #[test]
    fn unrelated_entity_keeps_path() {
        let c = cache();
        let q = PathQuery::new("A", "C");
        c.insert_path(q.clone(), Some(path(&["A", "B", "C"])), c.path_epoch(), 0);
        assert_eq!(c.invalidate_entity(&"X".into()), 0);
        assert!(c.get_path(&q, 0).is_some());
    }

    #[test]
    fn stale_epoch_insert_is_dropped() {
        let c = cache();
        let q = PathQuery::new("A", "C");
        let epoch = c.path_epoch();
        c.invalidate_entity(&"B".into());
        assert!(!c.insert_path(q.clone(), None, epoch, 0));
        assert!(c.get_path(&q, 0).is_none());
    }

    #[test]
    fn path_ttl_expires() {
        let c = cache();
        let q = PathQuery::new("A", "C");
        c.insert_path(q.clone(), None, c.path_epoch(), 0);
        assert!(c.get_path(&q, 1800).is_some());
        assert!(c.get_path(&q, 1801).is_none());
        assert_eq!(c.stats().path_entries, 0);
    }

    #[test]
    fn oldest_path_is_evicted_at_capacity() {
        let c = ScoreCache::new(
            CacheConfig {
                max_path_entries: 2,
                ..CacheConfig::default()
            },
            3600,
        );
        for to in ["B", "C", "D"] {
            c.insert_path(PathQuery::new("A", to), None, c.path_epoch(), 0);
        }
        assert_eq!(c.stats().path_entries, 2);
        assert!(c.get_path(&PathQuery::new("A", "B"), 0).is_none());
        assert!(c.get_path(&PathQuery::new("A", "D"), 0).is_some());
        // Evicted entries leave no reverse-index residue.
        assert_eq!(c.invalidate_entity(&"B".into()), 0);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let c = ScoreCache::new(
            CacheConfig {
                max_path_entries: 0,
                max_conviction_entries: 0,
                ..CacheConfig::default()
            },
            3600,
        );
        assert!(!c.insert_path(PathQuery::new("A", "B"), None, c.path_epoch(), 0));
        assert!(!c.insert_conviction(score("x", 0), c.conviction_epoch()));
    }

    #[test]
    fn conviction_hit_and_invalidate() {
        let c = cache();
        let claim = ClaimId::from("x");
        assert!(c.insert_conviction(score("x", 1000), c.conviction_epoch()));
        assert_eq!(c.get_conviction(&claim, 1500).map(|s| s.score), Some(70));
        assert!(c.invalidate_claim(&claim));
        assert!(c.get_conviction(&claim, 1500).is_none());
        let stats = c.stats();
        assert_eq!(stats.conviction_hits, 1);
        assert_eq!(stats.conviction_misses, 1);
    }

    #[test]
    fn conviction_freshness_ceiling() {
        let c = cache();
        let claim = ClaimId::from("x");
        c.insert_conviction(score("x", 1000), c.conviction_epoch());
        assert!(c.get_conviction(&claim, 1000 + 3600).is_some());
        assert!(c.get_conviction(&claim, 1000 + 3601).is_none());
        assert_eq!(c.stats().conviction_entries, 0);
    }

    #[test]
    fn conviction_from_the_future_is_not_served() {
        let c = cache();
        c.insert_conviction(score("x", 1000), c.conviction_epoch());
        assert!(c.get_conviction(&"x".into(), 999).is_none());
        assert_eq!(c.stats().conviction_entries, 1);
    }

    #[test]
    fn stale_conviction_insert_is_dropped() {
        let c = cache();
        let epoch = c.conviction_epoch();
        c.invalidate_claim(&"x".into());
        assert!(!c.insert_conviction(score("x", 0), epoch));
    }

    #[test]
    fn oldest_conviction_is_evicted_at_capacity() {
        let c = ScoreCache::new(
            CacheConfig {
                max_conviction_entries: 2,
                ..CacheConfig::default()
            },
            3600,
        );
        for claim in ["x", "y", "z"] {
            assert!(c.insert_conviction(score(claim, 0), c.conviction_epoch()));
        }
        assert_eq!(c.stats().conviction_entries, 2);
        assert!(c.get_conviction(&"x".into(), 0).is_none());
        assert!(c.get_conviction(&"y".into(), 0).is_some());
        assert!(c.get_conviction(&"z".into(), 0).is_some());

        // Re-inserting a cached claim refreshes it instead of evicting another.
        c.insert_conviction(score("y", 10), c.conviction_epoch());
        c.insert_conviction(score("w", 10), c.conviction_epoch());
        assert_eq!(c.stats().conviction_entries, 2);
        assert!(c.get_conviction(&"z".into(), 10).is_none());
        assert!(c.get_conviction(&"y".into(), 10).is_some());
    }
}
