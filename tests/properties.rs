//! Property tests for conviction scoring and path search.

use proptest::prelude::*;

use trust_graph::attestation::{Attestation, AttestationKind};
use trust_graph::conviction::ConvictionCalculator;
use trust_graph::entity::{ClaimId, Timestamp};
use trust_graph::graph::RelationshipKind;
use trust_graph::graph::store::GraphStore;
use trust_graph::pathfind::{AdmitAll, PathQuery, find_path, hop_cost};
use trust_graph::reputation::StaticReputation;
use trust_graph::temporal::days;

const NOW: Timestamp = 1_700_000_000;

fn kind_of(i: u8) -> AttestationKind {
    AttestationKind::ALL[(i % 4) as usize]
}

/// (kind, confidence, reputation, age in days)
fn attestation_set(max: usize) -> impl Strategy<Value = Vec<(u8, u8, u8, u64)>> {
    prop::collection::vec((0u8..4, 0u8..=100, 0u8..=100, 0u64..1000), 0..max)
}

fn build(raw: &[(u8, u8, u8, u64)]) -> (Vec<Attestation>, StaticReputation) {
    let mut rep = StaticReputation::new();
    let atts = raw
        .iter()
        .enumerate()
        .map(|(i, &(k, conf, r, age))| {
            let attester = format!("attester-{i}");
            rep.insert(attester.as_str(), r);
            Attestation {
                target_claim_id: "claim".into(),
                attester_id: attester.into(),
                kind: kind_of(k),
                confidence: conf,
                created_at: NOW - days(age),
            }
        })
        .collect();
    (atts, rep)
}

fn extra(kind: AttestationKind, confidence: u8, age: u64) -> Attestation {
    Attestation {
        target_claim_id: "claim".into(),
        attester_id: "newcomer".into(),
        kind,
        confidence,
        created_at: NOW - days(age),
    }
}

fn claim() -> ClaimId {
    ClaimId::from("claim")
}

fn build_graph(edges: &[(u8, u8, u8)]) -> GraphStore {
    let g = GraphStore::new();
    for (a, b, s) in edges {
        if a != b {
            g.upsert_edge(
                &format!("n{a}").into(),
                &format!("n{b}").into(),
                RelationshipKind::Social,
                *s as i64,
                1,
            )
            .unwrap();
        }
    }
    g
}

/// Ordering key of a route: fixed-point cost, hop count, node sequence.
type RouteKey = (u64, usize, Vec<String>);

/// Exhaustive search over every simple route within the hop bound.
fn best_route(g: &GraphStore, query: &PathQuery) -> Option<RouteKey> {
    fn walk(
        g: &GraphStore,
        query: &PathQuery,
        route: &mut Vec<String>,
        cost: f64,
        best: &mut Option<RouteKey>,
    ) {
        let head = route.last().cloned().unwrap_or_default();
        if head == query.to.as_str() {
            let key = ((cost * 1e12).round() as u64, route.len() - 1, route[1..].to_vec());
            if best.as_ref().is_none_or(|b| &key < b) {
                *best = Some(key);
            }
            return;
        }
        if route.len() > query.max_hops {
            return;
        }
        for rel in g.neighbors(&head.as_str().into(), query.min_strength) {
            let next = rel.other(&head.as_str().into()).as_str().to_owned();
            let Some(step) = hop_cost(rel.strength) else {
                continue;
            };
            if route.contains(&next) {
                continue;
            }
            route.push(next);
            walk(g, query, route, cost + step, best);
            route.pop();
        }
    }

    if query.from == query.to || !g.has_entity(&query.from) || !g.has_entity(&query.to) {
        return None;
    }
    let mut best = None;
    walk(g, query, &mut vec![query.from.as_str().to_owned()], 0.0, &mut best);
    best
}

proptest! {
    #[test]
    fn score_is_bounded_and_zero_only_when_empty(raw in attestation_set(20)) {
        let (atts, rep) = build(&raw);
        let score = ConvictionCalculator::default().calculate(&claim(), &atts, &rep, NOW).score;
        prop_assert!(score <= 100);
        prop_assert_eq!(score == 0, atts.is_empty());
    }

    #[test]
    fn verify_never_lowers_score(
        raw in attestation_set(12),
        conf in 1u8..=100,
        rep_new in 0u8..=100,
        age in 0u64..1000,
    ) {
        prop_assume!(!raw.is_empty());
        let (mut atts, mut rep) = build(&raw);
        rep.insert("newcomer", rep_new);
        let calc = ConvictionCalculator::default();
        let before = calc.calculate(&claim(), &atts, &rep, NOW).score;
        atts.push(extra(AttestationKind::Verify, conf, age));
        let after = calc.calculate(&claim(), &atts, &rep, NOW).score;
        prop_assert!(after >= before, "{} -> {}", before, after);
    }

    #[test]
    fn dispute_never_raises_score(
        raw in attestation_set(12),
        conf in 1u8..=100,
        rep_new in 0u8..=100,
        age in 0u64..1000,
    ) {
        prop_assume!(!raw.is_empty());
        let (mut atts, mut rep) = build(&raw);
        rep.insert("newcomer", rep_new);
        let calc = ConvictionCalculator::default();
        let before = calc.calculate(&claim(), &atts, &rep, NOW).score;
        atts.push(extra(AttestationKind::Dispute, conf, age));
        let after = calc.calculate(&claim(), &atts, &rep, NOW).score;
        prop_assert!(after <= before, "{} -> {}", before, after);
    }

    #[test]
    fn balanced_verify_and_dispute_lean_negative(conf in 1u8..=100, r in 0u8..=100) {
        let rep = StaticReputation::new().with("v", r).with("d", r);
        let atts = vec![
            Attestation {
                target_claim_id: "claim".into(),
                attester_id: "v".into(),
                kind: AttestationKind::Verify,
                confidence: conf,
                created_at: NOW,
            },
            Attestation {
                target_claim_id: "claim".into(),
                attester_id: "d".into(),
                kind: AttestationKind::Dispute,
                confidence: conf,
                created_at: NOW,
            },
        ];
        let score = ConvictionCalculator::default().calculate(&claim(), &atts, &rep, NOW).score;
        prop_assert!(score < 50, "score = {}", score);
    }

    #[test]
    fn fresher_verify_scores_higher(conf in 20u8..=100, r in 0u8..=100) {
        let rep = StaticReputation::new().with("newcomer", r);
        let calc = ConvictionCalculator::default();
        let fresh = calc
            .calculate(&claim(), &[extra(AttestationKind::Verify, conf, 0)], &rep, NOW)
            .score;
        let old = calc
            .calculate(&claim(), &[extra(AttestationKind::Verify, conf, 365)], &rep, NOW)
            .score;
        prop_assert!(fresh > old, "{} vs {}", fresh, old);
    }

    #[test]
    fn conviction_is_deterministic(raw in attestation_set(20)) {
        let (atts, rep) = build(&raw);
        let calc = ConvictionCalculator::default();
        prop_assert_eq!(
            calc.calculate(&claim(), &atts, &rep, NOW),
            calc.calculate(&claim(), &atts, &rep, NOW)
        );
    }

    #[test]
    fn paths_are_deterministic_and_within_bounds(
        edges in prop::collection::vec((0u8..8, 0u8..8, 1u8..=100), 1..24),
        max_hops in 1usize..5,
        min_strength in 0u8..60,
    ) {
        let g = build_graph(&edges);
        let q = PathQuery::new("n0", "n7")
            .with_max_hops(max_hops)
            .with_min_strength(min_strength);
        let first = find_path(&g, &q, &AdmitAll);
        prop_assert_eq!(&first, &find_path(&g, &q, &AdmitAll));
        if let Some(path) = first {
            prop_assert!(path.hop_count <= max_hops);
            prop_assert!(path.hops.iter().all(|h| h.strength >= min_strength));
            let mut seen: Vec<_> = path.entities();
            let len = seen.len();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), len);
        }
    }

    #[test]
    fn paths_match_exhaustive_search(
        edges in prop::collection::vec((0u8..7, 0u8..7, 1u8..=100), 1..20),
        max_hops in 1usize..5,
        min_strength in 0u8..60,
    ) {
        let g = build_graph(&edges);
        let q = PathQuery::new("n0", "n6")
            .with_max_hops(max_hops)
            .with_min_strength(min_strength);
        let found = find_path(&g, &q, &AdmitAll).map(|p| {
            let route: Vec<String> = p.hops.iter().map(|h| h.to.as_str().to_owned()).collect();
            ((p.total_cost * 1e12).round() as u64, p.hop_count, route)
        });
        prop_assert_eq!(found, best_route(&g, &q));
    }
}
