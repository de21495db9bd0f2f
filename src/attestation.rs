//! Attestations and the append-only attestation ledger.
//!
//! An attestation is a third party's opinion about a claim. Attestations are
//! immutable: a changed opinion is a new attestation, never an edit. The ledger
//! groups them per claim and is the sole input to conviction scoring.

use std::collections::HashSet;
use std::str::FromStr;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::error::ValidationError;

/// What an attester asserts about a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationKind {
    Verify,
    Dispute,
    Strengthen,
    Weaken,
}

impl AttestationKind {
    pub const ALL: [AttestationKind; 4] =
        [Self::Verify, Self::Dispute, Self::Strengthen, Self::Weaken];

    /// Signed base weight. Disputes outweigh verifications: a false positive
    /// costs more than a missed one.
    pub fn base_weight(self) -> f64 {
        match self {
            Self::Verify => 1.0,
            Self::Strengthen => 0.5,
            Self::Weaken => -0.5,
            Self::Dispute => -1.5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Dispute => "dispute",
            Self::Strengthen => "strengthen",
            Self::Weaken => "weaken",
        }
    }
}

impl std::fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttestationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownAttestationKind { kind: s.to_owned() })
    }
}

/// A single attestation. `confidence` is in `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attestation {
    pub target_claim_id: ClaimId,
    pub attester_id: EntityId,
    pub kind: AttestationKind,
    pub confidence: u8,
    pub created_at: Timestamp,
}

impl Attestation {
    /// Build a validated attestation from untrusted parts.
    pub fn new(
        target_claim_id: ClaimId,
        attester_id: EntityId,
        kind: AttestationKind,
        confidence: i64,
        created_at: Timestamp,
    ) -> Result<Self, ValidationError> {
        if !(0..=100).contains(&confidence) {
            return Err(ValidationError::ConfidenceOutOfRange { value: confidence });
        }
        Ok(Self {
            target_claim_id,
            attester_id,
            kind,
            confidence: confidence as u8,
            created_at,
        })
    }
}

/// Query filter for listing a claim's attestations.
#[derive(Debug, Clone, Default)]
pub struct AttestationFilter {
    /// Only this kind.
    pub kind: Option<AttestationKind>,
    /// Only attestations with at least this confidence.
    pub min_confidence: Option<u8>,
    /// Only attestations created strictly before this instant (pagination cursor).
    pub before: Option<Timestamp>,
    /// Maximum number of results; `None` is unbounded.
    pub limit: Option<usize>,
}

impl AttestationFilter {
    fn admits(&self, a: &Attestation) -> bool {
        self.kind.is_none_or(|k| a.kind == k)
            && self.min_confidence.is_none_or(|c| a.confidence >= c)
            && self.before.is_none_or(|t| a.created_at < t)
    }
}

/// One claim's attestations in arrival order, with a set for duplicate checks.
#[derive(Debug, Default)]
struct ClaimAttestations {
    items: Vec<Attestation>,
    seen: HashSet<Attestation>,
}

/// Append-only attestations grouped per claim.
#[derive(Debug, Default)]
pub struct AttestationLedger {
    by_claim: DashMap<ClaimId, ClaimAttestations>,
}

impl AttestationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an attestation. Returns `false` for an exact duplicate.
    pub fn append(&self, attestation: Attestation) -> bool {
        self.append_with(attestation, |_| {})
    }

    /// Append an attestation and run `on_commit` while the claim's shard is
    /// still locked, so readers cannot observe the new attestation before the
    /// hook's effects.
    pub fn append_with<F>(&self, attestation: Attestation, on_commit: F) -> bool
    where
        F: FnOnce(&Attestation),
    {
        let mut entry = self
            .by_claim
            .entry(attestation.target_claim_id.clone())
            .or_default();
        if !entry.seen.insert(attestation.clone()) {
            return false;
        }
        entry.items.push(attestation);
        if let Some(added) = entry.items.last() {
            on_commit(added);
        }
        true
    }

    /// All attestations for a claim, in arrival order.
    pub fn for_claim(&self, claim: &ClaimId) -> Vec<Attestation> {
        self.by_claim
            .get(claim)
            .map(|v| v.items.clone())
            .unwrap_or_default()
    }

    /// Filtered attestations for a claim, newest first.
    pub fn list(&self, claim: &ClaimId, filter: &AttestationFilter) -> Vec<Attestation> {
        let mut matches: Vec<Attestation> = self
            .for_claim(claim)
            .into_iter()
            .filter(|a| filter.admits(a))
            .collect();
        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.attester_id.cmp(&b.attester_id))
        });
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        matches
    }

    pub fn count(&self, claim: &ClaimId) -> usize {
        self.by_claim.get(claim).map(|v| v.items.len()).unwrap_or(0)
    }

    pub fn has_claim(&self, claim: &ClaimId) -> bool {
        self.count(claim) > 0
    }

    pub fn claim_count(&self) -> usize {
        self.by_claim.len()
    }

    pub fn attestation_count(&self) -> usize {
        self.by_claim.iter().map(|e| e.items.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(attester: &str, kind: AttestationKind, confidence: i64, at: Timestamp) -> Attestation {
        Attestation::new("claim:1".into(), attester.into(), kind, confidence, at).unwrap()
    }

    #[test]
    fn base_weights_are_asymmetric() {
        assert_eq!(AttestationKind::Verify.base_weight(), 1.0);
        assert_eq!(AttestationKind::Strengthen.base_weight(), 0.5);
        assert_eq!(AttestationKind::Weaken.base_weight(), -0.5);
        assert_eq!(AttestationKind::Dispute.base_weight(), -1.5);
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("DISPUTE".parse::<AttestationKind>(), Ok(AttestationKind::Dispute));
        assert!("endorse".parse::<AttestationKind>().is_err());
    }

    #[test]
    fn confidence_is_validated() {
        let err = Attestation::new("c".into(), "a".into(), AttestationKind::Verify, 101, 0);
        assert_eq!(err, Err(ValidationError::ConfidenceOutOfRange { value: 101 }));
        assert!(Attestation::new("c".into(), "a".into(), AttestationKind::Verify, -1, 0).is_err());
    }

    #[test]
    fn duplicates_are_not_appended() {
        let ledger = AttestationLedger::new();
        assert!(ledger.append(att("alice", AttestationKind::Verify, 80, 10)));
        assert!(!ledger.append(att("alice", AttestationKind::Verify, 80, 10)));
        assert!(ledger.append(att("alice", AttestationKind::Dispute, 80, 20)));
        assert_eq!(ledger.count(&"claim:1".into()), 2);
        assert_eq!(ledger.attestation_count(), 2);
    }

    #[test]
    fn large_claims_keep_arrival_order_and_dedupe() {
        let ledger = AttestationLedger::new();
        for i in 0..20_000u64 {
            assert!(ledger.append(att(&format!("a{i}"), AttestationKind::Verify, 50, i)));
        }
        for i in (0..20_000u64).step_by(1000) {
            assert!(!ledger.append(att(&format!("a{i}"), AttestationKind::Verify, 50, i)));
        }
        let all = ledger.for_claim(&"claim:1".into());
        assert_eq!(all.len(), 20_000);
        assert!(all.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let ledger = AttestationLedger::new();
        ledger.append(att("a", AttestationKind::Verify, 90, 10));
        ledger.append(att("b", AttestationKind::Verify, 40, 30));
        ledger.append(att("c", AttestationKind::Dispute, 95, 20));
        ledger.append(att("d", AttestationKind::Verify, 70, 40));

        let claim = ClaimId::from("claim:1");
        let all = ledger.list(&claim, &AttestationFilter::default());
        let stamps: Vec<_> = all.iter().map(|a| a.created_at).collect();
        assert_eq!(stamps, vec![40, 30, 20, 10]);

        let verifies = ledger.list(
            &claim,
            &AttestationFilter {
                kind: Some(AttestationKind::Verify),
                min_confidence: Some(50),
                ..Default::default()
            },
        );
        let who: Vec<_> = verifies.iter().map(|a| a.attester_id.as_str()).collect();
        assert_eq!(who, vec!["d", "a"]);

        let page = ledger.list(
            &claim,
            &AttestationFilter {
                before: Some(40),
                limit: Some(2),
                ..Default::default()
            },
        );
        let stamps: Vec<_> = page.iter().map(|a| a.created_at).collect();
        assert_eq!(stamps, vec![30, 20]);
    }

    #[test]
    fn on_commit_sees_appended_attestation() {
        let ledger = AttestationLedger::new();
        let mut seen = None;
        ledger.append_with(att("a", AttestationKind::Weaken, 60, 5), |a| {
            seen = Some(a.kind)
        });
        assert_eq!(seen, Some(AttestationKind::Weaken));
    }

    #[test]
    fn unknown_claim_is_empty() {
        let ledger = AttestationLedger::new();
        assert!(ledger.for_claim(&"nope".into()).is_empty());
        assert!(!ledger.has_claim(&"nope".into()));
    }
}
