//! Relationship graph: entities joined by weighted, typed relationships.
//!
//! - **Data model** (this module): [`Relationship`], its strength [`HistoryPoint`]s
//!   and the canonical [`EdgeKey`] identifying an edge.
//! - **Store** ([`store::GraphStore`]): sharded in-memory adjacency with
//!   per-entity serialized writers.
//! - **Analytics** ([`analytics`]): network-level statistics over a snapshot.
//!
//! Relationships are undirected for traversal but stored once, under a key whose
//! endpoints are in sorted order.

pub mod analytics;
pub mod store;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::error::ValidationError;

/// Upper bound of relationship strength and attestation confidence.
pub const MAX_STRENGTH: u8 = 100;

/// Category of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Professional,
    Personal,
    Family,
    Social,
    Civic,
    Educational,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 6] = [
        Self::Professional,
        Self::Personal,
        Self::Family,
        Self::Social,
        Self::Civic,
        Self::Educational,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Personal => "personal",
            Self::Family => "family",
            Self::Social => "social",
            Self::Civic => "civic",
            Self::Educational => "educational",
        }
    }
}

impl std::fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownRelationshipKind { kind: s.to_owned() })
    }
}

/// Canonical identity of an edge: sorted endpoints plus kind.
///
/// Two entities may be related under several kinds at once; each kind is a
/// separate edge with its own strength and history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub low: EntityId,
    pub high: EntityId,
    pub kind: RelationshipKind,
}

impl EdgeKey {
    /// Build the key for `(a, b, kind)` regardless of argument order.
    pub fn new(a: EntityId, b: EntityId, kind: RelationshipKind) -> Self {
        if a <= b {
            Self { low: a, high: b, kind }
        } else {
            Self { low: b, high: a, kind }
        }
    }

    /// Whether `entity` is one of the endpoints.
    pub fn touches(&self, entity: &EntityId) -> bool {
        &self.low == entity || &self.high == entity
    }

    /// The endpoint opposite to `entity`.
    pub fn other(&self, entity: &EntityId) -> &EntityId {
        if &self.low == entity {
            &self.high
        } else {
            &self.low
        }
    }

    /// Claim id under which the relationship itself can be attested.
    pub fn claim_id(&self) -> ClaimId {
        ClaimId::new(format!("relationship:{}:{}:{}", self.low, self.high, self.kind))
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-{}-> {}", self.low, self.kind, self.high)
    }
}

/// One observed strength of a relationship.
///
/// Points order by `(timestamp, strength, label)`, the field order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: Timestamp,
    pub strength: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A relationship edge with its strength history.
///
/// Invariants: `strength <= 100`; `history` is sorted by the `HistoryPoint`
/// order and its last
/// point carries the current `strength`; `last_interaction` is that point's
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub participant_a: EntityId,
    pub participant_b: EntityId,
    pub kind: RelationshipKind,
    pub strength: u8,
    pub created_at: Timestamp,
    pub last_interaction: Timestamp,
    pub history: Vec<HistoryPoint>,
}

impl Relationship {
    /// Start a relationship from its first observed point.
    pub(crate) fn new(key: &EdgeKey, point: HistoryPoint) -> Self {
        Self {
            participant_a: key.low.clone(),
            participant_b: key.high.clone(),
            kind: key.kind,
            strength: point.strength,
            created_at: point.timestamp,
            last_interaction: point.timestamp,
            history: vec![point],
        }
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            low: self.participant_a.clone(),
            high: self.participant_b.clone(),
            kind: self.kind,
        }
    }

    pub fn claim_id(&self) -> ClaimId {
        self.key().claim_id()
    }

    /// The participant opposite to `entity`.
    pub fn other(&self, entity: &EntityId) -> &EntityId {
        if &self.participant_a == entity {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }

    /// Insert an observation at its sorted position.
    ///
    /// A timestamp tie is settled by strength, then label, never by arrival
    /// order. Returns `false` if an identical point is already recorded.
    pub(crate) fn record(&mut self, point: HistoryPoint) -> bool {
        let pos = match self.history.binary_search(&point) {
            Ok(_) => return false,
            Err(pos) => pos,
        };
        self.history.insert(pos, point);
        self.created_at = self.created_at.min(self.history[0].timestamp);
        if let Some(latest) = self.history.last() {
            self.strength = latest.strength;
            self.last_interaction = latest.timestamp;
        }
        true
    }
}
