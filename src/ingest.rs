//! Ingestion adapter: raw trust events and their validation.
//!
//! Events arrive from outside as loosely typed records (kind names as strings,
//! signed integers for percentages). [`TrustEvent::validate`] turns each one
//! into a typed [`TrustCommand`] or a [`ValidationError`]; nothing malformed
//! reaches the graph or the ledger.
//!
//! On disk, an event log is JSON lines:
//!
//! ```text
//! {"type":"relationship","a":"alice","b":"bob","kind":"professional","strength":80,"timestamp":1700000000}
//! {"type":"attestation","claim_id":"relationship:alice:bob:professional","attester_id":"carol","kind":"verify","confidence":90,"timestamp":1700000100}
//! {"type":"relationship_removed","a":"alice","b":"bob","kind":"professional"}
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::attestation::{Attestation, AttestationKind};
use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::error::{IngestError, ValidationError};
use crate::graph::{MAX_STRENGTH, RelationshipKind};

/// A relationship was observed with some strength.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEvent {
    pub a: String,
    pub b: String,
    pub kind: String,
    pub strength: i64,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A relationship was retracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRemovedEvent {
    pub a: String,
    pub b: String,
    pub kind: String,
}

/// Someone attested to a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationEvent {
    pub claim_id: String,
    pub attester_id: String,
    pub kind: String,
    pub confidence: i64,
    pub timestamp: Timestamp,
}

/// One raw event from the ingestion stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrustEvent {
    Relationship(RelationshipEvent),
    RelationshipRemoved(RelationshipRemovedEvent),
    Attestation(AttestationEvent),
}

/// A validated mutation, ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustCommand {
    UpsertEdge {
        a: EntityId,
        b: EntityId,
        kind: RelationshipKind,
        strength: u8,
        timestamp: Timestamp,
        label: Option<String>,
    },
    RemoveEdge {
        a: EntityId,
        b: EntityId,
        kind: RelationshipKind,
    },
    Attest(Attestation),
}

impl TrustEvent {
    pub fn relationship(
        a: &str,
        b: &str,
        kind: RelationshipKind,
        strength: i64,
        timestamp: Timestamp,
    ) -> Self {
        Self::Relationship(RelationshipEvent {
            a: a.to_owned(),
            b: b.to_owned(),
            kind: kind.as_str().to_owned(),
            strength,
            timestamp,
            label: None,
        })
    }

    pub fn removal(a: &str, b: &str, kind: RelationshipKind) -> Self {
        Self::RelationshipRemoved(RelationshipRemovedEvent {
            a: a.to_owned(),
            b: b.to_owned(),
            kind: kind.as_str().to_owned(),
        })
    }

    pub fn attestation(
        claim_id: &str,
        attester_id: &str,
        kind: AttestationKind,
        confidence: i64,
        timestamp: Timestamp,
    ) -> Self {
        Self::Attestation(AttestationEvent {
            claim_id: claim_id.to_owned(),
            attester_id: attester_id.to_owned(),
            kind: kind.as_str().to_owned(),
            confidence,
            timestamp,
        })
    }

    /// Event type name as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Relationship(_) => "relationship",
            Self::RelationshipRemoved(_) => "relationship_removed",
            Self::Attestation(_) => "attestation",
        }
    }

    /// Check ranges, kinds and identifiers.
    pub fn validate(&self) -> Result<TrustCommand, ValidationError> {
        match self {
            Self::Relationship(e) => {
                let (a, b) = endpoints(&e.a, &e.b)?;
                let kind: RelationshipKind = e.kind.parse()?;
                if !(0..=MAX_STRENGTH as i64).contains(&e.strength) {
                    return Err(ValidationError::StrengthOutOfRange { value: e.strength });
                }
                Ok(TrustCommand::UpsertEdge {
                    a,
                    b,
                    kind,
                    strength: e.strength as u8,
                    timestamp: e.timestamp,
                    label: e.label.clone(),
                })
            }
            Self::RelationshipRemoved(e) => {
                let (a, b) = endpoints(&e.a, &e.b)?;
                let kind: RelationshipKind = e.kind.parse()?;
                Ok(TrustCommand::RemoveEdge { a, b, kind })
            }
            Self::Attestation(e) => {
                let claim = ClaimId::parse(e.claim_id.as_str(), "claim_id")?;
                let attester = EntityId::parse(e.attester_id.as_str(), "attester_id")?;
                let kind: AttestationKind = e.kind.parse()?;
                let attestation = Attestation::new(claim, attester, kind, e.confidence, e.timestamp)?;
                Ok(TrustCommand::Attest(attestation))
            }
        }
    }
}

fn endpoints(a: &str, b: &str) -> Result<(EntityId, EntityId), ValidationError> {
    let a = EntityId::parse(a, "a")?;
    let b = EntityId::parse(b, "b")?;
    if a == b {
        return Err(ValidationError::SelfEdge {
            entity: a.to_string(),
        });
    }
    Ok((a, b))
}

/// Parse JSON-lines text. Blank lines are skipped; line numbers are 1-based.
pub fn parse_event_log(text: &str) -> Result<Vec<TrustEvent>, IngestError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| IngestError::Parse {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse a JSON-lines event log.
pub fn read_event_log(path: &Path) -> Result<Vec<TrustEvent>, IngestError> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let events = parse_event_log(&text)?;
    tracing::debug!(path = %path.display(), events = events.len(), "read event log");
    Ok(events)
}
