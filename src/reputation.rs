//! Attester reputation: a read-only, pull-based lookup supplied by the host.
//!
//! Reputation is never computed or stored by this crate. A lookup can resolve
//! (`Ok(Some(r))`), not know the entity (`Ok(None)`), or fail (`Err`); the
//! conviction calculator degrades both of the latter to a default.

use std::collections::HashMap;
use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

use crate::entity::EntityId;
use crate::error::IngestError;

/// Reputation used when an attester is unknown or the lookup fails.
pub const DEFAULT_REPUTATION: u8 = 50;

/// A failed reputation lookup for one entity.
#[derive(Debug, Error, Diagnostic)]
#[error("reputation lookup failed for {entity}: {message}")]
#[diagnostic(
    code(trust::reputation::lookup),
    help("The reputation provider could not answer. The attester is scored with the default reputation.")
)]
pub struct ReputationError {
    pub entity: String,
    pub message: String,
}

/// Source of attester reputations in `[0, 100]`.
pub trait ReputationSource: Send + Sync {
    fn reputation(&self, entity: &EntityId) -> Result<Option<u8>, ReputationError>;
}

impl<F> ReputationSource for F
where
    F: Fn(&EntityId) -> Result<Option<u8>, ReputationError> + Send + Sync,
{
    fn reputation(&self, entity: &EntityId) -> Result<Option<u8>, ReputationError> {
        self(entity)
    }
}

/// A source that knows nobody; every attester gets the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReputation;

impl ReputationSource for NoReputation {
    fn reputation(&self, _entity: &EntityId) -> Result<Option<u8>, ReputationError> {
        Ok(None)
    }
}

/// Fixed reputation table, typically loaded from a JSON snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticReputation {
    scores: HashMap<EntityId, u8>,
}

impl StaticReputation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an entity's reputation, clamped to 100.
    pub fn with(mut self, entity: impl Into<EntityId>, reputation: u8) -> Self {
        self.insert(entity, reputation);
        self
    }

    pub fn insert(&mut self, entity: impl Into<EntityId>, reputation: u8) {
        self.scores.insert(entity.into(), reputation.min(100));
    }

    /// Load a JSON object of `{ "entity": reputation }`.
    pub fn from_json_file(path: &Path) -> Result<Self, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::Reputation {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let raw: HashMap<String, i64> =
            serde_json::from_str(&text).map_err(|e| IngestError::Reputation {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let mut table = Self::new();
        for (entity, score) in raw {
            if !(0..=100).contains(&score) {
                return Err(IngestError::Reputation {
                    path: path.display().to_string(),
                    message: format!("reputation {score} for {entity} is outside [0, 100]"),
                });
            }
            table.insert(entity, score as u8);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl ReputationSource for StaticReputation {
    fn reputation(&self, entity: &EntityId) -> Result<Option<u8>, ReputationError> {
        Ok(self.scores.get(entity).copied())
    }
}
