//! Conviction scoring: aggregate a claim's attestations into a 0–100 score.
//!
//! Each attestation contributes one signed weight:
//!
//! ```text
//! signed_weight = base_weight(kind)
//!               × reputation_multiplier(attester)   // 0.5 ..= 2.0
//!               × 0.5 ^ (age_days / half_life)      // 180-day half-life
//!               × confidence / 100
//! ```
//!
//! The weights are summed and normalized by their total magnitude into
//! `[-1, 1]`, then mapped onto `[0, 100]` around a neutral 50. An empty
//! attestation set scores 0 ("no evidence"), which no non-empty set can reach.
//!
//! The calculator is a pure function of `(attestations, reputation, now)`:
//! no hidden state, safe to cancel and retry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::attestation::{Attestation, AttestationKind};
use crate::entity::{ClaimId, EntityId, Timestamp};
use crate::reputation::{DEFAULT_REPUTATION, ReputationSource};
use crate::temporal::{age_days, half_life_decay};

/// Lower bound of the reputation multiplier (reputation 0).
pub const MIN_REPUTATION_MULTIPLIER: f64 = 0.5;
/// Upper bound of the reputation multiplier (reputation 100).
pub const MAX_REPUTATION_MULTIPLIER: f64 = 2.0;

/// Tunables for conviction scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvictionConfig {
    /// Attestations lose half their weight every `half_life_days`.
    pub half_life_days: f64,
    /// Reputation assumed for unknown attesters and failed lookups.
    pub default_reputation: u8,
    /// Minimum normalization denominator. Evidence lighter than one full
    /// vote is pulled toward neutral instead of saturating the score.
    pub saturation: f64,
    /// Width in days of each trend bucket.
    pub trend_window_days: f64,
    /// Recent attestations required before a trend is reported.
    pub trend_min_recent: usize,
    /// Cached scores older than this are recomputed, since decay moves the
    /// score even without new attestations.
    pub recompute_interval_secs: u64,
}

impl Default for ConvictionConfig {
    fn default() -> Self {
        Self {
            half_life_days: 180.0,
            default_reputation: DEFAULT_REPUTATION,
            saturation: 1.0,
            trend_window_days: 30.0,
            trend_min_recent: 3,
            recompute_interval_secs: 3600,
        }
    }
}

/// Direction of recent attestation activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Stable,
    Decreasing,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Increasing => write!(f, "increasing"),
            Self::Stable => write!(f, "stable"),
            Self::Decreasing => write!(f, "decreasing"),
        }
    }
}

/// Unweighted tallies per attestation kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCounts {
    pub verify: usize,
    pub dispute: usize,
    pub strengthen: usize,
    pub weaken: usize,
}

impl KindCounts {
    fn tally(&mut self, kind: AttestationKind) {
        match kind {
            AttestationKind::Verify => self.verify += 1,
            AttestationKind::Dispute => self.dispute += 1,
            AttestationKind::Strengthen => self.strengthen += 1,
            AttestationKind::Weaken => self.weaken += 1,
        }
    }
}

/// The network's aggregated confidence in one claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvictionScore {
    pub claim_id: ClaimId,
    pub score: u8,
    pub attestation_count: usize,
    pub counts: KindCounts,
    pub trend: Trend,
    pub top_attester_reputation: u8,
    pub last_updated: Timestamp,
}

/// One attestation's factors, for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub attester_id: EntityId,
    pub kind: AttestationKind,
    /// Reputation used for the multiplier.
    pub reputation: u8,
    /// Whether `reputation` came from the source rather than the default.
    pub reputation_resolved: bool,
    pub base_weight: f64,
    pub reputation_multiplier: f64,
    pub decay: f64,
    pub confidence_scale: f64,
    pub signed_weight: f64,
}

/// A score together with the sums and per-attestation factors behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvictionBreakdown {
    pub score: ConvictionScore,
    pub weighted_sum: f64,
    pub total_magnitude: f64,
    pub contributions: Vec<Contribution>,
}

/// Below this, a normalized sum is treated as exact cancellation.
const CANCELLATION_EPSILON: f64 = 1e-9;

/// Points away from the neutral 50 for a normalized sum in `[-1, 1]`.
///
/// Any net evidence moves the score at least one point, so 50 means exactly
/// balanced (or weightless) evidence.
fn neutral_offset(normalized: f64) -> f64 {
    let offset = (normalized * 50.0).round();
    if normalized > CANCELLATION_EPSILON {
        offset.max(1.0)
    } else if normalized < -CANCELLATION_EPSILON {
        offset.min(-1.0)
    } else {
        0.0
    }
}

/// Linear map of reputation `[0, 100]` onto `[0.5, 2.0]`.
pub fn reputation_multiplier(reputation: u8) -> f64 {
    let r = reputation.min(100) as f64 / 100.0;
    MIN_REPUTATION_MULTIPLIER + r * (MAX_REPUTATION_MULTIPLIER - MIN_REPUTATION_MULTIPLIER)
}

/// Stateless conviction calculator.
#[derive(Debug, Clone, Default)]
pub struct ConvictionCalculator {
    config: ConvictionConfig,
}

impl ConvictionCalculator {
    pub fn new(config: ConvictionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConvictionConfig {
        &self.config
    }

    /// Score a claim's attestations at `now`.
    ///
    /// Input is assumed pre-validated (confidence in range, known kinds).
    pub fn calculate(
        &self,
        claim: &ClaimId,
        attestations: &[Attestation],
        reputation: &dyn ReputationSource,
        now: Timestamp,
    ) -> ConvictionScore {
        self.calculate_with_breakdown(claim, attestations, reputation, now)
            .score
    }

    /// Score a claim and keep every intermediate factor.
    pub fn calculate_with_breakdown(
        &self,
        claim: &ClaimId,
        attestations: &[Attestation],
        reputation: &dyn ReputationSource,
        now: Timestamp,
    ) -> ConvictionBreakdown {
        let mut counts = KindCounts::default();
        let mut weighted_sum = 0.0_f64;
        let mut total_magnitude = 0.0_f64;
        let mut top_reputation: Option<u8> = None;
        let mut resolved: HashMap<&EntityId, Option<u8>> = HashMap::new();
        let mut contributions = Vec::with_capacity(attestations.len());

        for attestation in attestations {
            counts.tally(attestation.kind);

            let known = *resolved
                .entry(&attestation.attester_id)
                .or_insert_with(|| self.lookup(reputation, &attestation.attester_id));
            if let Some(r) = known {
                top_reputation = Some(top_reputation.map_or(r, |top| top.max(r)));
            }
            let rep = known.unwrap_or(self.config.default_reputation);

            let base_weight = attestation.kind.base_weight();
            let multiplier = reputation_multiplier(rep);
            let decay = half_life_decay(
                age_days(attestation.created_at, now),
                self.config.half_life_days,
            );
            let confidence_scale = attestation.confidence.min(100) as f64 / 100.0;
            let signed_weight = base_weight * multiplier * decay * confidence_scale;

            weighted_sum += signed_weight;
            total_magnitude += signed_weight.abs();

            contributions.push(Contribution {
                attester_id: attestation.attester_id.clone(),
                kind: attestation.kind,
                reputation: rep,
                reputation_resolved: known.is_some(),
                base_weight,
                reputation_multiplier: multiplier,
                decay,
                confidence_scale,
                signed_weight,
            });
        }

        let score = if attestations.is_empty() {
            0
        } else if total_magnitude == 0.0 {
            50
        } else {
            let normalized = weighted_sum / total_magnitude.max(self.config.saturation);
            (50.0 + neutral_offset(normalized)).clamp(1.0, 100.0) as u8
        };

        ConvictionBreakdown {
            score: ConvictionScore {
                claim_id: claim.clone(),
                score,
                attestation_count: attestations.len(),
                counts,
                trend: self.trend(attestations, now),
                top_attester_reputation: top_reputation.unwrap_or(0),
                last_updated: now,
            },
            weighted_sum,
            total_magnitude,
            contributions,
        }
    }

    /// Resolve one attester; failures degrade to "unknown".
    fn lookup(&self, reputation: &dyn ReputationSource, attester: &EntityId) -> Option<u8> {
        match reputation.reputation(attester) {
            Ok(r) => r.map(|r| r.min(100)),
            Err(err) => {
                tracing::warn!(attester = %attester, error = %err, "reputation lookup failed, using default");
                None
            }
        }
    }

    /// Compare net verifications in the recent window against the window before.
    ///
    /// A non-positive previous net is treated as a baseline of 1, so the ratio
    /// thresholds stay meaningful: "increasing" then needs a recent net of at
    /// least 2, "decreasing" a recent net of 0 or below.
    fn trend(&self, attestations: &[Attestation], now: Timestamp) -> Trend {
        let window = self.config.trend_window_days;
        let mut recent_len = 0usize;
        let mut recent_net = 0i64;
        let mut previous_net = 0i64;

        for a in attestations {
            let age = age_days(a.created_at, now);
            let signal = match a.kind {
                AttestationKind::Verify => 1,
                AttestationKind::Dispute => -1,
                AttestationKind::Strengthen | AttestationKind::Weaken => 0,
            };
            if age <= window {
                recent_len += 1;
                recent_net += signal;
            } else if age <= 2.0 * window {
                previous_net += signal;
            }
        }

        if recent_len < self.config.trend_min_recent {
            return Trend::Stable;
        }

        let baseline = if previous_net <= 0 { 1.0 } else { previous_net as f64 };
        let recent = recent_net as f64;
        if recent > 1.5 * baseline {
            Trend::Increasing
        } else if recent < 0.5 * baseline {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}
