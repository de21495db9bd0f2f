//! Rich diagnostic error types for the trust graph engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know what was rejected and why.
//! "No path" and "no attestations" are valid empty results, never errors.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the trust graph engine.
#[derive(Debug, Error, Diagnostic)]
pub enum TrustError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Malformed input, rejected before it reaches the core algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ValidationError {
    #[error("strength {value} is outside [0, 100]")]
    #[diagnostic(
        code(trust::validation::strength_range),
        help("Relationship strength is an integer percentage. Rescale the value into 0..=100.")
    )]
    StrengthOutOfRange { value: i64 },

    #[error("confidence {value} is outside [0, 100]")]
    #[diagnostic(
        code(trust::validation::confidence_range),
        help("Attestation confidence is an integer percentage. Rescale the value into 0..=100.")
    )]
    ConfidenceOutOfRange { value: i64 },

    #[error("conviction floor {value} is outside [0, 100]")]
    #[diagnostic(
        code(trust::validation::conviction_range),
        help("Conviction scores run from 0 to 100. A higher floor would exclude every attested relationship.")
    )]
    ConvictionOutOfRange { value: i64 },

    #[error("unknown relationship kind: \"{kind}\"")]
    #[diagnostic(
        code(trust::validation::relationship_kind),
        help("Valid kinds are: professional, personal, family, social, civic, educational.")
    )]
    UnknownRelationshipKind { kind: String },

    #[error("unknown attestation kind: \"{kind}\"")]
    #[diagnostic(
        code(trust::validation::attestation_kind),
        help("Valid kinds are: verify, dispute, strengthen, weaken.")
    )]
    UnknownAttestationKind { kind: String },

    #[error("relationship endpoints are the same entity: {entity}")]
    #[diagnostic(
        code(trust::validation::self_edge),
        help("A relationship connects two distinct entities.")
    )]
    SelfEdge { entity: String },

    #[error("path requested from {entity} to itself")]
    #[diagnostic(
        code(trust::validation::self_path),
        help("A path needs two distinct endpoints; a zero-length path is not meaningful.")
    )]
    SelfPath { entity: String },

    #[error("empty {field} identifier")]
    #[diagnostic(
        code(trust::validation::empty_id),
        help("Entity and claim identifiers are opaque but must be non-empty.")
    )]
    EmptyId { field: &'static str },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("invalid edge: both endpoints are {entity}")]
    #[diagnostic(
        code(trust::graph::invalid_edge),
        help("Self-relationships are rejected. Check the participants of the relationship event.")
    )]
    InvalidEdge { entity: String },
}

// ---------------------------------------------------------------------------
// Not-found errors
// ---------------------------------------------------------------------------

/// Used only by strict query variants; empty results are not errors.
#[derive(Debug, Error, Diagnostic)]
pub enum NotFoundError {
    #[error("no attestations recorded for claim {claim_id}")]
    #[diagnostic(
        code(trust::not_found::claim),
        help("The claim has never been attested. Use the non-strict query to get a zero score instead.")
    )]
    Claim { claim_id: String },

    #[error("entity not found: {entity}")]
    #[diagnostic(
        code(trust::not_found::entity),
        help("Entities exist once a relationship or attestation references them.")
    )]
    Entity { entity: String },
}

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("failed to read event log: {path}")]
    #[diagnostic(
        code(trust::ingest::io),
        help("Check that the event log exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed event on line {line}: {message}")]
    #[diagnostic(
        code(trust::ingest::parse),
        help(
            "Each line of an event log is one JSON object with a \"type\" of \
             relationship, relationship_removed or attestation."
        )
    )]
    Parse { line: usize, message: String },

    #[error("failed to read reputation table: {path}")]
    #[diagnostic(
        code(trust::ingest::reputation),
        help("The reputation table is a JSON object mapping entity ids to integers in 0..=100.")
    )]
    Reputation { path: String, message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(trust::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}: {message}")]
    #[diagnostic(code(trust::config::parse), help("Check the TOML syntax in the config file."))]
    Parse { path: String, message: String },

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(trust::config::invalid), help("Check the EngineConfig fields. {message}"))]
    Invalid { message: String },
}

/// Convenience alias for functions returning trust graph results.
pub type TrustResult<T> = std::result::Result<T, TrustError>;
