// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # trust-graph
//!
//! A trust graph and conviction engine. Entities are joined by weighted,
//! typed relationships; third parties attest to claims; the engine scores
//! each claim's conviction and finds the strongest trust paths between
//! entities.
//!
//! ## Architecture
//!
//! - **Graph store** (`graph`): sharded in-memory adjacency with per-entity
//!   serialized writers and timestamp-ordered strength history
//! - **Attestation ledger** (`attestation`): append-only attestations per claim
//! - **Conviction** (`conviction`): pure, reputation-weighted, time-decayed scoring
//! - **Path finder** (`pathfind`): best-first strongest-path search within a hop bound
//! - **Score cache** (`cache`): event-invalidated memoization of paths and scores
//! - **Ingestion** (`ingest`): validation of raw relationship and attestation events
//!
//! ## Library usage
//!
//! ```no_run
//! use trust_graph::engine::TrustEngine;
//! use trust_graph::config::EngineConfig;
//! use trust_graph::graph::RelationshipKind;
//!
//! let engine = TrustEngine::new(EngineConfig::default()).unwrap();
//! let kind = RelationshipKind::Professional;
//! engine.upsert_edge(&"alice".into(), &"bob".into(), kind, 80, 1_700_000_000).unwrap();
//! engine.upsert_edge(&"bob".into(), &"carol".into(), kind, 90, 1_700_000_000).unwrap();
//! let path = engine.find_path(&engine.path_query("alice", "carol")).unwrap();
//! assert_eq!(path.hop_count, 2);
//! ```

pub mod attestation;
pub mod cache;
pub mod config;
pub mod conviction;
pub mod engine;
pub mod entity;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod pathfind;
pub mod reputation;
pub mod temporal;
