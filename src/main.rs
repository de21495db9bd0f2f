//! trust-graph CLI: load event logs and query trust paths and conviction.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use trust_graph::attestation::{AttestationFilter, AttestationKind};
use trust_graph::config::EngineConfig;
use trust_graph::engine::TrustEngine;
use trust_graph::entity::{ClaimId, EntityId, Timestamp, now_secs};
use trust_graph::graph::RelationshipKind;
use trust_graph::ingest::read_event_log;
use trust_graph::reputation::{NoReputation, ReputationSource, StaticReputation};

#[derive(Parser)]
#[command(name = "trust-graph", version, about = "Trust graph and conviction engine")]
struct Cli {
    /// JSON-lines event log to replay before answering (repeatable, applied in order).
    #[arg(long, global = true)]
    events: Vec<PathBuf>,

    /// Engine configuration (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Reputation table: a JSON object of entity id to 0..=100.
    #[arg(long, global = true)]
    reputation: Option<PathBuf>,

    /// Evaluate time-dependent queries at this UNIX timestamp instead of now.
    #[arg(long, global = true)]
    at: Option<Timestamp>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Conviction score for a claim.
    Conviction {
        claim: String,

        /// Include per-attestation factors.
        #[arg(long)]
        breakdown: bool,

        /// Fail if the claim has no attestations instead of scoring 0.
        #[arg(long)]
        strict: bool,
    },

    /// Strongest trust path between two entities.
    Path {
        from: String,
        to: String,

        #[arg(long)]
        max_hops: Option<usize>,

        #[arg(long)]
        min_strength: Option<u8>,

        /// Only traverse these relationship kinds (repeatable).
        #[arg(long = "kind")]
        kinds: Vec<RelationshipKind>,

        /// Entities the path may not pass through (repeatable).
        #[arg(long)]
        exclude: Vec<String>,

        /// Skip relationships attested below this conviction.
        #[arg(long)]
        min_conviction: Option<u8>,
    },

    /// Relationships of an entity, strongest first.
    Neighbors {
        entity: String,

        #[arg(long, default_value = "0")]
        min_strength: u8,
    },

    /// Attestations for a claim, newest first.
    Attestations {
        claim: String,

        #[arg(long)]
        kind: Option<AttestationKind>,

        #[arg(long)]
        min_confidence: Option<u8>,

        /// Only attestations created before this UNIX timestamp.
        #[arg(long)]
        before: Option<Timestamp>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Network statistics and the most connected entities.
    Stats {
        /// Number of entities to list by degree.
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "trust_graph=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    let reputation: Arc<dyn ReputationSource> = match &cli.reputation {
        Some(path) => Arc::new(StaticReputation::from_json_file(path)?),
        None => Arc::new(NoReputation),
    };
    let engine = TrustEngine::with_reputation(config, reputation)?;

    for path in &cli.events {
        let events = read_event_log(path)?;
        let summary = engine.replay(events);
        if summary.rejected > 0 {
            eprintln!(
                "{}: {} events applied, {} rejected",
                path.display(),
                summary.applied,
                summary.rejected
            );
        }
    }

    let now = cli.at.unwrap_or_else(now_secs);

    match cli.command {
        Commands::Conviction {
            claim,
            breakdown,
            strict,
        } => {
            let claim = ClaimId::parse(claim, "claim")?;
            if strict {
                engine.require_conviction_at(&claim, now)?;
            }
            if breakdown {
                print_json(&engine.conviction_breakdown(&claim, now))?;
            } else {
                print_json(&engine.conviction_at(&claim, now))?;
            }
        }

        Commands::Path {
            from,
            to,
            max_hops,
            min_strength,
            kinds,
            exclude,
            min_conviction,
        } => {
            let mut query = engine
                .path_query(EntityId::parse(from, "from")?, EntityId::parse(to, "to")?)
                .with_kinds(kinds)
                .excluding(exclude.into_iter().map(EntityId::from));
            if let Some(hops) = max_hops {
                query = query.with_max_hops(hops);
            }
            if let Some(strength) = min_strength {
                query = query.with_min_strength(strength);
            }
            if let Some(floor) = min_conviction {
                query = query.with_min_conviction(floor);
            }
            query.validate()?;
            match engine.find_path_at(&query, now) {
                Some(path) => print_json(&path)?,
                None => println!("null"),
            }
        }

        Commands::Neighbors {
            entity,
            min_strength,
        } => {
            let entity = EntityId::parse(entity, "entity")?;
            print_json(&engine.require_neighbors(&entity, min_strength)?)?;
        }

        Commands::Attestations {
            claim,
            kind,
            min_confidence,
            before,
            limit,
        } => {
            let claim = ClaimId::parse(claim, "claim")?;
            let filter = AttestationFilter {
                kind,
                min_confidence,
                before,
                limit,
            };
            print_json(&engine.attestations(&claim, &filter))?;
        }

        Commands::Stats { top } => {
            #[derive(Serialize)]
            struct Report {
                network: trust_graph::graph::analytics::NetworkStats,
                claims: usize,
                attestations: usize,
                top_degree: Vec<trust_graph::graph::analytics::DegreeCentrality>,
            }
            let mut top_degree = engine.degree_centrality();
            top_degree.truncate(top);
            print_json(&Report {
                network: engine.network_stats(),
                claims: engine.ledger().claim_count(),
                attestations: engine.ledger().attestation_count(),
                top_degree,
            })?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
