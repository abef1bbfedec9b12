use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

use civic_graph::{
    merge_entities, DuplicateScanner, EntityCandidate, EntityStore, EntityType, IdentifierKind,
    MatchMethod, ResolutionEngine,
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("import") => {
            let csv_path = args.get(2).map(PathBuf::from);
            let csv_path = csv_path.context("usage: civic-graph import <observations.csv>")?;
            run_import(&csv_path)
        }
        Some("dedupe") => {
            let threshold = match args.get(2) {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("invalid threshold {raw:?}"))?,
                None => 0.85,
            };
            run_dedupe(threshold)
        }
        Some("merge") => {
            let (primary, duplicate) = match (args.get(2), args.get(3)) {
                (Some(p), Some(d)) => (p.clone(), d.clone()),
                _ => bail!("usage: civic-graph merge <primary-id> <duplicate-id>"),
            };
            run_merge(&primary, &duplicate)
        }
        Some("stats") => run_stats(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("civic-graph {}", civic_graph::VERSION);
    println!();
    println!("Usage:");
    println!("  civic-graph import <observations.csv>   Resolve observations into the graph");
    println!("  civic-graph dedupe [threshold]          Scan for likely-duplicate entities");
    println!("  civic-graph merge <primary> <duplicate> Fold a confirmed duplicate into its primary");
    println!("  civic-graph stats                       Entity counts by type");
    println!();
    println!("Database path comes from CIVIC_GRAPH_DB (default: civic-graph.db)");
}

fn db_path() -> PathBuf {
    env::var("CIVIC_GRAPH_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("civic-graph.db"))
}

// ============================================================================
// OBSERVATION ROW
// ============================================================================

/// One CSV row of observations to resolve.
///
/// Expected header:
/// `name,type,source,tax_id,registry_id,election_id,aliases`
/// with `aliases` as a `;`-separated list. Identifier columns may be blank.
#[derive(Debug, Deserialize)]
struct ObservationRow {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
    source: String,
    #[serde(default)]
    tax_id: String,
    #[serde(default)]
    registry_id: String,
    #[serde(default)]
    election_id: String,
    #[serde(default)]
    aliases: String,
}

impl ObservationRow {
    fn into_candidate(self) -> EntityCandidate {
        let mut candidate = EntityCandidate::new(
            self.name,
            EntityType::from_str_lossy(&self.entity_type),
            self.source,
        );
        for (kind, value) in [
            (IdentifierKind::TaxId, self.tax_id),
            (IdentifierKind::RegistryId, self.registry_id),
            (IdentifierKind::ElectionId, self.election_id),
        ] {
            if !value.trim().is_empty() {
                candidate = candidate.with_identifier(kind, value.trim());
            }
        }
        for alias in self.aliases.split(';') {
            let alias = alias.trim();
            if !alias.is_empty() {
                candidate = candidate.with_alias(alias);
            }
        }
        candidate
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_import(csv_path: &Path) -> Result<()> {
    println!("📂 Loading observations from {}...", csv_path.display());
    let mut reader = csv::Reader::from_path(csv_path).context("failed to open observations CSV")?;

    let store = EntityStore::open(&db_path())?;
    let engine = ResolutionEngine::new();

    let mut created = 0usize;
    let mut matched = 0usize;
    let mut failed = 0usize;

    for (line, result) in reader.deserialize::<ObservationRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                eprintln!("✗ Row {}: unreadable ({e})", line + 2);
                failed += 1;
                continue;
            }
        };
        let candidate = row.into_candidate();
        match engine.resolve(&store, &candidate) {
            Ok(resolved) if resolved.is_new => created += 1,
            Ok(resolved) => {
                matched += 1;
                if resolved.matched_by == MatchMethod::Fuzzy {
                    println!(
                        "  ~ {:?} matched entity {} (fuzzy, {:.3})",
                        candidate.name, resolved.entity_id, resolved.confidence
                    );
                }
            }
            Err(e) => {
                eprintln!("✗ Row {}: {e:#}", line + 2);
                failed += 1;
            }
        }
    }

    println!("✓ Created:  {created} entities");
    println!("✓ Matched:  {matched} observations");
    if failed > 0 {
        println!("✗ Failed:   {failed} rows");
    }
    println!("✓ Database now holds {} entities", store.count_entities()?);

    Ok(())
}

fn run_dedupe(threshold: f64) -> Result<()> {
    let store = EntityStore::open(&db_path())?;
    let scanner = DuplicateScanner::new();

    println!("🔍 Scanning for duplicate pairs (threshold {threshold:.2})...");
    let pairs = scanner.find_duplicates(&store, threshold)?;

    if pairs.is_empty() {
        println!("✓ No likely duplicates found");
        return Ok(());
    }

    for pair in &pairs {
        println!(
            "  {:.3}  {:?} <> {:?}\n         {} <> {}",
            pair.score, pair.name_1, pair.name_2, pair.entity_id_1, pair.entity_id_2
        );
    }
    println!("✓ {} candidate pairs (review before merging)", pairs.len());

    Ok(())
}

fn run_merge(primary_id: &str, duplicate_id: &str) -> Result<()> {
    let store = EntityStore::open(&db_path())?;

    merge_entities(&store, primary_id, duplicate_id)?;
    println!("✓ Merged {duplicate_id} into {primary_id}");

    Ok(())
}

fn run_stats() -> Result<()> {
    let store = EntityStore::open(&db_path())?;

    println!("📊 Entities by type:");
    for (entity_type, count) in store.count_entities_by_type()? {
        println!("  {entity_type:<14} {count}");
    }
    println!("✓ Total: {}", store.count_entities()?);

    Ok(())
}
