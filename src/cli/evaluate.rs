//! Evaluate command - explain why two participants can or cannot be paired.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;

use crate::cli::{load_snapshot, EngineArgs, OutputFormat};
use crate::core::participant::Participant;
use crate::core::types::ParticipantId;
use crate::matching::compatibility::{Compatibility, CompatibilityModel};
use crate::pool::Snapshot;

/// Arguments for the evaluate command
#[derive(Args)]
pub struct EvaluateArgs {
    /// Pool file (JSON with participants and meeting history)
    #[arg(required = true)]
    pub pool: PathBuf,

    /// First participant id
    #[arg(required = true)]
    pub a: i64,

    /// Second participant id
    #[arg(required = true)]
    pub b: i64,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Execute the evaluate command
///
/// # Errors
///
/// Returns an error if the pool cannot be loaded or either participant is missing.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: EvaluateArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = args.engine.to_config()?;
    let snapshot = load_snapshot(&args.pool, None)?;

    if verbose {
        eprintln!(
            "Loaded {} participants ({} records skipped)",
            snapshot.participants.len(),
            snapshot.skipped.len()
        );
    }

    let a = find_participant(&snapshot, args.a, &args.pool)?;
    let b = find_participant(&snapshot, args.b, &args.pool)?;

    let model = CompatibilityModel::new(config.weight_floor);
    let result = model.evaluate(a, b);

    match format {
        OutputFormat::Text => print_text_result(a, b, result),
        OutputFormat::Json => print_json_result(a, b, result)?,
        OutputFormat::Tsv => print_tsv_result(a, b, result),
    }
    Ok(())
}

fn find_participant<'a>(
    snapshot: &'a Snapshot,
    id: i64,
    pool: &Path,
) -> anyhow::Result<&'a Participant> {
    snapshot
        .participants
        .iter()
        .find(|p| p.id == ParticipantId(id))
        .with_context(|| format!("participant {id} not found in {}", pool.display()))
}

fn print_text_result(a: &Participant, b: &Participant, result: Compatibility) {
    println!("\n{} ({}) and {} ({})", a.id, a.role, b.id, b.role);
    match result {
        Compatibility::Allowed { weight } => {
            println!("   Allowed, weight {weight} ({} shared interests)", a.shared_interests(b));
        }
        Compatibility::Excluded { reason } => println!("   Excluded: {reason}"),
    }
}

fn print_json_result(a: &Participant, b: &Participant, result: Compatibility) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "a": a.id,
        "b": b.id,
        "shared_interests": a.shared_interests(b),
        "result": result,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv_result(a: &Participant, b: &Participant, result: Compatibility) {
    println!("a\tb\tallowed\tweight\treason");
    let weight = result.weight().map(|w| w.to_string()).unwrap_or_default();
    let reason = result.exclusion().map(|r| r.to_string()).unwrap_or_default();
    println!("{}\t{}\t{}\t{weight}\t{reason}", a.id, b.id, result.is_allowed());
}
