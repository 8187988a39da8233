//! Solve command - match the participants of a pool file once.
//!
//! Prints the chosen pairs, everyone left over, and per-role totals. Nothing is
//! written back to the pool.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;

use crate::cli::{load_snapshot, EngineArgs, OutputFormat};
use crate::core::types::Role;
use crate::matching::engine::{EngineError, MatchingEngine};
use crate::matching::outcome::MatchOutcome;

/// Arguments for the solve command
#[derive(Args)]
pub struct SolveArgs {
    /// Pool file (JSON with participants and meeting history)
    #[arg(required = true)]
    pub pool: PathBuf,

    /// Only consider participants who joined before this time (RFC 3339)
    #[arg(long)]
    pub before: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Execute the solve command
///
/// # Errors
///
/// Returns an error if the pool cannot be loaded or the engine config is invalid.
/// Running out of time budget is not an error: the best-effort result is printed.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: SolveArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let config = args.engine.to_config()?;
    let snapshot = load_snapshot(&args.pool, args.before)?;

    if verbose {
        eprintln!(
            "Loaded {} participants ({} records skipped)",
            snapshot.participants.len(),
            snapshot.skipped.len()
        );
        for skipped in &snapshot.skipped {
            eprintln!("  skipped: {skipped}");
        }
    }

    let engine = MatchingEngine::new(config)?;
    let (outcome, timed_out) = match engine.solve(snapshot.participants) {
        Ok(outcome) => (outcome, false),
        Err(EngineError::Timeout {
            elapsed,
            best_effort,
        }) => {
            eprintln!(
                "Warning: time budget exhausted after {:.1}s, showing best effort",
                elapsed.as_secs_f64()
            );
            (best_effort, true)
        }
        Err(err) => return Err(err.into()),
    };

    match format {
        OutputFormat::Text => print_text_outcome(&outcome, timed_out),
        OutputFormat::Json => print_json_outcome(&outcome, timed_out)?,
        OutputFormat::Tsv => print_tsv_outcome(&outcome),
    }

    Ok(())
}

fn print_text_outcome(outcome: &MatchOutcome, timed_out: bool) {
    println!(
        "\nMatched {} pairs (total weight {}){}",
        outcome.pairs.len(),
        outcome.total_weight(),
        if timed_out { " [best effort]" } else { "" }
    );
    for pair in &outcome.pairs {
        println!("   {pair}");
    }

    if outcome.free.is_empty() {
        println!("\nEveryone was matched");
    } else {
        let free: Vec<String> = outcome.free.iter().map(ToString::to_string).collect();
        println!("\nUnmatched ({}): {}", outcome.free.len(), free.join(", "));
    }

    println!();
    for (role, counts) in outcome.summary_by_role() {
        println!(
            "   {role}: {} total, {} matched, {} free",
            counts.total, counts.matched, counts.free
        );
    }
}

fn print_json_outcome(outcome: &MatchOutcome, timed_out: bool) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "pairs": outcome.pairs,
        "free": outcome.free,
        "total_weight": outcome.total_weight(),
        "by_role": outcome.summary_by_role(),
        "best_effort": timed_out,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv_outcome(outcome: &MatchOutcome) {
    println!("status\tparticipant\tpartner\trole\tweight");
    for pair in &outcome.pairs {
        for (id, partner) in [(pair.low, pair.high), (pair.high, pair.low)] {
            println!(
                "matched\t{id}\t{partner}\t{}\t{}",
                role_label(outcome.role_of(id)),
                pair.weight
            );
        }
    }
    for id in &outcome.free {
        println!("free\t{id}\t\t{}\t", role_label(outcome.role_of(*id)));
    }
}

fn role_label(role: Option<Role>) -> String {
    role.map(|r| r.to_string()).unwrap_or_default()
}
