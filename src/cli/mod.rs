//! Command-line interface for pair-solver.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **solve**: Match the participants of a pool file once and print the pairs
//! - **evaluate**: Explain whether two participants may be paired and their weight
//! - **run**: Start the weekly scheduling loop (or a single cycle with `--once`)
//! - **state**: Initialize or inspect the persisted next-run time
//!
//! ## Usage
//!
//! ```text
//! # One-off matching of a pool file
//! pair-solver solve pool.json
//!
//! # JSON output for scripting
//! pair-solver solve pool.json --format json
//!
//! # Why are 101 and 102 never paired?
//! pair-solver evaluate pool.json 101 102
//!
//! # Schedule the first run, then start the loop
//! pair-solver state init --state state.json --at 2024-05-06T12:00:00Z
//! pair-solver run --pool pool.json --state state.json --outbox outbox.jsonl
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::matching::engine::EngineConfig;
use crate::pool::{build_snapshot, JsonPool, Snapshot};

pub mod evaluate;
pub mod run;
pub mod solve;
pub mod state;

#[derive(Parser)]
#[command(name = "pair-solver")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Pair waiting participants into one-on-one meetings")]
#[command(
    long_about = "pair-solver pairs participants from a waiting pool into one-on-one coffee chats.\n\nIt never pairs people who already met, have different roles, share a group or workplace, or cannot agree on a meeting format or place, and among the allowed pairings it picks the set with the most shared interests in total."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Match a pool file once and print the result
    Solve(solve::SolveArgs),

    /// Explain the compatibility of two participants
    Evaluate(evaluate::EvaluateArgs),

    /// Run the weekly matching loop
    Run(run::RunArgs),

    /// Manage the persisted next-run time
    State(state::StateArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Engine settings shared by the commands that solve
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// JSON file with engine settings (flags below override it)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Time budget for one solve, in seconds
    #[arg(long)]
    pub time_limit: Option<f64>,

    /// Weight added to every allowed pair on top of shared interests
    #[arg(long)]
    pub weight_floor: Option<i64>,

    /// Threads used to build the compatibility graph
    #[arg(long)]
    pub workers: Option<usize>,
}

impl EngineArgs {
    /// Merge the config file (if any) with the command-line overrides
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is invalid or the result fails validation.
    pub fn to_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(secs) = self.time_limit {
            config.time_limit = Duration::try_from_secs_f64(secs)
                .with_context(|| format!("invalid --time-limit {secs}"))?;
        }
        if let Some(weight_floor) = self.weight_floor {
            config.weight_floor = weight_floor;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Load a pool file and build the snapshot of everyone who joined before `before`
/// (everyone, when no cutoff is given)
pub(crate) fn load_snapshot(path: &Path, before: Option<DateTime<Utc>>) -> anyhow::Result<Snapshot> {
    let data = JsonPool::new(path)
        .load()
        .with_context(|| format!("failed to load pool {}", path.display()))?;
    Ok(build_snapshot(&data, before.unwrap_or(DateTime::<Utc>::MAX_UTC)))
}
