//! State command - create or inspect the persisted next-run time.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::cli::OutputFormat;
use crate::schedule::state::{FileNextRunStore, NextRunStore};

#[derive(Args)]
pub struct StateArgs {
    #[command(subcommand)]
    pub command: StateCommands,
}

#[derive(Subcommand)]
pub enum StateCommands {
    /// Store the time of the first run (fails if a time is already stored)
    Init {
        /// State file
        #[arg(long, required = true)]
        state: PathBuf,

        /// First run time (RFC 3339, e.g. 2024-05-06T12:00:00Z)
        #[arg(long, required = true)]
        at: DateTime<Utc>,
    },

    /// Show the stored next-run time
    Show {
        /// State file
        #[arg(long, required = true)]
        state: PathBuf,
    },
}

/// Execute the state command
///
/// # Errors
///
/// Returns an error if the state file cannot be read or written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: StateArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        StateCommands::Init { state, at } => {
            let store = FileNextRunStore::new(&state);
            store.initialize(at)?;
            if verbose {
                eprintln!("Initialized {}", state.display());
            }
            print_next_run(at, format)
        }
        StateCommands::Show { state } => {
            let store = FileNextRunStore::new(&state);
            print_next_run(store.get()?, format)
        }
    }
}

fn print_next_run(next_run: DateTime<Utc>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("Next run: {}", next_run.to_rfc3339()),
        OutputFormat::Json => {
            let output = serde_json::json!({ "next_run": next_run });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("next_run");
            println!("{}", next_run.to_rfc3339());
        }
    }
    Ok(())
}
