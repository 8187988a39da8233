//! Run command - the weekly matching loop.
//!
//! Reads participants from a pool file, keeps the next-run time in a state file, and
//! writes notifications to an outbox file (or only logs them when no outbox is
//! given). Stops on Ctrl-C between runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::cli::{EngineArgs, OutputFormat};
use crate::dispatch::{LogDispatcher, OutboxDispatcher, OutcomeDispatcher, TracingObserver};
use crate::matching::engine::MatchingEngine;
use crate::pool::JsonPool;
use crate::schedule::{
    Collaborators, CycleReport, FileNextRunStore, RunScheduler, SchedulerConfig, SystemClock,
};

/// Arguments for the run command
#[derive(Args)]
pub struct RunArgs {
    /// Pool file (JSON with participants and meeting history)
    #[arg(long, required = true)]
    pub pool: PathBuf,

    /// State file holding the next-run time (see `state init`)
    #[arg(long, required = true)]
    pub state: PathBuf,

    /// Append notifications as JSON lines to this file instead of only logging them
    #[arg(long)]
    pub outbox: Option<PathBuf>,

    /// Days between two runs
    #[arg(long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..=365))]
    pub period_days: u32,

    /// Seconds to wait before retrying when the state file is unavailable
    #[arg(long, default_value = "60")]
    pub retry_backoff: u64,

    /// Run a single cycle (waiting for it if necessary) and exit
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

/// Execute the run command
///
/// # Errors
///
/// Returns an error if the runtime cannot be created, the configuration is invalid,
/// or (with `--once`) the single cycle fails.
#[allow(clippy::needless_pass_by_value)] // CLI entry point, values from clap
pub fn run(args: RunArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let engine = MatchingEngine::new(args.engine.to_config()?)?;
    let config = SchedulerConfig {
        period: chrono::Duration::days(i64::from(args.period_days)),
        retry_backoff: Duration::from_secs(args.retry_backoff),
    };

    let dispatcher: Arc<dyn OutcomeDispatcher> = match &args.outbox {
        Some(path) => Arc::new(
            OutboxDispatcher::open(path)
                .with_context(|| format!("failed to open outbox {}", path.display()))?,
        ),
        None => Arc::new(LogDispatcher),
    };

    if verbose {
        eprintln!(
            "Pool: {}, state: {}, period: {} days",
            args.pool.display(),
            args.state.display(),
            args.period_days
        );
    }

    let collaborators = Collaborators {
        store: Arc::new(FileNextRunStore::new(&args.state)),
        source: Arc::new(JsonPool::new(&args.pool)),
        dispatcher,
        observer: Arc::new(TracingObserver),
        clock: Arc::new(SystemClock),
    };
    let scheduler = RunScheduler::new(collaborators, engine, config);

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(drive(scheduler, args.once, format))
}

async fn drive(mut scheduler: RunScheduler, once: bool, format: OutputFormat) -> anyhow::Result<()> {
    if once {
        let report = scheduler.run_cycle().await?;
        return print_report(&report, format);
    }

    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}

fn print_report(report: &CycleReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => {
            println!("\nRun for {}", report.run_at.to_rfc3339());
            println!(
                "   {} pairs, {} unmatched, total weight {}{}",
                report.outcome.pairs.len(),
                report.outcome.free.len(),
                report.outcome.total_weight(),
                if report.timed_out { " [best effort]" } else { "" }
            );
            println!(
                "   Notifications: {} pairs, {} unmatched, {} failed",
                report.dispatch.pairs_notified,
                report.dispatch.unmatched_notified,
                report.dispatch.failed()
            );
            println!("   Next run: {}", report.next_run.to_rfc3339());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "run_at": report.run_at,
                "next_run": report.next_run,
                "pairs": report.outcome.pairs,
                "free": report.outcome.free,
                "total_weight": report.outcome.total_weight(),
                "best_effort": report.timed_out,
                "dispatch": report.dispatch,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Tsv => {
            println!("run_at\tnext_run\tpairs\tfree\ttotal_weight\tfailed_notifications");
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}",
                report.run_at.to_rfc3339(),
                report.next_run.to_rfc3339(),
                report.outcome.pairs.len(),
                report.outcome.free.len(),
                report.outcome.total_weight(),
                report.dispatch.failed()
            );
        }
    }
    Ok(())
}
