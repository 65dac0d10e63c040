//! Demo application triggering each concurrency pitfall.
//!
//! Run with:
//! ```bash
//! cargo run --example demo --features demo -- --help
//! cargo run --example demo --features demo -- count --loops 1000000
//! cargo run --example demo --features demo -- fill --mode check-then-act --runs 20
//! cargo run --example demo --features demo -- context --leaky
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use contese::config::RunConfig;
use contese::context::ScopedTaskContext;
use contese::dispatcher::WorkerPool;
use contese::filler::FillMode;
use contese::observers::json::JsonObserver;
use contese::observers::table::{TableObserver, TableStyle};
use contese::report::RunReport;
use contese::scenarios::{compare_counting, fill_collection, handle_requests, ReleaseDiscipline};
use tracing::{error, info};

/// Output format for run reports.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Pretty table
    Table,
    /// Markdown table
    Markdown,
    /// JSON format
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeChoice {
    Locked,
    CheckThenAct,
}

impl From<ModeChoice> for FillMode {
    fn from(choice: ModeChoice) -> Self {
        match choice {
            ModeChoice::Locked => FillMode::Locked,
            ModeChoice::CheckThenAct => FillMode::CheckThenAct,
        }
    }
}

/// Reproduce check-then-act races, lock granularity costs and pooled-thread
/// context leaks.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of pool threads
    #[arg(short, long, default_value = "10", global = true)]
    workers: usize,

    /// Join barrier timeout in seconds
    #[arg(long, default_value = "3600", global = true)]
    timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Count random keys with the locked and the sharded map
    Count {
        /// Total number of increments
        #[arg(long, default_value = "10000000")]
        loops: u64,

        /// Number of distinct keys
        #[arg(long, default_value = "10")]
        keys: usize,
    },

    /// Fill a shared map up to a target size
    Fill {
        #[arg(long, value_enum, default_value = "check-then-act")]
        mode: ModeChoice,

        /// Entries present before filling
        #[arg(long, default_value = "900")]
        initial: usize,

        /// Target size
        #[arg(long, default_value = "1000")]
        target: usize,

        /// Number of repeated runs
        #[arg(long, default_value = "1")]
        runs: usize,
    },

    /// Serve requests on reused threads and show what each one saw first
    Context {
        /// Number of requests
        #[arg(long, default_value = "6")]
        requests: u64,

        /// Skip releasing the context after each request
        #[arg(long)]
        leaky: bool,
    },
}

fn render(format: OutputFormat, title: &str, reports: &[RunReport]) -> String {
    match format {
        OutputFormat::Table => TableObserver::new().with_title(title).render(reports),
        OutputFormat::Markdown => TableObserver::new()
            .with_style(TableStyle::Markdown)
            .with_title(title)
            .render(reports),
        OutputFormat::Json => JsonObserver::new()
            .pretty(true)
            .to_json(reports)
            .unwrap_or_else(|e| format!("Error: {}", e)),
    }
}

fn run(args: &Args) -> contese::Result<()> {
    let base = RunConfig::new()
        .with_worker_count(args.workers)
        .with_timeout(Duration::from_secs(args.timeout));

    match args.command {
        Command::Count { loops, keys } => {
            let config = base.with_loop_count(loops).with_key_space_size(keys);
            let reports = compare_counting(&config)?;
            println!("{}", render(args.format, "Counting", &reports));
        }

        Command::Fill {
            mode,
            initial,
            target,
            runs,
        } => {
            let config = base.with_initial_size(initial).with_target_size(target);
            let pool = WorkerPool::from_config(&config)?;
            let mut reports = Vec::with_capacity(runs);
            for run in 0..runs {
                let outcome = fill_collection(mode.into(), &config, &pool)?;
                info!(run, gaps = ?outcome.observed_gaps, overshoot = outcome.overshoot(), "fill run");
                reports.push(outcome.report);
            }
            println!("{}", render(args.format, "Fill", &reports));
        }

        Command::Context { requests, leaky } => {
            let config = base;
            let pool = WorkerPool::from_config(&config)?;
            let user = Arc::new(ScopedTaskContext::new().with_name("current_user"));
            let discipline = if leaky {
                ReleaseDiscipline::Leaky
            } else {
                ReleaseDiscipline::Scoped
            };

            let seen = handle_requests(&user, (1..=requests).collect(), discipline, &pool)?;
            for observation in &seen {
                println!(
                    "request {:>3} on {:<16} before={:?} after={:?}",
                    observation.request, observation.worker, observation.before, observation.after
                );
            }
            println!(
                "{} of {} requests saw a previous user",
                seen.iter().filter(|o| o.leaked()).count(),
                seen.len()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "run failed");
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
