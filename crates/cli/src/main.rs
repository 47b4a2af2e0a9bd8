//! jobmill CLI - run jobs on a bounded worker pool.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use jobmill_core::{JobId, WorkArgs, WorkOutcome, WorkResult};
use jobmill_execution::ExecutorFlavor;
use jobmill_work::{JobManager, JobManagerConfig, JobResults, PoolJobManager};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobmill")]
#[command(about = "Run jobs of independent work items on a bounded worker pool", long_about = None)]
struct Cli {
    #[command(flatten)]
    manager: ManagerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ManagerArgs {
    /// Manager name used in logs
    #[arg(long, default_value = "jobmill")]
    name: String,
    /// Worker count (0 = available processing units)
    #[arg(long, default_value = "0")]
    max_workers: usize,
    /// Run callables directly on the worker tasks
    #[arg(long)]
    inline: bool,
    /// Upper bound between wait re-checks, in milliseconds
    #[arg(long, default_value = "500")]
    poll_ms: u64,
}

impl ManagerArgs {
    fn config(&self) -> JobManagerConfig {
        let flavor = if self.inline {
            ExecutorFlavor::Inline
        } else {
            ExecutorFlavor::Blocking
        };
        JobManagerConfig::new()
            .with_name(self.name.clone())
            .with_max_workers(self.max_workers)
            .with_flavor(flavor)
            .with_wait_poll_interval(Duration::from_millis(self.poll_ms))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Sleep once per duration and report every item
    Sleep {
        /// Durations in seconds
        #[arg(required = true)]
        seconds: Vec<f64>,
        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Run an item that fails and show how the failure is reported
    Fail {
        /// Message carried by the error
        #[arg(long, default_value = "boom")]
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct DemoError(String);

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn parse_timeout(seconds: Option<f64>) -> Result<Option<Duration>> {
    seconds
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid --timeout")
}

fn sleep_for(args: WorkArgs) -> WorkOutcome {
    let seconds = args.arg(0).and_then(Value::as_f64).unwrap_or(0.0);
    std::thread::sleep(Duration::try_from_secs_f64(seconds)?);
    Ok(json!({ "slept": seconds }))
}

fn print_results(job_id: &JobId, results: &JobResults) {
    println!("Job {} ({} items)", job_id, results.len());
    let mut items: Vec<_> = results.iter().collect();
    items.sort_by(|a, b| a.0.cmp(b.0));
    for (work_id, result) in items {
        print_result(work_id, result);
    }
}

fn print_result(work_id: &impl std::fmt::Display, result: &WorkResult) {
    let values = serde_json::to_string(result).unwrap_or_else(|_| "{}".to_string());
    println!("  {} | {} | {}", work_id, result.status(), values);
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let manager = PoolJobManager::new(cli.manager.config())?;

    match cli.command {
        Commands::Sleep { seconds, timeout } => {
            let timeout = parse_timeout(timeout)?;
            let arg_list: Vec<Value> = seconds.into_iter().map(Value::from).collect();
            let submission = manager
                .async_map(sleep_for, arg_list, Map::new())
                .context("job manager refused the job")?;

            manager.wait(Some(&submission.job_id), None, timeout).await?;

            let results = manager
                .get_results(&submission.job_id)?
                .context("job still has pending work items")?;
            print_results(&submission.job_id, &results);
        }
        Commands::Fail { message } => {
            let submission = manager
                .async_map(
                    move |_| Err(DemoError(message.clone()).into()),
                    [Value::Null],
                    Map::new(),
                )
                .context("job manager refused the job")?;
            let work_id = &submission.work_ids[0];

            manager.wait(Some(&submission.job_id), Some(work_id), None).await?;
            let status = manager.get_status(&submission.job_id, work_id)?;
            let result = manager
                .get_work_result(&submission.job_id, work_id)?
                .context("work item still pending")?;

            println!("Status: {}", status);
            println!("Message: {}", result.failure_message().unwrap_or("-"));
        }
    }

    manager.shutdown(true).await;
    info!("Done");
    Ok(())
}
