//! CLI entry point for the one-shot transfer jobs.
//!
//! `migrate list` shows what is registered; `migrate run <job>` executes
//! one job against the environment selected with `--env`. Every run can be
//! rehearsed with `--dry-run`, which rolls back each transaction instead
//! of committing it.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use migrator::config::{Config, Environment};
use migrator::db::Databases;
use migrator::enrichment::EnrichmentClient;
use migrator::jobs::audit;
use migrator::runner::{all_jobs, find_job, run_job, JobContext};

#[derive(Parser)]
#[command(name = "migrate")]
#[command(about = "One-shot data transfers from the legacy platform into the service databases")]
struct Cli {
    /// Target environment for the service databases
    #[arg(long, default_value = "local")]
    env: Environment,

    /// Run every transform but roll back all transactions at the end
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all registered transfer jobs
    List,

    /// Run one transfer job by name
    Run { name: String },

    /// Read-only consistency checks
    Check {
        #[command(subcommand)]
        target: CheckTarget,
    },
}

#[derive(Subcommand)]
enum CheckTarget {
    /// Compare legacy travel agents against identity agent users
    Agents,
    /// List legacy BDM references with no identity user
    BdmLinks,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if matches!(cli.command, Commands::List) {
        for job in all_jobs() {
            println!("{:<24} {}", job.name(), job.description());
        }
        return Ok(());
    }

    let config = Config::from_env(cli.env)?;
    let enrichment = config.enrichment.as_ref().map(EnrichmentClient::new);
    let db = Databases::connect(&config).await?;

    let ctx = JobContext {
        db,
        defaults: config.defaults.clone(),
        enrichment,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::List => unreachable!("handled before connecting"),
        Commands::Run { name } => {
            let Some(job) = find_job(&name) else {
                bail!("unknown job '{name}'; run `migrate list` to see what is registered");
            };
            run_job(job.as_ref(), &ctx).await?;
        }
        Commands::Check { target } => match target {
            CheckTarget::Agents => audit::check_agents(&ctx).await?,
            CheckTarget::BdmLinks => audit::check_bdm_links(&ctx).await?,
        },
    }

    Ok(())
}
