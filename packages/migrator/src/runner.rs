//! The shared shape of every transfer job: count, progress loop, summary.
//!
//! Jobs implement `TransferJob` and register in `all_jobs()`. The runner
//! owns the repeated scaffolding — row counting, progress bar, duration,
//! summary printing, count-consistency check — while each job keeps only
//! its SQL and per-row transform.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Instant;
use tracing::warn;

use crate::config::TransferDefaults;
use crate::db::Databases;
use crate::enrichment::EnrichmentClient;
use crate::jobs;
use crate::report::TransferReport;

/// Shared handles passed to every job.
pub struct JobContext {
    pub db: Databases,
    pub defaults: TransferDefaults,
    pub enrichment: Option<EnrichmentClient>,
    /// Run every transform but roll the transactions back at the end.
    pub dry_run: bool,
}

/// One batch transfer between the legacy schema and a target database.
///
/// Jobs are one-shot and rerunnable: duplicate checks make a second run
/// skip what the first one moved. There is no checkpointing — a failed
/// run rolls back and is simply run again.
#[async_trait]
pub trait TransferJob: Send + Sync {
    /// Unique name, used as the CLI subcommand argument.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Progress-bar label for the main loop.
    fn phase(&self) -> &'static str {
        "[1/1] Transferring data..."
    }

    /// Expected number of rows, used to size the progress bar and to
    /// cross-check the summary counts.
    async fn total(&self, ctx: &JobContext) -> Result<i64>;

    async fn run(&self, ctx: &JobContext, report: &mut TransferReport) -> Result<()>;
}

/// All registered transfer jobs, in the order they are normally run.
pub fn all_jobs() -> Vec<Box<dyn TransferJob>> {
    vec![
        Box::new(jobs::users::Users),
        Box::new(jobs::credentials::Credentials),
        Box::new(jobs::member_personas::MemberPersonas),
        Box::new(jobs::agent_personas::AgentPersonas),
        Box::new(jobs::bdm_users::BdmUsers),
        Box::new(jobs::bdm_personas::BdmPersonas),
        Box::new(jobs::organizations::Organizations),
        Box::new(jobs::organization_instances::OrganizationInstances),
        Box::new(jobs::organization_users::OrganizationUsers),
        Box::new(jobs::packages::Packages),
        Box::new(jobs::hotels::Hotels),
        Box::new(jobs::airlines::Airlines),
        Box::new(jobs::airports::Airports),
        Box::new(jobs::city_references::CityReferences),
    ]
}

pub fn find_job(name: &str) -> Option<Box<dyn TransferJob>> {
    all_jobs().into_iter().find(|job| job.name() == name)
}

/// Run one job end to end and print its summary.
pub async fn run_job(job: &dyn TransferJob, ctx: &JobContext) -> Result<TransferReport> {
    let total = job.total(ctx).await?;
    println!("Found {total} total records to transfer");
    if ctx.dry_run {
        println!("Dry run: every transaction will be rolled back");
    }

    let mut report = TransferReport::new(total, job.phase());
    let started = Instant::now();

    job.run(ctx, &mut report).await?;

    report.finish();
    let duration = started.elapsed();

    if !report.is_consistent() {
        warn!(
            job = job.name(),
            total,
            processed = report.processed(),
            "summary counts do not add up to the row total"
        );
    }

    report.print_summary(duration);
    Ok(report)
}
