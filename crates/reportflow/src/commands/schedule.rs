//! Schedule command - run jobs on their cron schedules.

use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;
use tracing::{error, info, warn};

use reportflow_pipeline::Scheduler;

use super::Context;

/// Arguments for the schedule command.
#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Jobs to schedule (default: every job with a cron expression)
    #[arg(short, long, value_delimiter = ',')]
    pub jobs: Vec<String>,
}

/// Run the schedule command.
pub async fn run(args: ScheduleArgs, ctx: &Context) -> Result<()> {
    let jobs = ctx.jobs()?;
    let names = ctx.selected(&jobs, &args.jobs);

    let client = ctx.connect().await?;
    let runner = ctx.runner(
        client,
        json!({
            "command": "schedule",
            "jobs": names,
            "config": ctx.document.path.display().to_string(),
            "showOutput": ctx.show_output,
            "verbose": ctx.verbose,
        }),
    );

    let mut scheduler = Scheduler::new(runner);
    for name in &names {
        match jobs.get(name) {
            Some(job) if job.cron.is_some() => scheduler.add_job(job.clone())?,
            Some(_) => warn!(job = %name, "Job has no cron expression, not scheduling"),
            None => warn!(job = %name, "Job does not exist, skipping"),
        }
    }
    if scheduler.is_empty() {
        bail!("no schedulable jobs");
    }

    info!(jobs = scheduler.len(), "Press Ctrl-C to stop");
    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
