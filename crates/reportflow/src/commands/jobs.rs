//! Jobs command - list configured jobs.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use reportflow_pipeline::next_fire;

use super::Context;

/// Arguments for the jobs command.
#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Output as JSON (for scripting)
    #[arg(long)]
    pub json: bool,
}

/// One job for JSON output.
#[derive(Debug, Serialize)]
struct JobOutput {
    name: String,
    cron: Option<String>,
    next_run: Option<String>,
    configurations: Vec<String>,
}

/// Run the jobs command.
pub async fn run(args: JobsArgs, ctx: &Context) -> Result<()> {
    let jobs = ctx.jobs()?;
    let now = chrono::Utc::now();

    let mut output = Vec::with_capacity(jobs.len());
    for job in jobs.values() {
        let next_run = match &job.cron {
            Some(cron) => next_fire(cron, now)?.map(|t| t.to_rfc3339()),
            None => None,
        };
        output.push(JobOutput {
            name: job.name.clone(),
            cron: job.cron.clone(),
            next_run,
            configurations: job.configurations.keys().cloned().collect(),
        });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Jobs").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    if output.is_empty() {
        println!("  {}", dim.apply_to("no jobs defined"));
    }
    for job in &output {
        println!();
        println!("  {}", style(&job.name).bold());
        println!(
            "    {} {}",
            dim.apply_to("Schedule:"),
            job.cron.as_deref().unwrap_or("run-now only")
        );
        if let Some(next) = &job.next_run {
            println!("    {} {}", dim.apply_to("Next run:"), next);
        }
        println!(
            "    {} {}",
            dim.apply_to("Configurations:"),
            job.configurations.join(", ")
        );
    }
    println!();
    Ok(())
}
