//! Run command - execute jobs once.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde_json::json;

use super::Context;

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Jobs to run, in order (default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub jobs: Vec<String>,
}

/// Run the run command.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let jobs = ctx.jobs()?;
    let names = ctx.selected(&jobs, &args.jobs);
    if names.is_empty() {
        bail!("no jobs defined in {}", ctx.document.path.display());
    }

    let client = ctx.connect().await?;
    let runner = ctx.runner(
        client,
        json!({
            "command": "run",
            "jobs": names,
            "config": ctx.document.path.display().to_string(),
            "showOutput": ctx.show_output,
            "verbose": ctx.verbose,
        }),
    );
    let summary = runner.run_jobs(&jobs, &names).await;

    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    for report in &summary.completed {
        let exports: usize = report
            .configurations
            .iter()
            .flat_map(|c| &c.documents)
            .map(|d| d.written.len())
            .sum();
        let failures: usize = report
            .configurations
            .iter()
            .map(|c| c.export_failures())
            .sum();
        println!(
            "  {} {} {}",
            green.apply_to("✓"),
            style(&report.job).bold(),
            dim.apply_to(format!(
                "({} configurations, {} files written, {} export failures)",
                report.configurations.len(),
                exports,
                failures
            ))
        );
    }
    for (name, error) in &summary.failed {
        println!("  {} {} {}", red.apply_to("✗"), style(name).bold(), dim.apply_to(error));
    }
    for name in &summary.unknown {
        println!("  {} {} {}", dim.apply_to("-"), name, dim.apply_to("(not defined)"));
    }
    println!();

    if !summary.is_success() {
        bail!("{} of {} jobs failed", summary.failed.len(), names.len());
    }
    Ok(())
}
