//! Validate command - check the settings document offline.

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use reportflow_client::PlatformApi;
use reportflow_pipeline::Job;

use super::Context;

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also log in and fetch permissions to confirm credentials
    #[arg(long)]
    pub check_auth: bool,
}

/// Run the validate command.
pub async fn run(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    println!("{} {}", style("Validating").bold(), ctx.document.path.display());
    println!("{}", dim.apply_to("─".repeat(40)));

    let mut failures = 0;
    for (name, value) in &ctx.settings.jobs {
        let outcome = Job::from_value(name, value).and_then(|job| job.validate().map(|_| job));
        match outcome {
            Ok(job) => {
                let tasks: usize = job.configurations.values().map(|c| c.plan.len()).sum();
                println!(
                    "  {} {} {}",
                    green.apply_to("✓"),
                    name,
                    dim.apply_to(format!(
                        "({} configurations, {} tasks)",
                        job.configurations.len(),
                        tasks
                    ))
                );
            }
            Err(e) => {
                failures += 1;
                println!("  {} {}", red.apply_to("✗"), name);
                println!("    {}", red.apply_to(e));
            }
        }
    }
    if ctx.settings.jobs.is_empty() {
        println!("  {}", dim.apply_to("no jobs defined"));
    }

    if args.check_auth {
        let client = ctx.connect().await?;
        let permissions = client.get_permissions().await?;
        let count = permissions
            .get("entities")
            .and_then(|e| e.as_array())
            .map_or(0, Vec::len);
        println!(
            "  {} credentials {}",
            green.apply_to("✓"),
            dim.apply_to(format!("({} permissions)", count))
        );
    }
    println!();

    if failures > 0 {
        bail!("{} invalid jobs", failures);
    }
    println!("{}", green.apply_to("Settings are valid"));
    Ok(())
}
