//! Cron scheduler.
//!
//! One tokio task per scheduled job. Each trigger runs a fresh clone of the
//! job definition; a trigger that fires while the previous run of the same
//! job is still going is skipped.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::definition::Job;
use crate::error::{PipelineError, Result};
use crate::runner::JobRunner;

/// Parse a 5- or 6-field cron expression. Five fields get a leading seconds
/// field of `0`.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| {
        PipelineError::Scheduling(format!("invalid cron expression '{}': {}", expression, e))
    })
}

/// Next fire time of `expression` after `after`.
pub fn next_fire(expression: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    Ok(parse_schedule(expression)?.after(&after).next())
}

/// Marks a job as running; cleared when dropped.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of one run.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Claim the job, or `None` when a run is already in progress.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        if self.running.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(RunPermit {
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs jobs on their cron schedules until shut down.
#[derive(Debug)]
pub struct Scheduler {
    runner: JobRunner,
    entries: Vec<(Job, Schedule)>,
}

impl Scheduler {
    pub fn new(runner: JobRunner) -> Self {
        Self {
            runner,
            entries: Vec::new(),
        }
    }

    /// Schedule `job`. Jobs without a cron expression are rejected.
    pub fn add_job(&mut self, job: Job) -> Result<()> {
        let Some(expression) = job.cron.as_deref() else {
            return Err(PipelineError::Scheduling(format!(
                "job '{}' has no cron expression",
                job.name
            )));
        };
        let schedule = parse_schedule(expression)?;
        info!(job = %job.name, cron = %expression, "Job scheduled");
        self.entries.push((job, schedule));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run until `shutdown` resolves or no job has a future fire time.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut loops = JoinSet::new();
        for (job, schedule) in self.entries {
            loops.spawn(job_loop(self.runner.clone(), job, schedule));
        }
        info!(jobs = loops.len(), "Scheduler started");

        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            _ = async { while loops.join_next().await.is_some() {} } => {
                info!("No further triggers scheduled");
            }
        }
        loops.abort_all();
        info!("Scheduler stopped");
    }
}

async fn job_loop(runner: JobRunner, job: Job, schedule: Schedule) {
    let guard = RunGuard::default();
    let mut cursor = Utc::now();

    loop {
        let Some(next) = schedule.after(&cursor).next() else {
            warn!(job = %job.name, "Cron expression has no future fire times");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        cursor = next.max(Utc::now());

        let Some(permit) = guard.try_acquire() else {
            warn!(job = %job.name, "Previous run still in progress, skipping trigger");
            continue;
        };
        let runner = runner.clone();
        let job = job.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = runner.run_job(&job).await {
                error!(job = %job.name, error = %e, "Scheduled job failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_five_field_expression_gets_seconds() {
        let after = Utc.with_ymd_and_hms(2024, 5, 15, 10, 7, 30).unwrap();
        let next = next_fire("*/15 * * * *", after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 15, 10, 15, 0).unwrap());
    }

    #[test]
    fn test_six_field_expression() {
        let after = Utc.with_ymd_and_hms(2024, 5, 15, 10, 7, 30).unwrap();
        let next = next_fire("30 0 * * * *", after).unwrap().unwrap();
        assert_eq!(next.minute(), 0);
        assert_eq!(next.second(), 30);
        assert_eq!(next.hour(), 11);
    }

    #[test]
    fn test_invalid_expression() {
        let err = parse_schedule("not a cron").unwrap_err();
        assert!(matches!(err, PipelineError::Scheduling(_)));
        assert!(err.to_string().contains("not a cron"));
    }

    #[test]
    fn test_run_guard_blocks_overlap() {
        let guard = RunGuard::default();
        let permit = guard.try_acquire().unwrap();
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());
        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }
}
