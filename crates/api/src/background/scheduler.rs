//! Recurring execution of producer jobs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bujo_events::ChannelError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;

/// When a job runs and the parameters it runs with.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval: Duration,
    pub timezone: Tz,
    pub retention_days: i64,
}

impl Schedule {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            interval: config.job_interval(),
            timezone: config.timezone,
            retention_days: config.max_retention_days,
        }
    }
}

/// Passed to every job run.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Start of this run, in the schedule's zone.
    pub fired_at: DateTime<Tz>,
    pub retention_days: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("producer channel unavailable: {0}")]
    Channel(#[from] ChannelError),

    #[error("retention of {0} days is out of range")]
    InvalidRetention(i64),
}

/// Work that produces events on a schedule.
#[async_trait]
pub trait ProducerJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run once. Returns the number of events published.
    async fn run(&self, ctx: &JobContext) -> Result<u64, JobError>;
}

/// Run `job` immediately, then every `schedule.interval`, until `cancel`
/// fires. A run in progress is abandoned on cancellation.
pub async fn run_recurring<J>(job: Arc<J>, schedule: Schedule, cancel: CancellationToken)
where
    J: ProducerJob + ?Sized,
{
    let name = job.name();
    tracing::info!(
        job = name,
        interval_secs = schedule.interval.as_secs(),
        retention_days = schedule.retention_days,
        timezone = schedule.timezone.name(),
        "Recurring job started"
    );

    let mut interval =
        tokio::time::interval_at(Instant::now() + schedule.interval, schedule.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if run_once(job.as_ref(), &schedule, &cancel).await {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if !run_once(job.as_ref(), &schedule, &cancel).await {
                        break;
                    }
                }
            }
        }
    }

    tracing::info!(job = name, "Recurring job stopping");
}

/// Execute a single run. Returns `false` when the job should not run again.
async fn run_once<J>(job: &J, schedule: &Schedule, cancel: &CancellationToken) -> bool
where
    J: ProducerJob + ?Sized,
{
    let ctx = JobContext {
        fired_at: Utc::now().with_timezone(&schedule.timezone),
        retention_days: schedule.retention_days,
    };
    tracing::debug!(job = job.name(), fired_at = %ctx.fired_at.to_rfc3339(), "Job run starting");

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(job = job.name(), "Job run cancelled");
            return false;
        }
        result = job.run(&ctx) => result,
    };

    match result {
        Ok(published) => {
            if published > 0 {
                tracing::info!(job = job.name(), published, "Job run finished");
            } else {
                tracing::debug!(job = job.name(), "Job run finished, nothing to publish");
            }
            true
        }
        Err(JobError::Channel(ChannelError::Closed)) => {
            tracing::info!(job = job.name(), "Producer channel closed, job will not run again");
            false
        }
        Err(e) => {
            tracing::error!(job = job.name(), error = %e, "Job run failed");
            true
        }
    }
}
