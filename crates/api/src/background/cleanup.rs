//! Cleanup producer: announces projects whose trash retention has expired.
//!
//! Each run sweeps the [`TrashLedger`] for projects trashed longer than the
//! retention period and publishes every project id to the cleaner producer
//! of each configured subscriber. Subscribers use the id to drop the
//! project locally.

use std::sync::Arc;

use async_trait::async_trait;
use bujo_core::producers::PRODUCER_CLEANER;
use bujo_events::{ProducerHandle, PublishOutcome};
use chrono::{TimeDelta, Utc};

use crate::background::scheduler::{JobContext, JobError, ProducerJob};
use crate::trash::TrashLedger;

pub struct CleanupJob {
    trash: Arc<TrashLedger>,
    cleaners: Vec<ProducerHandle>,
}

impl CleanupJob {
    pub fn new(trash: Arc<TrashLedger>, cleaners: Vec<ProducerHandle>) -> Self {
        Self { trash, cleaners }
    }
}

#[async_trait]
impl ProducerJob for CleanupJob {
    fn name(&self) -> &'static str {
        PRODUCER_CLEANER
    }

    async fn run(&self, ctx: &JobContext) -> Result<u64, JobError> {
        let cutoff = TimeDelta::try_days(ctx.retention_days)
            .and_then(|retention| ctx.fired_at.with_timezone(&Utc).checked_sub_signed(retention))
            .ok_or(JobError::InvalidRetention(ctx.retention_days))?;

        let expired = self.trash.sweep_older_than(cutoff);
        if expired.is_empty() {
            return Ok(0);
        }
        tracing::info!(
            count = expired.len(),
            cutoff = %cutoff,
            "Cleanup: trashed projects past retention"
        );

        let mut published = 0;
        for project_id in expired {
            for cleaner in &self.cleaners {
                match cleaner.publish(project_id.into()).await? {
                    PublishOutcome::DroppedNewest => {
                        tracing::warn!(project_id, "Cleanup event dropped, producer channel full");
                    }
                    PublishOutcome::Queued | PublishOutcome::EvictedOldest => published += 1,
                }
            }
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bujo_events::{ChannelError, OverflowPolicy, ProducerAdapter, Received};
    use chrono::TimeZone;

    use super::*;

    fn ctx(retention_days: i64) -> JobContext {
        JobContext {
            fired_at: chrono_tz::America::Los_Angeles
                .with_ymd_and_hms(2026, 4, 30, 0, 0, 0)
                .unwrap(),
            retention_days,
        }
    }

    async fn payloads(adapter: &ProducerAdapter) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while !adapter.channel().is_empty() {
            match adapter.channel().receive().await {
                Received::Message(m) => out.push(m.payload),
                Received::Closed => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn publishes_expired_projects_to_every_subscriber() {
        let trash = Arc::new(TrashLedger::new());
        let now = ctx(0).fired_at.with_timezone(&Utc);
        trash.trash(11, now - TimeDelta::days(45));
        trash.trash(12, now - TimeDelta::days(31));
        trash.trash(13, now - TimeDelta::days(2));

        let first = ProducerAdapter::new("cleaner", 8, OverflowPolicy::DropOldest);
        let second = ProducerAdapter::new("cleaner", 8, OverflowPolicy::DropOldest);
        let job = CleanupJob::new(Arc::clone(&trash), vec![first.handle(), second.handle()]);

        assert_eq!(job.run(&ctx(30)).await.unwrap(), 4);
        assert_eq!(payloads(&first).await, vec![11, 12]);
        assert_eq!(payloads(&second).await, vec![11, 12]);

        // Swept projects leave the ledger; the recent one stays.
        assert_eq!(trash.len(), 1);
        assert_eq!(job.run(&ctx(30)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn closed_channel_fails_the_run() {
        let trash = Arc::new(TrashLedger::new());
        trash.trash(1, Utc::now() - TimeDelta::days(400));
        let adapter = ProducerAdapter::new("cleaner", 8, OverflowPolicy::DropOldest);
        adapter.channel().close();

        let job = CleanupJob::new(trash, vec![adapter.handle()]);
        let fired = JobContext {
            fired_at: Utc::now().with_timezone(&chrono_tz::UTC),
            retention_days: 30,
        };
        assert_matches!(
            job.run(&fired).await,
            Err(JobError::Channel(ChannelError::Closed))
        );
    }

    #[tokio::test]
    async fn rejects_out_of_range_retention() {
        let job = CleanupJob::new(Arc::new(TrashLedger::new()), Vec::new());
        assert_matches!(
            job.run(&ctx(i64::MAX)).await,
            Err(JobError::InvalidRetention(_))
        );
    }
}
