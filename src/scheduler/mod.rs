//! Scheduler. A singleton duty enforced by the queue's
//! idempotent job-id dedup rather than leader election: any replica can run
//! a tick, and a second replica landing in the same window is a no-op.

use crate::queue::{self, IngestJob, Job, JobQueue};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::Store;
use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const FEED_TICK_WINDOW_MINUTES: i64 = 5;
const BENCHMARK_TICK_WINDOW_MINUTES: i64 = 120;
const MAX_JITTER_SECS: u64 = 120;

pub struct Scheduler {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Runs once; callers loop this on a 5-minute interval.
    pub async fn feed_tick(&self) -> Result<()> {
        let now = Utc::now();
        let candidates = run_with_retry(RetryPolicy::scheduler(), "scheduler-due-feeds", || {
            self.store.due_feeds(now)
        })
        .await?;

        for feed in candidates {
            if !feed.is_due(now) {
                continue;
            }

            let job_id = queue::feed_job_id(&feed.id, now, FEED_TICK_WINDOW_MINUTES);
            let jitter = rand::thread_rng().gen_range(0..=MAX_JITTER_SECS);
            tokio::time::sleep(Duration::from_secs(jitter)).await;

            let job = Job::Ingest(IngestJob {
                job_id: job_id.clone(),
                feed_id: feed.id.clone(),
                dealer_id: feed.dealer_id.clone(),
                feed_run_id: Uuid::new_v4().to_string(),
                admin_override: false,
                admin_id: None,
            });

            if self.queue.enqueue(&job_id, &job).await? {
                self.store.set_feed_last_run_at(&feed.id, now).await?;
                info!(feed_id = %feed.id, job_id, "enqueued scheduled ingest");
            }
        }
        Ok(())
    }

    /// Runs once; callers loop this on a 2-hour interval.
    pub async fn benchmark_tick(&self) -> Result<()> {
        let now = Utc::now();
        let job_id = queue::benchmark_job_id("full", now, BENCHMARK_TICK_WINDOW_MINUTES);
        let job = Job::Benchmark(crate::queue::BenchmarkJob { job_id: job_id.clone(), canonical_sku_ids: Vec::new() });
        if self.queue.enqueue(&job_id, &job).await? {
            info!(job_id, "enqueued scheduled benchmark sweep");
        }
        Ok(())
    }

    /// Operator-triggered ingest: bypasses the enabled gate, clears FAILED
    /// state, and carries admin override through so the subscription gate
    /// honors it. No jitter — the operator asked for it now.
    pub async fn manual_ingest(&self, feed_id: &str, admin_id: Option<String>) -> Result<()> {
        let Some(feed) = self.store.get_feed(feed_id).await? else {
            warn!(feed_id, "manual ingest requested for unknown feed");
            return Ok(());
        };
        self.store.clear_feed_failure(feed_id).await?;

        let job_id = format!("manual-{feed_id}-{}", Uuid::new_v4());
        let job = Job::Ingest(IngestJob {
            job_id: job_id.clone(),
            feed_id: feed.id.clone(),
            dealer_id: feed.dealer_id.clone(),
            feed_run_id: Uuid::new_v4().to_string(),
            admin_override: true,
            admin_id,
        });
        self.queue.enqueue(&job_id, &job).await?;
        info!(feed_id, job_id, "enqueued manual ingest");
        Ok(())
    }
}
