//! Ingest worker. One job = one FeedRun, executed as an ordered
//! sequence of gates that may short-circuit at any point.

use crate::classify::{self, Lane};
use crate::connectors::ConnectorRegistry;
use crate::errors::ErrorCode;
use crate::fetcher::TransportRegistry;
use crate::hashing;
use crate::models::{Feed, FeedRun, FeedStatus, RejectedSample, RunStatus};
use crate::notify::{self, NotificationSink};
use crate::queue::{self, IngestJob, Job, JobQueue, MatchBatchJob};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::{IndexableUpsert, QuarantineUpsert, Store};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// DealerSkus are matched in batches of this size.
const MATCH_BATCH_SIZE: usize = 100;

pub struct IngestWorker {
    store: Arc<dyn Store>,
    transports: Arc<TransportRegistry>,
    connectors: Arc<ConnectorRegistry>,
    queue: Arc<dyn JobQueue>,
    notifier: Arc<dyn NotificationSink>,
}

impl IngestWorker {
    pub fn new(
        store: Arc<dyn Store>,
        transports: Arc<TransportRegistry>,
        connectors: Arc<ConnectorRegistry>,
        queue: Arc<dyn JobQueue>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { store, transports, connectors, queue, notifier }
    }

    pub async fn run_job(&self, job: IngestJob) -> Result<()> {
        let now = Utc::now();

        let dealer = self
            .store
            .get_dealer(&job.dealer_id)
            .await?
            .with_context(|| format!("dealer {} not found", job.dealer_id))?;
        let mut feed = self
            .store
            .get_feed(&job.feed_id)
            .await?
            .with_context(|| format!("feed {} not found", job.feed_id))?;
        let previous_status = feed.status;

        let mut run = FeedRun::new(job.feed_run_id.clone(), feed.id.clone(), feed.dealer_id.clone(), now);

        // Step 1: subscription gate.
        if !job.admin_override && !dealer.is_subscription_active(now) {
            run.status = RunStatus::Skipped;
            run.primary_error_code = Some(ErrorCode::SubscriptionExpired);
            run.finished_at = Some(now);
            self.store.commit_feed_run(&run).await?;

            if self.store.try_claim_subscription_notify(&dealer.id, now).await? {
                if let Some(recipient) = dealer.notification_recipient() {
                    self.notifier
                        .send(
                            recipient,
                            crate::notify::NotificationKind::SubscriptionExpiring,
                            &feed.id,
                            "subscription expired, feed skipped",
                        )
                        .await;
                }
            }
            return Ok(());
        }

        match self.ingest_body(&mut feed, &mut run, job.admin_id.as_deref()).await {
            Ok(()) => {}
            Err(err) => {
                let code = ErrorCode::classify_run_failure(&err.to_string());
                run.status = RunStatus::Failure;
                run.primary_error_code = Some(code);
                run.finished_at = Some(now);
                feed.status = FeedStatus::Failed;
                feed.last_error = Some(err.to_string());
                feed.primary_error_code = Some(code);
                feed.last_failure_at = Some(now);
                feed.last_run_at = Some(now);

                self.store.update_feed_after_run(&feed).await.ok();
                self.store.commit_feed_run(&run).await.ok();
                notify::notify_feed_transition(
                    self.notifier.as_ref(),
                    &dealer,
                    &feed.id,
                    previous_status,
                    FeedStatus::Failed,
                )
                .await;
                return Err(err);
            }
        }

        notify::notify_feed_transition(self.notifier.as_ref(), &dealer, &feed.id, previous_status, feed.status).await;

        if run.status != RunStatus::Skipped && run.counts.total > 0 {
            self.enqueue_match_batches(&run).await?;
        }

        Ok(())
    }

    /// Steps 2-10: fetch through FeedRun commit. Any error here is treated
    /// as a run-level failure by the caller.
    async fn ingest_body(&self, feed: &mut Feed, run: &mut FeedRun, _admin_id: Option<&str>) -> Result<()> {
        let now = Utc::now();

        // Step 2: fetch.
        let bytes = run_with_retry(RetryPolicy::ingest(), "ingest-fetch", || {
            self.transports.fetch(feed.transport, &feed.url, feed.credentials.as_ref())
        })
        .await
        .map_err(anyhow::Error::from)?;

        // Step 3: content-hash gate.
        let content_hash = hashing::content_hash(&bytes);
        if feed.feed_hash.as_deref() == Some(content_hash.as_str()) {
            run.status = RunStatus::Success;
            run.finished_at = Some(now);
            self.store.commit_feed_run(run).await?;
            info!(feed_id = %feed.id, "content unchanged, skipping downstream processing");
            return Ok(());
        }

        // Step 4: parse.
        let connector = self.connectors.resolve(feed.format, &bytes);
        let outcome = connector.parse(&bytes).map_err(anyhow::Error::from)?;

        run.counts.total = outcome.records.len() as u64;

        // Step 5: apply records per lane.
        for record in &outcome.records {
            run.counts.coercions += record.coercions.len() as u64;
            for warning in &record.warnings {
                run.record_error(warning.code);
            }
            match classify::classify(record) {
                Lane::Indexable => {
                    let sku_hash = hashing::to_hex(hashing::sku_hash(
                        &record.title,
                        record.upc.as_deref().unwrap_or(""),
                        &record.sku,
                        record.price.unwrap_or(0.0),
                    ));
                    self.store
                        .upsert_indexable(IndexableUpsert {
                            dealer_id: &feed.dealer_id,
                            feed_id: &feed.id,
                            feed_run_id: &run.id,
                            sku_hash: &sku_hash,
                            record,
                        })
                        .await?;
                    run.counts.indexed += 1;
                }
                Lane::Quarantine(errors) => {
                    let match_key = hashing::to_hex(hashing::match_key(&record.title, &record.sku));
                    for err in &errors {
                        run.record_error(err.code);
                    }
                    self.store
                        .upsert_quarantine(QuarantineUpsert {
                            feed_id: &feed.id,
                            match_key: &match_key,
                            raw_data: record.raw.clone(),
                            parsed_fields: serde_json::to_value(record).unwrap_or_default(),
                            blocking_errors: errors,
                        })
                        .await?;
                    run.counts.quarantined += 1;
                }
                Lane::Reject(errors) => {
                    for err in &errors {
                        run.record_error(err.code);
                    }
                    run.push_sample(RejectedSample { raw: record.raw.clone(), errors });
                    run.counts.rejected += 1;
                }
            }
        }
        debug_assert!(run.invariant_holds());

        // Step 6: active-set reconciliation.
        self.store.deactivate_stale_skus(&feed.dealer_id, &feed.id, &run.id).await?;

        // Step 7: health status.
        let proc = run.counts.indexed + run.counts.quarantined;
        let q_rate = if proc > 0 { run.counts.quarantined as f64 / proc as f64 } else { 0.0 };
        let r_rate = if run.counts.total > 0 { run.counts.rejected as f64 / run.counts.total as f64 } else { 0.0 };

        let new_status = if r_rate > 0.50 {
            FeedStatus::Failed
        } else if q_rate > 0.30 || r_rate > 0.10 {
            FeedStatus::Warning
        } else {
            FeedStatus::Healthy
        };
        run.primary_error_code = run.dominant_error_code();

        // Step 8: commit feed row.
        feed.status = new_status;
        feed.feed_hash = Some(content_hash);
        feed.last_run_at = Some(now);
        feed.primary_error_code = run.primary_error_code;
        if new_status == FeedStatus::Failed {
            feed.last_failure_at = Some(now);
        } else {
            feed.last_success_at = Some(now);
        }
        self.store.update_feed_after_run(feed).await?;

        run.status = match new_status {
            FeedStatus::Failed => RunStatus::Failure,
            FeedStatus::Warning => RunStatus::Warning,
            _ => RunStatus::Success,
        };
        run.finished_at = Some(now);

        // Step 10: commit FeedRun (step 9, notification fan-out, is driven
        // by the caller once this Result has been observed).
        self.store.commit_feed_run(run).await?;

        Ok(())
    }

    async fn enqueue_match_batches(&self, run: &FeedRun) -> Result<()> {
        let sku_ids = self.store.active_sku_ids_for_run(&run.id).await?;
        for (batch_index, chunk) in sku_ids.chunks(MATCH_BATCH_SIZE).enumerate() {
            let job_id = queue::match_batch_job_id(&run.id, batch_index);
            let job = Job::MatchBatch(MatchBatchJob {
                job_id: job_id.clone(),
                feed_run_id: run.id.clone(),
                batch_index,
                dealer_sku_ids: chunk.to_vec(),
            });
            if !self.queue.enqueue(&job_id, &job).await? {
                warn!(job_id, "match batch already enqueued, skipping duplicate");
            }
        }
        Ok(())
    }
}
