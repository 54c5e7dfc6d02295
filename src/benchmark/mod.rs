//! Benchmark worker. Aggregates active dealer prices per
//! canonical SKU into a market benchmark. Idempotent: re-running with the
//! same inputs yields the same row (last-write-wins upsert).

use crate::models::{Benchmark, Confidence};
use crate::queue::{self, BenchmarkJob, InsightJob, Job, JobQueue};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Below this many distinct sellers there isn't enough signal to publish a
/// benchmark at all.
const MIN_SELLERS_FOR_BENCHMARK: usize = 2;

/// Seller count is capped when stamped onto the row; confidence still
/// reflects the true count via `Confidence::from_seller_count`.
const SELLER_COUNT_CAP: u32 = 10;

pub struct BenchmarkWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl BenchmarkWorker {
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Runs a benchmark job. An empty `canonical_sku_ids` means "all
    /// canonical SKUs", per `BenchmarkJob`'s own contract, so the full
    /// catalog is enumerated from the store in that case. SKUs that were
    /// actually (re)published are handed to the insight queue.
    pub async fn run_batch(&self, job: &BenchmarkJob) -> Result<()> {
        let ids = if job.canonical_sku_ids.is_empty() {
            run_with_retry(RetryPolicy::downstream(), "benchmark-enumerate-all", || {
                self.store.list_canonical_skus()
            })
            .await?
            .into_iter()
            .map(|sku| sku.id)
            .collect()
        } else {
            job.canonical_sku_ids.clone()
        };

        let mut published = Vec::with_capacity(ids.len());
        for id in &ids {
            if self.run_one(id).await? {
                published.push(id.clone());
            }
        }

        if !published.is_empty() {
            let insight_job_id = queue::insight_job_id(&job.job_id);
            let insight_job = Job::Insight(InsightJob {
                job_id: insight_job_id.clone(),
                canonical_sku_ids: published,
            });
            if !self.queue.enqueue(&insight_job_id, &insight_job).await? {
                warn!(job_id = insight_job_id, "insight batch already enqueued, skipping duplicate");
            }
        }

        Ok(())
    }

    /// Aggregates one canonical SKU's active prices into a benchmark row.
    /// Returns whether a benchmark was actually published (`false` when
    /// there weren't enough distinct sellers).
    pub async fn run_one(&self, canonical_sku_id: &str) -> Result<bool> {
        let mut prices = run_with_retry(RetryPolicy::downstream(), "benchmark-fetch-prices", || {
            self.store.active_prices_for_canonical(canonical_sku_id)
        })
        .await?;
        if prices.len() < MIN_SELLERS_FOR_BENCHMARK {
            debug!(canonical_sku_id, sellers = prices.len(), "too few sellers, skipping benchmark");
            return Ok(false);
        }

        prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let seller_count = prices.len() as u32;
        let benchmark = Benchmark {
            canonical_sku_id: canonical_sku_id.to_string(),
            min: prices[0],
            max: prices[prices.len() - 1],
            mean: mean(&prices),
            median: median(&prices),
            seller_count: seller_count.min(SELLER_COUNT_CAP),
            confidence: Confidence::from_seller_count(seller_count),
        };
        self.store.upsert_benchmark(&benchmark).await?;
        Ok(true)
    }
}

fn mean(sorted: &[f64]) -> f64 {
    sorted.iter().sum::<f64>() / sorted.len() as f64
}

/// Sorted-input median: midpoint for odd length, lower-middle of the two
/// center values for even length.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        sorted[n / 2 - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_length_is_the_midpoint() {
        assert_eq!(median(&[10.0, 20.0, 30.0]), 20.0);
    }

    #[test]
    fn median_of_even_length_is_the_lower_middle() {
        assert_eq!(median(&[10.0, 20.0, 30.0, 40.0]), 20.0);
    }

    #[test]
    fn mean_averages_all_values() {
        assert_eq!(mean(&[10.0, 20.0, 30.0]), 20.0);
    }

    #[test]
    fn confidence_tracks_true_seller_count_even_when_capped() {
        let prices: Vec<f64> = (0..12).map(|n| n as f64 + 10.0).collect();
        assert_eq!(Confidence::from_seller_count(prices.len() as u32), Confidence::High);
    }
}
