//! Durable job queue abstraction. Every job carries a
//! deterministic `job_id`; the queue's insert-if-absent semantics give
//! idempotent, cross-replica dedup without a leader election system.

pub mod redis_queue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: String,
    pub feed_id: String,
    pub dealer_id: String,
    pub feed_run_id: String,
    pub admin_override: bool,
    pub admin_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBatchJob {
    pub job_id: String,
    pub feed_run_id: String,
    pub batch_index: usize,
    pub dealer_sku_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkJob {
    pub job_id: String,
    /// Empty means "all canonical SKUs changed since the last run".
    pub canonical_sku_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightJob {
    pub job_id: String,
    pub canonical_sku_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Job {
    Ingest(IngestJob),
    MatchBatch(MatchBatchJob),
    Benchmark(BenchmarkJob),
    Insight(InsightJob),
}

/// Floors `at` to the start of a `window_minutes`-wide bucket and renders
/// it as a compact token suitable for embedding in a job id.
pub fn window_token(at: DateTime<Utc>, window_minutes: i64) -> String {
    let epoch_minutes = at.timestamp() / 60;
    let window = epoch_minutes / window_minutes;
    window.to_string()
}

pub fn feed_job_id(feed_id: &str, at: DateTime<Utc>, window_minutes: i64) -> String {
    format!("feed-{feed_id}-{}", window_token(at, window_minutes))
}

pub fn benchmark_job_id(kind: &str, at: DateTime<Utc>, window_minutes: i64) -> String {
    format!("benchmark-{kind}-{}", window_token(at, window_minutes))
}

pub fn match_batch_job_id(feed_run_id: &str, batch_index: usize) -> String {
    format!("sku-match:{feed_run_id}:{batch_index}")
}

/// Deterministic per-batch benchmark job id, keyed off the match batch that
/// produced it so re-delivery of the same match batch can't double-enqueue.
pub fn benchmark_batch_job_id(feed_run_id: &str, batch_index: usize) -> String {
    format!("benchmark-batch:{feed_run_id}:{batch_index}")
}

/// Deterministic insight job id, keyed off the benchmark job that produced
/// the SKUs it covers.
pub fn insight_job_id(source_benchmark_job_id: &str) -> String {
    format!("insight:{source_benchmark_job_id}")
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues `job` under `job_id`; returns `false` without enqueueing if
    /// a job with that id is already present (idempotent dedup).
    async fn enqueue(&self, job_id: &str, job: &Job) -> anyhow::Result<bool>;
    async fn dequeue(&self, queue_name: &str) -> anyhow::Result<Option<Job>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_token_is_stable_within_the_same_bucket() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 10, 2, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 1, 10, 4, 59).unwrap();
        assert_eq!(window_token(a, 5), window_token(b, 5));
    }

    #[test]
    fn window_token_differs_across_buckets() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 10, 4, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 1, 10, 5, 0).unwrap();
        assert_ne!(window_token(a, 5), window_token(b, 5));
    }

    #[test]
    fn match_batch_job_id_is_deterministic_per_run_and_batch() {
        assert_eq!(match_batch_job_id("run1", 0), "sku-match:run1:0");
        assert_ne!(match_batch_job_id("run1", 0), match_batch_job_id("run1", 1));
    }

    #[test]
    fn benchmark_batch_job_id_is_deterministic_per_run_and_batch() {
        assert_eq!(benchmark_batch_job_id("run1", 0), "benchmark-batch:run1:0");
        assert_ne!(benchmark_batch_job_id("run1", 0), benchmark_batch_job_id("run1", 1));
    }

    #[test]
    fn insight_job_id_is_keyed_off_its_source_benchmark_job() {
        assert_eq!(insight_job_id("benchmark-full-123"), "insight:benchmark-full-123");
    }
}
