//! Persistence layer. `Store` is the trait
//! boundary; `sqlite` is the reference implementation. Any ACID store with
//! row-level conditional update can sit behind this trait.

pub mod sqlite;

use crate::classify::ParsedRecord;
use crate::errors::FieldError;
use crate::models::{
    Benchmark, CanonicalSku, Dealer, DealerSku, Feed, FeedRun, Insight, ProductLink,
    QuarantinedRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What an ingest run writes back for one parsed-and-classified record,
/// independent of which lane it landed in.
pub struct IndexableUpsert<'a> {
    pub dealer_id: &'a str,
    pub feed_id: &'a str,
    pub feed_run_id: &'a str,
    pub sku_hash: &'a str,
    pub record: &'a ParsedRecord,
}

pub struct QuarantineUpsert<'a> {
    pub feed_id: &'a str,
    pub match_key: &'a str,
    pub raw_data: serde_json::Value,
    pub parsed_fields: serde_json::Value,
    pub blocking_errors: Vec<FieldError>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_dealer(&self, dealer_id: &str) -> Result<Option<Dealer>>;
    async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>>;
    async fn due_feeds(&self, now: DateTime<Utc>) -> Result<Vec<Feed>>;
    async fn update_feed_after_run(&self, feed: &Feed) -> Result<()>;
    async fn clear_feed_failure(&self, feed_id: &str) -> Result<()>;
    async fn set_feed_last_run_at(&self, feed_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn create_feed_run(&self, run: &FeedRun) -> Result<()>;
    async fn commit_feed_run(&self, run: &FeedRun) -> Result<()>;

    async fn upsert_indexable(&self, upsert: IndexableUpsert<'_>) -> Result<String>;
    async fn upsert_quarantine(&self, upsert: QuarantineUpsert<'_>) -> Result<()>;
    async fn deactivate_stale_skus(&self, dealer_id: &str, feed_id: &str, current_run_id: &str) -> Result<u64>;
    async fn active_sku_ids_for_run(&self, feed_run_id: &str) -> Result<Vec<String>>;
    async fn get_dealer_sku(&self, id: &str) -> Result<Option<DealerSku>>;

    async fn list_canonical_skus(&self) -> Result<Vec<CanonicalSku>>;
    async fn create_canonical_sku(&self, sku: &CanonicalSku) -> Result<()>;
    async fn insert_product_link(&self, link: &ProductLink) -> Result<()>;

    async fn active_prices_for_canonical(&self, canonical_sku_id: &str) -> Result<Vec<f64>>;
    /// All active dealer SKUs currently linked to `canonical_sku_id`, used by
    /// the insight worker to evaluate stock-opportunity and attribute-gap
    /// rules against sibling sellers.
    async fn active_dealer_skus_for_canonical(&self, canonical_sku_id: &str) -> Result<Vec<DealerSku>>;
    async fn upsert_benchmark(&self, benchmark: &Benchmark) -> Result<()>;
    async fn get_benchmark(&self, canonical_sku_id: &str) -> Result<Option<Benchmark>>;

    async fn insert_insight(&self, insight: &Insight) -> Result<()>;

    /// Conditional update honoring the 24h subscription-notification rate
    /// limit; returns true if this call won the race and should send.
    async fn try_claim_subscription_notify(&self, dealer_id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn get_quarantined_record(&self, feed_id: &str, match_key: &str) -> Result<Option<QuarantinedRecord>>;
}
