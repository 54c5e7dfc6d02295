//! Match worker. Resolves each dealer SKU in a batch against a
//! versioned in-memory snapshot of canonical SKUs, creating a new canonical
//! row on miss. The snapshot is swapped atomically via `ArcSwap` so lookups
//! never block a concurrent rebuild.

use crate::models::{CanonicalSku, DealerSku, MatchMethod, ProductLink};
use crate::queue::{self, BenchmarkJob, Job, JobQueue, MatchBatchJob};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::Store;
use anyhow::Result;
use arc_swap::ArcSwap;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Snapshot of the canonical catalog, keyed for O(1) lookup by the two
/// match strategies the worker tries in priority order.
struct CanonicalSnapshot {
    upc_map: HashMap<String, String>,
    attr_map: HashMap<String, String>,
}

impl CanonicalSnapshot {
    fn build(skus: &[CanonicalSku]) -> Self {
        let mut upc_map = HashMap::with_capacity(skus.len());
        let mut attr_map = HashMap::with_capacity(skus.len());
        for sku in skus {
            if let Some(upc) = &sku.upc {
                upc_map.insert(upc.clone(), sku.id.clone());
            }
            attr_map.entry(sku.attr_key()).or_insert_with(|| sku.id.clone());
        }
        Self { upc_map, attr_map }
    }

    fn lookup(&self, dealer_sku: &DealerSku) -> Option<(String, MatchMethod)> {
        if !dealer_sku.raw_upc.is_empty() {
            if let Some(id) = self.upc_map.get(&dealer_sku.raw_upc) {
                return Some((id.clone(), MatchMethod::Upc));
            }
        }
        let caliber = dealer_sku.raw_caliber.as_deref()?;
        let brand = dealer_sku.raw_brand.as_deref()?;
        let key = format!("{caliber}|{brand}");
        self.attr_map.get(&key).map(|id| (id.clone(), MatchMethod::Attribute))
    }
}

pub struct MatchWorker {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
    snapshot: ArcSwap<CanonicalSnapshot>,
}

impl MatchWorker {
    pub async fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Result<Self> {
        let skus = run_with_retry(RetryPolicy::downstream(), "match-initial-snapshot", || {
            store.list_canonical_skus()
        })
        .await?;
        Ok(Self {
            store,
            queue,
            snapshot: ArcSwap::new(Arc::new(CanonicalSnapshot::build(&skus))),
        })
    }

    /// Reloads the in-memory snapshot from the store. Called periodically
    /// by the worker loop so auto-created canonical rows from other
    /// replicas become visible without a restart.
    pub async fn refresh_snapshot(&self) -> Result<()> {
        let skus = run_with_retry(RetryPolicy::downstream(), "match-refresh-snapshot", || {
            self.store.list_canonical_skus()
        })
        .await?;
        self.snapshot.store(Arc::new(CanonicalSnapshot::build(&skus)));
        Ok(())
    }

    /// Matches one batch of dealer SKU ids, in parallel.
    /// Misses are auto-created sequentially afterward so two SKUs in the
    /// same batch that miss on the same attribute key converge onto a
    /// single new canonical row instead of spawning duplicates. Canonical
    /// SKUs touched by the batch are handed to the benchmark queue so
    /// pricing stays current without waiting on the periodic tick.
    pub async fn run_batch(&self, job: &MatchBatchJob) -> Result<()> {
        let mut dealer_skus = Vec::with_capacity(job.dealer_sku_ids.len());
        for id in &job.dealer_sku_ids {
            if let Some(sku) = self.store.get_dealer_sku(id).await? {
                dealer_skus.push(sku);
            }
        }

        let snapshot = self.snapshot.load();
        let resolved: Vec<(DealerSku, Option<(String, MatchMethod)>)> = dealer_skus
            .into_par_iter()
            .map(|sku| {
                let hit = snapshot.lookup(&sku);
                (sku, hit)
            })
            .collect();

        let mut touched: HashSet<String> = HashSet::new();
        for (dealer_sku, hit) in resolved {
            let (canonical_id, method) = match hit {
                Some(found) => found,
                None => match self.auto_create(&dealer_sku).await? {
                    Some(created) => created,
                    None => continue, // no caliber/brand to seed a new row with
                },
            };

            let link = ProductLink {
                dealer_sku_id: dealer_sku.id.clone(),
                canonical_sku_id: canonical_id.clone(),
                match_score: if method == MatchMethod::Upc { 1.0 } else { 0.8 },
                match_method: method,
                matched_at: Utc::now(),
            };
            self.store.insert_product_link(&link).await?;
            touched.insert(canonical_id);
        }

        if !touched.is_empty() {
            let job_id = queue::benchmark_batch_job_id(&job.feed_run_id, job.batch_index);
            let benchmark_job = Job::Benchmark(BenchmarkJob {
                job_id: job_id.clone(),
                canonical_sku_ids: touched.into_iter().collect(),
            });
            if !self.queue.enqueue(&job_id, &benchmark_job).await? {
                warn!(job_id, "benchmark batch already enqueued, skipping duplicate");
            }
        }

        Ok(())
    }

    /// Auto-create on miss: seeds a new canonical row from the dealer's own
    /// attributes and folds it into the live snapshot so later SKUs in this
    /// and subsequent batches converge onto it.
    async fn auto_create(&self, dealer_sku: &DealerSku) -> Result<Option<(String, MatchMethod)>> {
        let caliber = match &dealer_sku.raw_caliber {
            Some(c) if !c.is_empty() => c.clone(),
            _ => return Ok(None),
        };
        let brand = match &dealer_sku.raw_brand {
            Some(b) if !b.is_empty() => b.clone(),
            _ => return Ok(None),
        };

        let attr_key = format!("{caliber}|{brand}");
        if let Some(id) = self.snapshot.load().attr_map.get(&attr_key) {
            return Ok(Some((id.clone(), MatchMethod::Attribute)));
        }

        let new_sku = CanonicalSku {
            id: Uuid::new_v4().to_string(),
            caliber,
            brand,
            grain: None,
            pack_size: None,
            upc: if dealer_sku.raw_upc.is_empty() { None } else { Some(dealer_sku.raw_upc.clone()) },
        };
        self.store.create_canonical_sku(&new_sku).await?;
        info!(canonical_sku_id = %new_sku.id, attr_key, "auto-created canonical sku");
        self.refresh_snapshot().await?;
        Ok(Some((new_sku.id, MatchMethod::AutoCreated)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku(caliber: &str, brand: &str, upc: Option<&str>) -> CanonicalSku {
        CanonicalSku {
            id: format!("{caliber}-{brand}"),
            caliber: caliber.to_string(),
            brand: brand.to_string(),
            grain: None,
            pack_size: None,
            upc: upc.map(str::to_string),
        }
    }

    fn dealer_sku(upc: &str, caliber: Option<&str>, brand: Option<&str>) -> DealerSku {
        DealerSku {
            id: "d1".into(),
            dealer_id: "dealer".into(),
            feed_id: "feed".into(),
            dealer_sku_hash: "h".into(),
            raw_title: "t".into(),
            raw_upc: upc.to_string(),
            raw_sku: "s".into(),
            raw_price: 9.99,
            raw_sale_price: None,
            raw_description: None,
            raw_image_url: None,
            raw_caliber: caliber.map(str::to_string),
            raw_brand: brand.map(str::to_string),
            in_stock: true,
            coercions_applied: vec![],
            feed_run_id: "r".into(),
            is_active: true,
        }
    }

    #[test]
    fn upc_match_takes_priority_over_attribute_match() {
        let skus = vec![sku("9mm", "Federal", Some("012345678905")), sku("9mm", "Winchester", None)];
        let snapshot = CanonicalSnapshot::build(&skus);
        let dealer = dealer_sku("012345678905", Some("9mm"), Some("Winchester"));
        let (id, method) = snapshot.lookup(&dealer).unwrap();
        assert_eq!(id, "9mm-Federal");
        assert_eq!(method, MatchMethod::Upc);
    }

    #[test]
    fn falls_back_to_attribute_match_when_upc_unknown() {
        let skus = vec![sku("9mm", "Winchester", None)];
        let snapshot = CanonicalSnapshot::build(&skus);
        let dealer = dealer_sku("999999999999", Some("9mm"), Some("Winchester"));
        let (id, method) = snapshot.lookup(&dealer).unwrap();
        assert_eq!(id, "9mm-Winchester");
        assert_eq!(method, MatchMethod::Attribute);
    }

    #[test]
    fn no_match_when_attributes_missing() {
        let skus = vec![sku("9mm", "Winchester", None)];
        let snapshot = CanonicalSnapshot::build(&skus);
        let dealer = dealer_sku("", None, None);
        assert!(snapshot.lookup(&dealer).is_none());
    }
}
