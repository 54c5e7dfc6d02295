//! Insight worker. Compares each dealer's active listing for a
//! canonical SKU against the published benchmark and emits pricing, stock,
//! and data-quality insights.

use crate::models::{Confidence, DealerSku, Insight, InsightType, Severity};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;

const HIGH_THRESHOLD: f64 = 0.25;
const MEDIUM_THRESHOLD: f64 = 0.15;

pub struct InsightWorker {
    store: Arc<dyn Store>,
}

impl InsightWorker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn run_many(&self, canonical_sku_ids: &[String]) -> Result<()> {
        for id in canonical_sku_ids {
            self.run_one(id).await?;
        }
        Ok(())
    }

    pub async fn run_one(&self, canonical_sku_id: &str) -> Result<()> {
        let Some(benchmark) = run_with_retry(RetryPolicy::downstream(), "insight-fetch-benchmark", || {
            self.store.get_benchmark(canonical_sku_id)
        })
        .await?
        else {
            return Ok(());
        };
        let sellers = run_with_retry(RetryPolicy::downstream(), "insight-fetch-sellers", || {
            self.store.active_dealer_skus_for_canonical(canonical_sku_id)
        })
        .await?;

        for seller in &sellers {
            if benchmark.confidence == Confidence::None {
                continue;
            }

            if let Some((kind, severity)) = pricing_insight(seller.effective_price(), benchmark.median) {
                self.store
                    .insert_insight(&Insight {
                        dealer_id: seller.dealer_id.clone(),
                        canonical_sku_id: canonical_sku_id.to_string(),
                        insight_type: kind,
                        severity,
                    })
                    .await?;
            }

            if !seller.in_stock && sellers.iter().any(|s| s.id != seller.id && s.in_stock) {
                self.store
                    .insert_insight(&Insight {
                        dealer_id: seller.dealer_id.clone(),
                        canonical_sku_id: canonical_sku_id.to_string(),
                        insight_type: InsightType::StockOpportunity,
                        severity: Severity::Medium,
                    })
                    .await?;
            }

            if attribute_gap(seller) {
                self.store
                    .insert_insight(&Insight {
                        dealer_id: seller.dealer_id.clone(),
                        canonical_sku_id: canonical_sku_id.to_string(),
                        insight_type: InsightType::AttributeGap,
                        severity: Severity::Medium,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}

fn pricing_insight(price: f64, median: f64) -> Option<(InsightType, Severity)> {
    if median <= 0.0 {
        return None;
    }
    let diff = (price - median) / median;
    if diff > HIGH_THRESHOLD {
        Some((InsightType::Overpriced, Severity::High))
    } else if diff > MEDIUM_THRESHOLD {
        Some((InsightType::Overpriced, Severity::Medium))
    } else if diff < -HIGH_THRESHOLD {
        Some((InsightType::Underpriced, Severity::High))
    } else if diff < -MEDIUM_THRESHOLD {
        Some((InsightType::Underpriced, Severity::Medium))
    } else {
        None
    }
}

/// The attribute gap fires only when the canonical row itself has both
/// fields populated; that check happens at
/// match time (a dealer SKU without caliber/brand can only auto-create a
/// canonical row if it has them), so here we only need the dealer's side.
fn attribute_gap(seller: &DealerSku) -> bool {
    seller.raw_caliber.as_deref().map(str::is_empty).unwrap_or(true)
        || seller.raw_brand.as_deref().map(str::is_empty).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overpriced_high_above_25_percent() {
        assert_eq!(pricing_insight(26.0, 20.0), Some((InsightType::Overpriced, Severity::High)));
    }

    #[test]
    fn overpriced_medium_between_15_and_25_percent() {
        assert_eq!(pricing_insight(23.0, 20.0), Some((InsightType::Overpriced, Severity::Medium)));
    }

    #[test]
    fn underpriced_high_below_negative_25_percent() {
        assert_eq!(pricing_insight(14.0, 20.0), Some((InsightType::Underpriced, Severity::High)));
    }

    #[test]
    fn within_band_is_no_insight() {
        assert_eq!(pricing_insight(21.0, 20.0), None);
    }

    fn seller(caliber: Option<&str>, brand: Option<&str>) -> DealerSku {
        DealerSku {
            id: "s1".into(),
            dealer_id: "d1".into(),
            feed_id: "f1".into(),
            dealer_sku_hash: "h".into(),
            raw_title: "t".into(),
            raw_upc: "012345678905".into(),
            raw_sku: "sku".into(),
            raw_price: 20.0,
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
    fn missing_caliber_is_an_attribute_gap() {
        assert!(attribute_gap(&seller(None, Some("Federal"))));
    }

    #[test]
    fn fully_populated_attributes_are_not_a_gap() {
        assert!(!attribute_gap(&seller(Some("9mm"), Some("Federal"))));
    }
}
