//! Domain entities for the dealer ingestion and match pipeline.

use crate::errors::{ErrorCode, FieldError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Dealer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealerTier {
    Standard,
    Founding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub communication_opt_in: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dealer {
    pub id: String,
    pub business_name: String,
    pub contacts: Vec<Contact>,
    pub subscription_status: SubscriptionStatus,
    pub expires_at: DateTime<Utc>,
    pub grace_days: i64,
    pub last_subscription_notify_at: Option<DateTime<Utc>>,
    pub tier: DealerTier,
}

impl Dealer {
    /// FOUNDING tier bypasses expiry entirely. Otherwise active iff
    /// `now <= expiresAt` or still within the grace window.
    pub fn is_subscription_active(&self, now: DateTime<Utc>) -> bool {
        if self.tier == DealerTier::Founding {
            return true;
        }
        now <= self.expires_at || now <= self.expires_at + chrono::Duration::days(self.grace_days)
    }

    /// First contact opted in to receive notifications, if any.
    pub fn notification_recipient(&self) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.communication_opt_in)
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportKind {
    PublicUrl,
    AuthUrl,
    Ftp,
    Sftp,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatKind {
    Generic,
    AmmoseekV1,
    GunengineV2,
    Impact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedStatus {
    Pending,
    Healthy,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub dealer_id: String,
    pub transport: TransportKind,
    pub format: FormatKind,
    pub url: String,
    pub credentials: Option<Credentials>,
    pub schedule_minutes: i64,
    pub enabled: bool,
    pub status: FeedStatus,
    pub feed_hash: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub primary_error_code: Option<ErrorCode>,
    pub created_at: DateTime<Utc>,
}

impl Feed {
    /// Is this feed due for a scheduler tick, relative to `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled || self.status == FeedStatus::Failed {
            return false;
        }
        let reference = [self.last_run_at, self.last_success_at, Some(self.created_at)]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.created_at);
        now - reference >= chrono::Duration::minutes(self.schedule_minutes)
    }

    /// Clears FAILED status and error fields.
    pub fn clear_failure(&mut self) {
        self.status = FeedStatus::Pending;
        self.last_error = None;
        self.primary_error_code = None;
    }
}

// ---------------------------------------------------------------------------
// FeedRun
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Warning,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub total: u64,
    pub indexed: u64,
    pub quarantined: u64,
    pub rejected: u64,
    pub coercions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedSample {
    pub raw: serde_json::Value,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedRun {
    pub id: String,
    pub feed_id: String,
    pub dealer_id: String,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub primary_error_code: Option<ErrorCode>,
    pub error_codes: HashMap<ErrorCode, u64>,
    pub error_samples: Vec<RejectedSample>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub const MAX_ERROR_SAMPLES: usize = 100;

impl FeedRun {
    pub fn new(id: String, feed_id: String, dealer_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            feed_id,
            dealer_id,
            status: RunStatus::Pending,
            counts: RunCounts::default(),
            primary_error_code: None,
            error_codes: HashMap::new(),
            error_samples: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    pub fn record_error(&mut self, code: ErrorCode) {
        *self.error_codes.entry(code).or_insert(0) += 1;
    }

    pub fn push_sample(&mut self, sample: RejectedSample) {
        if self.error_samples.len() < MAX_ERROR_SAMPLES {
            self.error_samples.push(sample);
        }
    }

    /// Invariant: `indexed + quarantined + rejected == total`.
    pub fn invariant_holds(&self) -> bool {
        self.counts.indexed + self.counts.quarantined + self.counts.rejected == self.counts.total
    }

    /// argmax of the error histogram, ties broken by `ErrorCode` discriminant order.
    pub fn dominant_error_code(&self) -> Option<ErrorCode> {
        self.error_codes
            .iter()
            .max_by_key(|(code, count)| (**count, std::cmp::Reverse(code.as_str())))
            .map(|(code, _)| *code)
    }
}

// ---------------------------------------------------------------------------
// DealerSku
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoercionRecord {
    pub field: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DealerSku {
    pub id: String,
    pub dealer_id: String,
    pub feed_id: String,
    pub dealer_sku_hash: String,
    pub raw_title: String,
    pub raw_upc: String,
    pub raw_sku: String,
    pub raw_price: f64,
    pub raw_sale_price: Option<f64>,
    pub raw_description: Option<String>,
    pub raw_image_url: Option<String>,
    pub raw_caliber: Option<String>,
    pub raw_brand: Option<String>,
    pub in_stock: bool,
    pub coercions_applied: Vec<CoercionRecord>,
    pub feed_run_id: String,
    pub is_active: bool,
}

impl DealerSku {
    /// Effective price after the connector-level sale-price preference rule.
    pub fn effective_price(&self) -> f64 {
        match self.raw_sale_price {
            Some(sale) if sale > 0.0 => sale,
            _ => self.raw_price,
        }
    }
}

// ---------------------------------------------------------------------------
// QuarantinedRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QuarantineStatus {
    Quarantined,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinedRecord {
    pub id: String,
    pub feed_id: String,
    pub match_key: String,
    pub raw_data: serde_json::Value,
    pub parsed_fields: serde_json::Value,
    pub blocking_errors: Vec<FieldError>,
    pub status: QuarantineStatus,
}

impl QuarantinedRecord {
    /// QUARANTINED -> RESOLVED is monotonic; never regress.
    pub fn apply_refresh(&mut self, raw_data: serde_json::Value, parsed_fields: serde_json::Value, blocking_errors: Vec<FieldError>) {
        self.raw_data = raw_data;
        self.parsed_fields = parsed_fields;
        self.blocking_errors = blocking_errors;
        // status is left untouched: a RESOLVED record stays RESOLVED.
    }
}

// ---------------------------------------------------------------------------
// CanonicalSku
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalSku {
    pub id: String,
    pub caliber: String,
    pub brand: String,
    pub grain: Option<u32>,
    pub pack_size: Option<u32>,
    pub upc: Option<String>,
}

impl CanonicalSku {
    pub fn attr_key(&self) -> String {
        format!("{}|{}", self.caliber, self.brand)
    }
}

// ---------------------------------------------------------------------------
// Benchmark
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    None,
}

impl Confidence {
    pub fn from_seller_count(seller_count: u32) -> Self {
        if seller_count >= 5 {
            Confidence::High
        } else if seller_count >= 3 {
            Confidence::Medium
        } else {
            Confidence::None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    pub canonical_sku_id: String,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub mean: f64,
    pub seller_count: u32,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// Insight
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightType {
    Overpriced,
    Underpriced,
    StockOpportunity,
    AttributeGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub dealer_id: String,
    pub canonical_sku_id: String,
    pub insight_type: InsightType,
    pub severity: Severity,
}

// ---------------------------------------------------------------------------
// ProductLink (C5 output, consumed by the out-of-scope resolver)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Upc,
    Attribute,
    AutoCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductLink {
    pub dealer_sku_id: String,
    pub canonical_sku_id: String,
    pub match_score: f32,
    pub match_method: MatchMethod,
    pub matched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dealer(tier: DealerTier, expires_in_days: i64, grace_days: i64) -> Dealer {
        Dealer {
            id: "d1".into(),
            business_name: "Acme Ammo".into(),
            contacts: vec![],
            subscription_status: SubscriptionStatus::Active,
            expires_at: Utc::now() + chrono::Duration::days(expires_in_days),
            grace_days,
            last_subscription_notify_at: None,
            tier,
        }
    }

    #[test]
    fn founding_tier_bypasses_expiry() {
        let d = dealer(DealerTier::Founding, -365, 0);
        assert!(d.is_subscription_active(Utc::now()));
    }

    #[test]
    fn standard_tier_within_grace_is_active() {
        let d = dealer(DealerTier::Standard, -1, 7);
        assert!(d.is_subscription_active(Utc::now()));
    }

    #[test]
    fn standard_tier_past_grace_is_inactive() {
        let d = dealer(DealerTier::Standard, -10, 2);
        assert!(!d.is_subscription_active(Utc::now()));
    }

    #[test]
    fn sale_price_preferred_only_when_positive() {
        let mut sku = DealerSku {
            id: "1".into(),
            dealer_id: "d".into(),
            feed_id: "f".into(),
            dealer_sku_hash: "h".into(),
            raw_title: "t".into(),
            raw_upc: "012345678905".into(),
            raw_sku: "s".into(),
            raw_price: 25.99,
            raw_sale_price: Some(19.99),
            raw_description: None,
            raw_image_url: None,
            raw_caliber: None,
            raw_brand: None,
            in_stock: true,
            coercions_applied: vec![],
            feed_run_id: "r".into(),
            is_active: true,
        };
        assert_eq!(sku.effective_price(), 19.99);

        sku.raw_sale_price = Some(-1.0);
        assert_eq!(sku.effective_price(), 25.99);
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(Confidence::from_seller_count(5), Confidence::High);
        assert_eq!(Confidence::from_seller_count(4), Confidence::Medium);
        assert_eq!(Confidence::from_seller_count(3), Confidence::Medium);
        assert_eq!(Confidence::from_seller_count(2), Confidence::None);
    }

    #[test]
    fn run_invariant_and_dominant_error() {
        let mut run = FeedRun::new("r1".into(), "f1".into(), "d1".into(), Utc::now());
        run.counts.total = 5;
        run.counts.indexed = 2;
        run.counts.quarantined = 1;
        run.counts.rejected = 2;
        assert!(run.invariant_holds());

        run.record_error(ErrorCode::MissingUpc);
        run.record_error(ErrorCode::MissingTitle);
        run.record_error(ErrorCode::MissingTitle);
        assert_eq!(run.dominant_error_code(), Some(ErrorCode::MissingTitle));
    }
}
