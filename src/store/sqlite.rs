//! SQLite-backed reference `Store`. WAL mode + a single guarded
//! connection: one `Arc<Mutex<Connection>>`, a single `SCHEMA_SQL`
//! batch, `INSERT ... ON CONFLICT DO UPDATE` upserts.

use super::{IndexableUpsert, QuarantineUpsert, Store};
use crate::errors::{ErrorCode, FieldError};
use crate::models::{
    Benchmark, CanonicalSku, Confidence, Contact, Dealer, DealerSku, DealerTier, Feed, FeedRun,
    FeedStatus, FormatKind, Insight, InsightType, ProductLink, QuarantineStatus,
    QuarantinedRecord, RejectedSample, RunCounts, RunStatus, Severity, SubscriptionStatus,
    TransportKind,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Arc;
use tracing::warn;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS dealers (
    id TEXT PRIMARY KEY,
    business_name TEXT NOT NULL,
    contacts_json TEXT NOT NULL,
    subscription_status TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    grace_days INTEGER NOT NULL,
    last_subscription_notify_at INTEGER,
    tier TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS feeds (
    id TEXT PRIMARY KEY,
    dealer_id TEXT NOT NULL,
    transport TEXT NOT NULL,
    format TEXT NOT NULL,
    url TEXT NOT NULL,
    credentials_json TEXT,
    schedule_minutes INTEGER NOT NULL,
    enabled INTEGER NOT NULL,
    status TEXT NOT NULL,
    feed_hash TEXT,
    last_success_at INTEGER,
    last_failure_at INTEGER,
    last_run_at INTEGER,
    last_error TEXT,
    primary_error_code TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_feeds_dealer ON feeds(dealer_id);

CREATE TABLE IF NOT EXISTS feed_runs (
    id TEXT PRIMARY KEY,
    feed_id TEXT NOT NULL,
    dealer_id TEXT NOT NULL,
    status TEXT NOT NULL,
    total INTEGER NOT NULL,
    indexed INTEGER NOT NULL,
    quarantined INTEGER NOT NULL,
    rejected INTEGER NOT NULL,
    coercions INTEGER NOT NULL,
    primary_error_code TEXT,
    error_codes_json TEXT NOT NULL,
    error_samples_json TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    finished_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_feed_runs_feed ON feed_runs(feed_id, started_at DESC);

CREATE TABLE IF NOT EXISTS dealer_skus (
    id TEXT PRIMARY KEY,
    dealer_id TEXT NOT NULL,
    feed_id TEXT NOT NULL,
    dealer_sku_hash TEXT NOT NULL,
    raw_title TEXT NOT NULL,
    raw_upc TEXT NOT NULL,
    raw_sku TEXT NOT NULL,
    raw_price REAL NOT NULL,
    raw_sale_price REAL,
    raw_description TEXT,
    raw_image_url TEXT,
    raw_caliber TEXT,
    raw_brand TEXT,
    in_stock INTEGER NOT NULL,
    coercions_applied_json TEXT NOT NULL,
    feed_run_id TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    canonical_sku_id TEXT,
    UNIQUE(dealer_id, dealer_sku_hash)
);
CREATE INDEX IF NOT EXISTS idx_dealer_skus_feed_active ON dealer_skus(dealer_id, feed_id, is_active);
CREATE INDEX IF NOT EXISTS idx_dealer_skus_canonical ON dealer_skus(canonical_sku_id);

CREATE TABLE IF NOT EXISTS quarantined_records (
    id TEXT PRIMARY KEY,
    feed_id TEXT NOT NULL,
    match_key TEXT NOT NULL,
    raw_data_json TEXT NOT NULL,
    parsed_fields_json TEXT NOT NULL,
    blocking_errors_json TEXT NOT NULL,
    status TEXT NOT NULL,
    UNIQUE(feed_id, match_key)
);

CREATE TABLE IF NOT EXISTS canonical_skus (
    id TEXT PRIMARY KEY,
    caliber TEXT NOT NULL,
    brand TEXT NOT NULL,
    grain INTEGER,
    pack_size INTEGER,
    upc TEXT
);
CREATE INDEX IF NOT EXISTS idx_canonical_skus_upc ON canonical_skus(upc);
CREATE INDEX IF NOT EXISTS idx_canonical_skus_attr ON canonical_skus(caliber, brand);

CREATE TABLE IF NOT EXISTS benchmarks (
    canonical_sku_id TEXT PRIMARY KEY,
    min REAL NOT NULL,
    median REAL NOT NULL,
    max REAL NOT NULL,
    mean REAL NOT NULL,
    seller_count INTEGER NOT NULL,
    confidence TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS insights (
    dealer_id TEXT NOT NULL,
    canonical_sku_id TEXT NOT NULL,
    insight_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (dealer_id, canonical_sku_id, insight_type)
);

CREATE TABLE IF NOT EXISTS product_links (
    dealer_sku_id TEXT NOT NULL,
    canonical_sku_id TEXT NOT NULL,
    match_score REAL NOT NULL,
    match_method TEXT NOT NULL,
    matched_at INTEGER NOT NULL,
    PRIMARY KEY (dealer_sku_id, canonical_sku_id)
);
"#;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize dealer-ingest schema")?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn ts(dt: DateTime<Utc>) -> i64 {
        dt.timestamp()
    }

    fn opt_ts(dt: Option<DateTime<Utc>>) -> Option<i64> {
        dt.map(Self::ts)
    }

    fn from_ts(v: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(v, 0).single().unwrap_or_else(Utc::now)
    }
}

fn error_code_from_str(s: &str) -> Option<ErrorCode> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

fn error_code_to_str(code: ErrorCode) -> String {
    serde_json::to_value(code).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_dealer(&self, dealer_id: &str) -> Result<Option<Dealer>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, business_name, contacts_json, subscription_status, expires_at, grace_days, \
                    last_subscription_notify_at, tier \
             FROM dealers WHERE id = ?1",
        )?;
        let mut rows = stmt.query([dealer_id])?;
        let Some(row) = rows.next()? else { return Ok(None) };

        let id: String = row.get(0)?;
        let business_name: String = row.get(1)?;
        let contacts_json: String = row.get(2)?;
        let subscription_status: String = row.get(3)?;
        let expires_at: i64 = row.get(4)?;
        let grace_days: i64 = row.get(5)?;
        let last_notify: Option<i64> = row.get(6)?;
        let tier: String = row.get(7)?;

        let contacts: Vec<Contact> = serde_json::from_str(&contacts_json).unwrap_or_default();
        let subscription_status = match subscription_status.as_str() {
            "expired" => SubscriptionStatus::Expired,
            "suspended" => SubscriptionStatus::Suspended,
            _ => SubscriptionStatus::Active,
        };
        let tier = if tier == "founding" { DealerTier::Founding } else { DealerTier::Standard };

        Ok(Some(Dealer {
            id,
            business_name,
            contacts,
            subscription_status,
            expires_at: Self::from_ts(expires_at),
            grace_days,
            last_subscription_notify_at: last_notify.map(Self::from_ts),
            tier,
        }))
    }

    async fn get_feed(&self, feed_id: &str) -> Result<Option<Feed>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, dealer_id, transport, format, url, credentials_json, schedule_minutes, enabled, \
                    status, feed_hash, last_success_at, last_failure_at, last_run_at, last_error, \
                    primary_error_code, created_at \
             FROM feeds WHERE id = ?1",
        )?;
        let mut rows = stmt.query([feed_id])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        Ok(Some(row_to_feed(row)?))
    }

    async fn due_feeds(&self, _now: DateTime<Utc>) -> Result<Vec<Feed>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, dealer_id, transport, format, url, credentials_json, schedule_minutes, enabled, \
                    status, feed_hash, last_success_at, last_failure_at, last_run_at, last_error, \
                    primary_error_code, created_at \
             FROM feeds WHERE enabled = 1 AND status != 'FAILED'",
        )?;
        let feeds = stmt
            .query_map([], row_to_feed)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(feeds)
    }

    async fn update_feed_after_run(&self, feed: &Feed) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE feeds SET status=?1, feed_hash=?2, last_success_at=?3, last_failure_at=?4, \
                              last_run_at=?5, last_error=?6, primary_error_code=?7 \
             WHERE id=?8",
            params![
                status_to_str(feed.status),
                feed.feed_hash,
                Self::opt_ts(feed.last_success_at),
                Self::opt_ts(feed.last_failure_at),
                Self::opt_ts(feed.last_run_at),
                feed.last_error,
                feed.primary_error_code.map(error_code_to_str),
                feed.id,
            ],
        )?;
        Ok(())
    }

    async fn clear_feed_failure(&self, feed_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE feeds SET status='PENDING', last_error=NULL, primary_error_code=NULL WHERE id=?1",
            [feed_id],
        )?;
        Ok(())
    }

    async fn set_feed_last_run_at(&self, feed_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("UPDATE feeds SET last_run_at=?1 WHERE id=?2", params![Self::ts(at), feed_id])?;
        Ok(())
    }

    async fn create_feed_run(&self, run: &FeedRun) -> Result<()> {
        self.commit_feed_run(run).await
    }

    async fn commit_feed_run(&self, run: &FeedRun) -> Result<()> {
        let error_codes_json = serde_json::to_string(
            &run.error_codes.iter().map(|(k, v)| (error_code_to_str(*k), *v)).collect::<std::collections::HashMap<_, _>>(),
        )?;
        let error_samples_json = serde_json::to_string(&run.error_samples)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO feed_runs (id, feed_id, dealer_id, status, total, indexed, quarantined, rejected, \
                                    coercions, primary_error_code, error_codes_json, error_samples_json, \
                                    started_at, finished_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14) \
             ON CONFLICT(id) DO UPDATE SET \
                status=excluded.status, total=excluded.total, indexed=excluded.indexed, \
                quarantined=excluded.quarantined, rejected=excluded.rejected, coercions=excluded.coercions, \
                primary_error_code=excluded.primary_error_code, error_codes_json=excluded.error_codes_json, \
                error_samples_json=excluded.error_samples_json, finished_at=excluded.finished_at",
            params![
                run.id,
                run.feed_id,
                run.dealer_id,
                run_status_to_str(run.status),
                run.counts.total as i64,
                run.counts.indexed as i64,
                run.counts.quarantined as i64,
                run.counts.rejected as i64,
                run.counts.coercions as i64,
                run.primary_error_code.map(error_code_to_str),
                error_codes_json,
                error_samples_json,
                Self::ts(run.started_at),
                Self::opt_ts(run.finished_at),
            ],
        )?;
        Ok(())
    }

    async fn upsert_indexable(&self, upsert: IndexableUpsert<'_>) -> Result<String> {
        let record = upsert.record;
        let coercions_json = serde_json::to_string(&record.coercions)?;
        let id = format!("{}:{}", upsert.dealer_id, upsert.sku_hash);

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO dealer_skus (id, dealer_id, feed_id, dealer_sku_hash, raw_title, raw_upc, raw_sku, \
                                      raw_price, raw_sale_price, raw_description, raw_image_url, raw_caliber, \
                                      raw_brand, in_stock, coercions_applied_json, feed_run_id, is_active) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,1) \
             ON CONFLICT(dealer_id, dealer_sku_hash) DO UPDATE SET \
                raw_price=excluded.raw_price, raw_sale_price=excluded.raw_sale_price, \
                raw_description=excluded.raw_description, raw_image_url=excluded.raw_image_url, \
                in_stock=excluded.in_stock, coercions_applied_json=excluded.coercions_applied_json, \
                feed_run_id=excluded.feed_run_id, is_active=1",
            params![
                id,
                upsert.dealer_id,
                upsert.feed_id,
                upsert.sku_hash,
                record.title,
                record.upc.clone().unwrap_or_default(),
                record.sku,
                record.price.unwrap_or(0.0),
                record.sale_price,
                record.description,
                record.image_url,
                record.caliber,
                record.brand,
                record.in_stock as i64,
                coercions_json,
                upsert.feed_run_id,
            ],
        )?;
        Ok(id)
    }

    async fn upsert_quarantine(&self, upsert: QuarantineUpsert<'_>) -> Result<()> {
        let blocking_errors_json = serde_json::to_string(&upsert.blocking_errors)?;
        let raw_data_json = serde_json::to_string(&upsert.raw_data)?;
        let parsed_fields_json = serde_json::to_string(&upsert.parsed_fields)?;
        let id = format!("{}:{}", upsert.feed_id, upsert.match_key);

        let conn = self.conn.lock();
        // status stays untouched on conflict: a RESOLVED record must never regress.
        conn.execute(
            "INSERT INTO quarantined_records (id, feed_id, match_key, raw_data_json, parsed_fields_json, \
                                               blocking_errors_json, status) \
             VALUES (?1,?2,?3,?4,?5,?6,'QUARANTINED') \
             ON CONFLICT(feed_id, match_key) DO UPDATE SET \
                raw_data_json=excluded.raw_data_json, parsed_fields_json=excluded.parsed_fields_json, \
                blocking_errors_json=excluded.blocking_errors_json",
            params![id, upsert.feed_id, upsert.match_key, raw_data_json, parsed_fields_json, blocking_errors_json],
        )?;
        Ok(())
    }

    async fn deactivate_stale_skus(&self, dealer_id: &str, feed_id: &str, current_run_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE dealer_skus SET is_active=0 \
             WHERE dealer_id=?1 AND feed_id=?2 AND feed_run_id != ?3 AND is_active=1",
            params![dealer_id, feed_id, current_run_id],
        )?;
        Ok(changed as u64)
    }

    async fn active_sku_ids_for_run(&self, feed_run_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id FROM dealer_skus WHERE feed_run_id = ?1 AND is_active = 1")?;
        let ids = stmt.query_map([feed_run_id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
        Ok(ids)
    }

    async fn get_dealer_sku(&self, id: &str) -> Result<Option<DealerSku>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, dealer_id, feed_id, dealer_sku_hash, raw_title, raw_upc, raw_sku, raw_price, \
                    raw_sale_price, raw_description, raw_image_url, raw_caliber, raw_brand, in_stock, \
                    coercions_applied_json, feed_run_id, is_active \
             FROM dealer_skus WHERE id = ?1",
        )?;
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        Ok(Some(row_to_dealer_sku(row)?))
    }

    async fn list_canonical_skus(&self) -> Result<Vec<CanonicalSku>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, caliber, brand, grain, pack_size, upc FROM canonical_skus")?;
        let skus = stmt
            .query_map([], |row| {
                Ok(CanonicalSku {
                    id: row.get(0)?,
                    caliber: row.get(1)?,
                    brand: row.get(2)?,
                    grain: row.get::<_, Option<i64>>(3)?.map(|v| v as u32),
                    pack_size: row.get::<_, Option<i64>>(4)?.map(|v| v as u32),
                    upc: row.get(5)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(skus)
    }

    async fn create_canonical_sku(&self, sku: &CanonicalSku) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO canonical_skus (id, caliber, brand, grain, pack_size, upc) VALUES (?1,?2,?3,?4,?5,?6) \
             ON CONFLICT(id) DO NOTHING",
            params![sku.id, sku.caliber, sku.brand, sku.grain.map(|v| v as i64), sku.pack_size.map(|v| v as i64), sku.upc],
        )?;
        Ok(())
    }

    async fn insert_product_link(&self, link: &ProductLink) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO product_links (dealer_sku_id, canonical_sku_id, match_score, match_method, matched_at) \
             VALUES (?1,?2,?3,?4,?5) \
             ON CONFLICT(dealer_sku_id, canonical_sku_id) DO UPDATE SET \
                match_score=excluded.match_score, match_method=excluded.match_method, matched_at=excluded.matched_at",
            params![
                link.dealer_sku_id,
                link.canonical_sku_id,
                link.match_score,
                match_method_to_str(link.match_method),
                Self::ts(link.matched_at),
            ],
        )?;
        conn.execute("UPDATE dealer_skus SET canonical_sku_id=?1 WHERE id=?2", params![link.canonical_sku_id, link.dealer_sku_id])?;
        Ok(())
    }

    async fn active_prices_for_canonical(&self, canonical_sku_id: &str) -> Result<Vec<f64>> {
        let conn = self.conn.lock();
        // Grouped by dealer_id so a dealer listing the same canonical SKU under
        // more than one feed/dealer_sku row contributes a single price.
        let mut stmt = conn.prepare_cached(
            "SELECT MIN(COALESCE(raw_sale_price, raw_price)) FROM dealer_skus \
             WHERE canonical_sku_id = ?1 AND is_active = 1 \
             GROUP BY dealer_id",
        )?;
        let prices = stmt.query_map([canonical_sku_id], |row| row.get(0))?.filter_map(|r| r.ok()).collect();
        Ok(prices)
    }

    async fn active_dealer_skus_for_canonical(&self, canonical_sku_id: &str) -> Result<Vec<DealerSku>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, dealer_id, feed_id, dealer_sku_hash, raw_title, raw_upc, raw_sku, raw_price, \
                    raw_sale_price, raw_description, raw_image_url, raw_caliber, raw_brand, in_stock, \
                    coercions_applied_json, feed_run_id, is_active \
             FROM dealer_skus WHERE canonical_sku_id = ?1 AND is_active = 1",
        )?;
        let rows = stmt.query_map([canonical_sku_id], |row| row_to_dealer_sku(row))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    async fn upsert_benchmark(&self, benchmark: &Benchmark) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO benchmarks (canonical_sku_id, min, median, max, mean, seller_count, confidence) \
             VALUES (?1,?2,?3,?4,?5,?6,?7) \
             ON CONFLICT(canonical_sku_id) DO UPDATE SET \
                min=excluded.min, median=excluded.median, max=excluded.max, mean=excluded.mean, \
                seller_count=excluded.seller_count, confidence=excluded.confidence",
            params![
                benchmark.canonical_sku_id,
                benchmark.min,
                benchmark.median,
                benchmark.max,
                benchmark.mean,
                benchmark.seller_count,
                confidence_to_str(benchmark.confidence),
            ],
        )?;
        Ok(())
    }

    async fn get_benchmark(&self, canonical_sku_id: &str) -> Result<Option<Benchmark>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT canonical_sku_id, min, median, max, mean, seller_count, confidence FROM benchmarks WHERE canonical_sku_id = ?1",
        )?;
        let mut rows = stmt.query([canonical_sku_id])?;
        let Some(row) = rows.next()? else { return Ok(None) };
        let confidence_str: String = row.get(6)?;
        Ok(Some(Benchmark {
            canonical_sku_id: row.get(0)?,
            min: row.get(1)?,
            median: row.get(2)?,
            max: row.get(3)?,
            mean: row.get(4)?,
            seller_count: row.get::<_, i64>(5)? as u32,
            confidence: confidence_from_str(&confidence_str),
        }))
    }

    async fn insert_insight(&self, insight: &Insight) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO insights (dealer_id, canonical_sku_id, insight_type, severity, created_at) \
             VALUES (?1,?2,?3,?4,?5) \
             ON CONFLICT(dealer_id, canonical_sku_id, insight_type) DO UPDATE SET \
                severity=excluded.severity, created_at=excluded.created_at",
            params![
                insight.dealer_id,
                insight.canonical_sku_id,
                insight_type_to_str(insight.insight_type),
                severity_to_str(insight.severity),
                Self::ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    async fn try_claim_subscription_notify(&self, dealer_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let cutoff = Self::ts(now) - 24 * 3600;
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE dealers SET last_subscription_notify_at = ?1 \
             WHERE id = ?2 AND (last_subscription_notify_at IS NULL OR last_subscription_notify_at <= ?3)",
            params![Self::ts(now), dealer_id, cutoff],
        )?;
        if changed == 0 {
            warn!(dealer_id, "subscription notification suppressed by 24h rate limit");
        }
        Ok(changed > 0)
    }

    async fn get_quarantined_record(&self, feed_id: &str, match_key: &str) -> Result<Option<QuarantinedRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, feed_id, match_key, raw_data_json, parsed_fields_json, blocking_errors_json, status \
             FROM quarantined_records WHERE feed_id = ?1 AND match_key = ?2",
        )?;
        let mut rows = stmt.query(params![feed_id, match_key])?;
        let Some(row) = rows.next()? else { return Ok(None) };

        let blocking_errors_json: String = row.get(5)?;
        let status: String = row.get(6)?;
        Ok(Some(QuarantinedRecord {
            id: row.get(0)?,
            feed_id: row.get(1)?,
            match_key: row.get(2)?,
            raw_data: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or_default(),
            parsed_fields: serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
            blocking_errors: serde_json::from_str::<Vec<FieldError>>(&blocking_errors_json).unwrap_or_default(),
            status: if status == "RESOLVED" { QuarantineStatus::Resolved } else { QuarantineStatus::Quarantined },
        }))
    }
}

fn row_to_feed(row: &rusqlite::Row) -> rusqlite::Result<Feed> {
    let transport: String = row.get(2)?;
    let format: String = row.get(3)?;
    let credentials_json: Option<String> = row.get(5)?;
    let status: String = row.get(8)?;
    let primary_error_code: Option<String> = row.get(14)?;

    Ok(Feed {
        id: row.get(0)?,
        dealer_id: row.get(1)?,
        transport: transport_from_str(&transport),
        format: format_from_str(&format),
        url: row.get(4)?,
        credentials: credentials_json.and_then(|s| serde_json::from_str(&s).ok()),
        schedule_minutes: row.get(6)?,
        enabled: row.get::<_, i64>(7)? != 0,
        status: status_from_str(&status),
        feed_hash: row.get(9)?,
        last_success_at: row.get::<_, Option<i64>>(10)?.map(SqliteStore::from_ts),
        last_failure_at: row.get::<_, Option<i64>>(11)?.map(SqliteStore::from_ts),
        last_run_at: row.get::<_, Option<i64>>(12)?.map(SqliteStore::from_ts),
        last_error: row.get(13)?,
        primary_error_code: primary_error_code.and_then(|s| error_code_from_str(&s)),
        created_at: SqliteStore::from_ts(row.get::<_, i64>(15)?),
    })
}

fn row_to_dealer_sku(row: &rusqlite::Row) -> rusqlite::Result<DealerSku> {
    let coercions_json: String = row.get(14)?;
    Ok(DealerSku {
        id: row.get(0)?,
        dealer_id: row.get(1)?,
        feed_id: row.get(2)?,
        dealer_sku_hash: row.get(3)?,
        raw_title: row.get(4)?,
        raw_upc: row.get(5)?,
        raw_sku: row.get(6)?,
        raw_price: row.get(7)?,
        raw_sale_price: row.get(8)?,
        raw_description: row.get(9)?,
        raw_image_url: row.get(10)?,
        raw_caliber: row.get(11)?,
        raw_brand: row.get(12)?,
        in_stock: row.get::<_, i64>(13)? != 0,
        coercions_applied: serde_json::from_str(&coercions_json).unwrap_or_default(),
        feed_run_id: row.get(15)?,
        is_active: row.get::<_, i64>(16)? != 0,
    })
}

fn transport_from_str(s: &str) -> TransportKind {
    match s {
        "AUTH_URL" => TransportKind::AuthUrl,
        "FTP" => TransportKind::Ftp,
        "SFTP" => TransportKind::Sftp,
        "UPLOAD" => TransportKind::Upload,
        _ => TransportKind::PublicUrl,
    }
}

fn format_from_str(s: &str) -> FormatKind {
    match s {
        "AMMOSEEK_V1" => FormatKind::AmmoseekV1,
        "GUNENGINE_V2" => FormatKind::GunengineV2,
        "IMPACT" => FormatKind::Impact,
        _ => FormatKind::Generic,
    }
}

fn status_from_str(s: &str) -> FeedStatus {
    match s {
        "HEALTHY" => FeedStatus::Healthy,
        "WARNING" => FeedStatus::Warning,
        "FAILED" => FeedStatus::Failed,
        _ => FeedStatus::Pending,
    }
}

fn status_to_str(status: FeedStatus) -> &'static str {
    match status {
        FeedStatus::Pending => "PENDING",
        FeedStatus::Healthy => "HEALTHY",
        FeedStatus::Warning => "WARNING",
        FeedStatus::Failed => "FAILED",
    }
}

fn run_status_to_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Pending => "PENDING",
        RunStatus::Running => "RUNNING",
        RunStatus::Success => "SUCCESS",
        RunStatus::Warning => "WARNING",
        RunStatus::Failure => "FAILURE",
        RunStatus::Skipped => "SKIPPED",
    }
}

fn confidence_to_str(confidence: Confidence) -> &'static str {
    match confidence {
        Confidence::High => "HIGH",
        Confidence::Medium => "MEDIUM",
        Confidence::None => "NONE",
    }
}

fn confidence_from_str(s: &str) -> Confidence {
    match s {
        "HIGH" => Confidence::High,
        "MEDIUM" => Confidence::Medium,
        _ => Confidence::None,
    }
}

fn match_method_to_str(method: crate::models::MatchMethod) -> &'static str {
    match method {
        crate::models::MatchMethod::Upc => "upc",
        crate::models::MatchMethod::Attribute => "attribute",
        crate::models::MatchMethod::AutoCreated => "auto_created",
    }
}

fn insight_type_to_str(t: InsightType) -> &'static str {
    match t {
        InsightType::Overpriced => "OVERPRICED",
        InsightType::Underpriced => "UNDERPRICED",
        InsightType::StockOpportunity => "STOCK_OPPORTUNITY",
        InsightType::AttributeGap => "ATTRIBUTE_GAP",
    }
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "HIGH",
        Severity::Medium => "MEDIUM",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ParsedRecord;

    fn temp_store() -> SqliteStore {
        let file = tempfile::NamedTempFile::new().unwrap();
        SqliteStore::open(file.path().to_str().unwrap()).unwrap()
    }

    fn sample_record() -> ParsedRecord {
        ParsedRecord {
            title: "Federal 9mm".into(),
            upc: Some("012345678905".into()),
            upc_raw: Some("012345678905".into()),
            sku: "F9".into(),
            price: Some(19.99),
            sale_price: None,
            description: None,
            image_url: None,
            brand: Some("Federal".into()),
            caliber: Some("9mm".into()),
            grain: None,
            in_stock: true,
            coercions: vec![],
            warnings: vec![],
            raw: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_indexable_then_reconciliation_flips_stale_rows_inactive() {
        let store = temp_store();
        let record = sample_record();

        store
            .upsert_indexable(IndexableUpsert {
                dealer_id: "d1",
                feed_id: "f1",
                feed_run_id: "run1",
                sku_hash: "hash1",
                record: &record,
            })
            .await
            .unwrap();

        let ids = store.active_sku_ids_for_run("run1").await.unwrap();
        assert_eq!(ids.len(), 1);

        let deactivated = store.deactivate_stale_skus("d1", "f1", "run2").await.unwrap();
        assert_eq!(deactivated, 1);

        let sku = store.get_dealer_sku(&ids[0]).await.unwrap().unwrap();
        assert!(!sku.is_active);
    }

    #[tokio::test]
    async fn quarantine_upsert_never_regresses_resolved_status() {
        let store = temp_store();
        store
            .upsert_quarantine(QuarantineUpsert {
                feed_id: "f1",
                match_key: "mk1",
                raw_data: serde_json::json!({}),
                parsed_fields: serde_json::json!({}),
                blocking_errors: vec![],
            })
            .await
            .unwrap();

        {
            let conn = store.conn.lock();
            conn.execute("UPDATE quarantined_records SET status='RESOLVED' WHERE feed_id='f1' AND match_key='mk1'", [])
                .unwrap();
        }

        store
            .upsert_quarantine(QuarantineUpsert {
                feed_id: "f1",
                match_key: "mk1",
                raw_data: serde_json::json!({"updated": true}),
                parsed_fields: serde_json::json!({}),
                blocking_errors: vec![],
            })
            .await
            .unwrap();

        let record = store.get_quarantined_record("f1", "mk1").await.unwrap().unwrap();
        assert_eq!(record.status, QuarantineStatus::Resolved);
    }

    #[tokio::test]
    async fn subscription_notify_rate_limit_blocks_second_claim_within_24h() {
        let store = temp_store();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO dealers (id, business_name, contacts_json, subscription_status, expires_at, grace_days, last_subscription_notify_at, tier) \
                 VALUES ('d1','Acme','[]','active',9999999999,0,NULL,'standard')",
                [],
            )
            .unwrap();
        }

        let now = Utc::now();
        assert!(store.try_claim_subscription_notify("d1", now).await.unwrap());
        assert!(!store.try_claim_subscription_notify("d1", now).await.unwrap());
    }
}
