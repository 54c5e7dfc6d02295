//! Environment-driven configuration.

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub queue_redis_url: String,
    pub fetch_timeout_secs: u64,
    pub ingest_concurrency: usize,
    pub match_concurrency: usize,
    pub benchmark_concurrency: usize,
    pub insight_concurrency: usize,
    pub admin_override: bool,
    pub admin_id: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./dealer_pipeline.db".to_string());

        let queue_redis_url =
            std::env::var("QUEUE_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

        let fetch_timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let ingest_concurrency = std::env::var("INGEST_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let match_concurrency = std::env::var("MATCH_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let benchmark_concurrency = std::env::var("BENCHMARK_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let insight_concurrency = std::env::var("INSIGHT_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let admin_override = std::env::var("ADMIN_OVERRIDE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let admin_id = std::env::var("ADMIN_ID").ok();

        Ok(Self {
            database_path,
            queue_redis_url,
            fetch_timeout_secs,
            ingest_concurrency,
            match_concurrency,
            benchmark_concurrency,
            insight_concurrency,
            admin_override,
            admin_id,
        })
    }
}
