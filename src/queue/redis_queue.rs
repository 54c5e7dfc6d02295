//! `redis`-backed `JobQueue`. A `SET ... NX`
//! dedup marker gives idempotent job-id insertion; each job kind has its
//! own FIFO list so worker pools can `BLPOP` independently.

use super::{Job, JobQueue};
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// How long a dedup marker survives. Generous relative to any scheduling
/// window so a crashed enqueuer can't cause a duplicate within the same
/// window once it restarts.
const DEDUP_TTL_SECS: u64 = 6 * 3600;

pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }

    fn queue_key(queue_name: &str) -> String {
        format!("dealer-ingest:queue:{queue_name}")
    }

    fn dedup_key(job_id: &str) -> String {
        format!("dealer-ingest:jobid:{job_id}")
    }

    fn queue_name_for(job: &Job) -> &'static str {
        match job {
            Job::Ingest(_) => "ingest",
            Job::MatchBatch(_) => "match",
            Job::Benchmark(_) => "benchmark",
            Job::Insight(_) => "insight",
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job_id: &str, job: &Job) -> Result<bool> {
        let mut conn = self.conn.clone();
        let dedup_key = Self::dedup_key(job_id);

        let claimed: bool = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(DEDUP_TTL_SECS)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .context("redis SET NX failed")?
            .is_some();

        if !claimed {
            return Ok(false);
        }

        let payload = serde_json::to_string(job).context("failed to serialize job")?;
        let queue_key = Self::queue_key(Self::queue_name_for(job));
        conn.rpush(&queue_key, payload).await.context("redis RPUSH failed")?;
        Ok(true)
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let queue_key = Self::queue_key(queue_name);
        let payload: Option<String> = conn.lpop(&queue_key, None).await.context("redis LPOP failed")?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).context("failed to deserialize job")?)),
            None => Ok(None),
        }
    }
}
