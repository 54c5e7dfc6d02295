//! Exponential backoff helper shared by the queue consumers.
//!
//! Mirrors the hand-rolled backoff used by the scraper clients this crate
//! grew out of: a small retry loop with a doubling delay, no external crate.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: None,
        }
    }

    pub const fn capped(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: Some(max_delay),
        }
    }

    /// Feed ingest policy: 3 attempts, exponential 30s base.
    pub const fn ingest() -> Self {
        Self::new(3, Duration::from_secs(30))
    }

    /// Match/benchmark/insight policy: 3 attempts, exponential 5s base.
    pub const fn downstream() -> Self {
        Self::new(3, Duration::from_secs(5))
    }

    /// Scheduler connection-error policy: 5 attempts, base 5s, cap 60s.
    pub const fn scheduler() -> Self {
        Self::capped(5, Duration::from_secs(5), Duration::from_secs(60))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) if delay > cap => cap,
            _ => delay,
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping with exponential
/// backoff between attempts. Returns the last error if every attempt fails.
pub async fn run_with_retry<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => return Err(err),
            Err(err) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn ingest_policy_backoff_doubles() {
        let policy = RetryPolicy::ingest();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(120));
    }

    #[test]
    fn scheduler_policy_caps_at_60s() {
        let policy = RetryPolicy::scheduler();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(40));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn run_with_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<(), &str> = run_with_retry(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("boom") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn run_with_retry_returns_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<u32, &str> = run_with_retry(policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
