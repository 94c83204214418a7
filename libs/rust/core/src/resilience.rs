//! Retry with exponential backoff for calls to a serving process.

use rand::{thread_rng, Rng};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64, // 0.0 - 1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_millis(200), max_delay: Duration::from_secs(5), jitter: 0.25 }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self { Self { max_retries: 0, ..Self::default() } }

    /// Delay before retry number `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let exp = self.base_delay.mul_f64(2f64.powi(attempt.min(30) as i32));
        exp.min(self.max_delay)
    }

    fn jittered(&self, attempt: usize) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }
        let jitter_ms = (delay.as_millis() as f64 * self.jitter.min(1.0)) as i64;
        let offset = thread_rng().gen_range(-jitter_ms..=jitter_ms);
        Duration::from_millis((delay.as_millis() as i64 + offset).max(0) as u64)
    }
}

/// Runs `op` until it succeeds, fails with an error `retryable` rejects, or the retry
/// budget is spent. `op` receives the zero-based attempt number.
pub async fn retry_async<F, Fut, T, E, R>(cfg: &RetryConfig, retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= cfg.max_retries || !retryable(&e) => return Err(e),
            Err(e) => {
                let delay = cfg.jittered(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "transient failure, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
