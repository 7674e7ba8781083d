use super::ChainError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry settings for remote calls that must not silently give up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// No retries, no waiting. Used by tests and one-shot calls.
    pub fn none() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            max_retries: 0,
        }
    }
}

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial_ms: u64, max_ms: u64, retries: u32) -> Self {
        Self {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.initial_delay_ms, policy.max_delay_ms, policy.max_retries)
    }

    /// Delay before the next attempt, without jitter
    pub fn next_delay_ms(&self) -> u64 {
        let factor = 2_u64.saturating_pow(self.current_attempt);
        std::cmp::min(self.initial_delay_ms.saturating_mul(factor), self.max_delay_ms)
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.next_delay_ms();
        let jitter = if delay >= 4 {
            rand::thread_rng().gen_range(0..=delay / 4)
        } else {
            0
        };

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay + jitter
        );

        sleep(Duration::from_millis(delay + jitter)).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's retry budget is spent. The last error is returned in the latter case.
pub async fn retry_remote<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut backoff = ExponentialBackoff::from_policy(policy);

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                log::warn!("{} failed: {}", label, e);
                if backoff.sleep().await.is_err() {
                    log::error!("{} gave up after {} retries", label, backoff.attempts());
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
