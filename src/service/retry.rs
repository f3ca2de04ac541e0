use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::service::ServiceResult;

/// How broadcasts are retried. Only transient RPC failures are retried;
/// everything else is returned on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The backoff doubles after every failure.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> ServiceResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = ServiceResult<T>>,
    {
        let mut delay = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "Attempt {}/{} failed: {e}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        delay
                    );
                    sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
