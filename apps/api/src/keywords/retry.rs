//! Bounded retry for rate-limited extraction calls.
//!
//! Only `ExtractionError::RateLimited` is retried. The loop carries the attempt
//! number explicitly; the wait is the server's hint when present, otherwise
//! exponential backoff (base, 2×base, 4×base, ...) capped at `max_backoff`.

use std::time::Duration;

use tracing::warn;

use crate::errors::AppError;
use crate::keywords::extraction::{
    AnalysisRequest, AnalysisResult, ExtractionClient, ExtractionError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt that follows `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after.unwrap_or_else(|| {
            let exponent = attempt.saturating_sub(1).min(16);
            self.base_backoff.saturating_mul(1 << exponent)
        });
        delay.min(self.max_backoff)
    }
}

/// Calls `client` until it succeeds, fails terminally, or the policy's attempts
/// are used up. Returns the result together with the number of calls made.
pub async fn extract_with_retry(
    client: &dyn ExtractionClient,
    request: &AnalysisRequest,
    policy: &RetryPolicy,
) -> Result<(AnalysisResult, u32), AppError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match client.extract(request).await {
            Ok(result) => return Ok((result, attempt)),
            Err(ExtractionError::RateLimited { retry_after }) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt, retry_after);
                warn!(
                    "Extraction attempt {}/{} rate limited, retrying after {}ms",
                    attempt,
                    max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(AppError::from_extraction(e, attempt)),
        }
    }
}
