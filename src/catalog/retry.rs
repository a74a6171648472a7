//! Caller-side retry around catalog fetches.
//!
//! The fetcher itself never retries. Callers that want resilience wrap it
//! with [`fetch_with_retry`], which retries transient failures (timeouts,
//! connection errors, HTTP 429 and 5xx) with exponential backoff.

use super::EventSource;
use crate::error::FetchError;
use crate::models::{BoundingBox, Event, TimeWindow};
use std::time::Duration;
use tracing::warn;

/// Bounded retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Fetch with up to `policy.max_retries` retries on transient errors.
pub async fn fetch_with_retry(
    source: &dyn EventSource,
    window: &TimeWindow,
    bbox: &BoundingBox,
    policy: RetryPolicy,
) -> Result<Vec<Event>, FetchError> {
    let mut attempt = 0;

    loop {
        match source.fetch(window, bbox).await {
            Ok(events) => return Ok(events),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    "Transient catalog error ({}), retry {}/{} in {:?}",
                    e, attempt, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
