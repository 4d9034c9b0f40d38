//! Bounded retry with exponential-plus-jitter backoff

use log::{error, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::error::{TrackerError, TrackerResult};

/// How hard to retry a call against the rate-limited API
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Unit of the `2^n + U(0, 1)` delay used after a rate-limit error
    pub rate_limit_base: Duration,
    /// Unit of the `0.5 * n + U(0, 0.5)` delay used after any other error
    pub error_base: Duration,
    /// Add the random part of the delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_base: Duration::from_secs(1),
            error_base: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Same attempt count, no waiting; for tests and scripted runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_base: Duration::ZERO,
            error_base: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay after a rate-limit error on `attempt` (1-based)
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let exp = 2f64.powi(attempt.min(16) as i32);
        self.rate_limit_base.mul_f64(exp + self.jitter_up_to(1.0))
    }

    /// Delay after any other failure on `attempt` (1-based)
    pub fn error_delay(&self, attempt: u32) -> Duration {
        self.error_base
            .mul_f64(0.5 * attempt as f64 + self.jitter_up_to(0.5))
    }

    fn jitter_up_to(&self, max: f64) -> f64 {
        if self.jitter {
            rand::thread_rng().gen_range(0.0..max)
        } else {
            0.0
        }
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// Permanent errors (bad configuration, client-side API errors, missing
    /// rows) are returned at once.
    /// `what` names the operation in log lines.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> TrackerResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = TrackerResult<T>>,
    {
        let max = self.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    if attempt == max {
                        error!("{} failed after {} attempts: {}", what, max, e);
                        last_error = Some(e);
                        break;
                    }
                    let delay = if e.is_rate_limit() {
                        self.rate_limit_delay(attempt)
                    } else {
                        self.error_delay(attempt)
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Waiting {:.1}s",
                        what,
                        attempt,
                        max,
                        e,
                        delay.as_secs_f64()
                    );
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TrackerError::Conflict(format!("{} did not succeed after {} attempts", what, max))
        }))
    }
}
