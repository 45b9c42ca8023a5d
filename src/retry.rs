/*!
 * Bounded retry with exponential backoff and candidate fallback.
 *
 * The policy wraps one unit-of-work call. Attempt 1 runs against the primary
 * candidate; every later attempt advances to the next ranked candidate
 * (clamped to the last, which routing guarantees is the mock), so repeated
 * failure downgrades across providers instead of hammering one. Transient
 * errors sleep `base_delay * 2^(attempt-1)` before the next attempt;
 * permanent errors skip the sleep (the candidate is broken, not the timing).
 *
 * Exhaustion returns the last error. Callers must treat that as a unit-level
 * failure (fail-soft), never as a job abort.
 */

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::ProviderError;

/// Default maximum attempts per unit
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

/// Retry policy for one unit-of-work call
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts before the unit is given up on
    max_attempts: u32,
    /// Base delay for exponential backoff
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit bounds
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Configured maximum attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff delay before the attempt following `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` against the ranked candidates until it succeeds or the
    /// attempt budget is spent.
    ///
    /// `op` receives the candidate for this attempt plus the 1-based attempt
    /// number. The candidate slice must not be empty; routing guarantees a
    /// mock tail in production.
    pub async fn execute<C, T, F, Fut>(
        &self,
        candidates: &[C],
        mut op: F,
    ) -> Result<T, ProviderError>
    where
        C: Clone,
        F: FnMut(C, u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if candidates.is_empty() {
            return Err(ProviderError::InvalidRequest(
                "no provider candidates to try".to_string(),
            ));
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let index = ((attempt - 1) as usize).min(candidates.len() - 1);
            match op(candidates[index].clone(), attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("call succeeded on attempt {} (candidate #{})", attempt, index + 1);
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.max_attempts => {
                    if err.is_transient() {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "attempt {}/{} failed transiently ({}); backing off {:?} before fallback",
                            attempt, self.max_attempts, err, delay
                        );
                        tokio::time::sleep(delay).await;
                    } else {
                        warn!(
                            "attempt {}/{} failed permanently ({}); advancing to next candidate",
                            attempt, self.max_attempts, err
                        );
                    }
                    last_error = Some(err);
                }
                Err(err) => {
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::InvalidRequest("retry loop ended without running".to_string())
        }))
    }
}
