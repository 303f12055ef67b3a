//! Retry with exponential backoff for transient failures.
//!
//! Delays grow by `backoff_multiplier` from `initial_delay_ms`, capped at
//! `max_delay_ms`. With jitter on, each wait is stretched by a random
//! 0-100% so parallel callers do not retry in lockstep.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::QuizRelayError;

/// Classifies errors as worth retrying or not.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for QuizRelayError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Run `operation` until it succeeds, fails permanently, or `max_attempts`
/// attempts have been made. Returns the last error.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.initial_delay();

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(what, attempts = attempt, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    what,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                attempt += 1;
                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(what, error = %e, attempts = attempt, "retries exhausted");
                } else {
                    tracing::debug!(what, error = %e, "permanent failure, not retrying");
                }
                return Err(e);
            }
        }
    }
}

/// Grow `delay` by the multiplier, capped at `max_delay`. A product that is
/// not a valid duration (negative, NaN, overflow) also yields the cap.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    let max = config.max_delay();
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
        .map_or(max, |next| next.min(max))
}

/// Stretch `delay` by a uniform 0-100%.
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + factor)).unwrap_or(delay)
}
