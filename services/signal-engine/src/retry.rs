//! Retry with exponential backoff for persistence and publishing

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Backoff for the given zero-based attempt, capped and optionally jittered (±25%)
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let delay = config.base_delay_ms.saturating_mul(1_u64 << attempt.min(6));
    let delay = delay.min(config.max_delay_ms);

    let jittered = if config.jitter && delay > 0 {
        let jitter_range = delay / 4;
        let jitter = rand::random::<u64>() % (jitter_range * 2 + 1);
        delay.saturating_sub(jitter_range) + jitter
    } else {
        delay
    };

    Duration::from_millis(jittered)
}

/// Run `operation` up to `max_attempts` times, returning the last error.
/// `on_retry` fires before each re-attempt.
pub async fn with_retry<F, Fut, T, E, R>(
    label: &str,
    config: &RetryConfig,
    mut on_retry: R,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(u32),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt >= max_attempts {
                    warn!(operation = label, attempts = attempt, error = %e, "Giving up");
                    return Err(e);
                }

                warn!(
                    operation = label,
                    "Failed (attempt {}/{}): {}",
                    attempt,
                    max_attempts,
                    e
                );
                let delay = backoff_delay(attempt - 1, config);
                debug!(operation = label, "Retrying after {:?}", delay);
                on_retry(attempt);
                sleep(delay).await;
            }
        }
    }
}
