// SPDX-License-Identifier: MIT
//! Generic bounded-attempt backoff retry — grounded on the teacher's
//! `src/retry.rs`.
//!
//! Used only for the `INIT → DIALING` transition's `ENOTFOUND` retry in
//! `spec.md` §4.8 ("retry up to 3 times with exponential backoff (2s, 4s,
//! 8s); any other error is immediately surfaced"). The supervisor-level
//! backoff in `spec.md` §4.7/§4.9 is spec-defined and lives in
//! `failure_tracker.rs` — it is not built on this helper.

use std::time::Duration;
use tracing::debug;

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl RetryConfig {
    /// The DIALING-transition retry policy from `spec.md` §4.8:
    /// the first dial plus up to 3 retries, 2s/4s/8s delays.
    pub fn dialing_enotfound() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff, retrying only while
/// `should_retry` returns true for the error. Returns `Ok(result)` on the
/// first success, or `Err(last_error)` once `max_attempts` is exhausted or
/// `should_retry` returns false.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut should_retry: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= config.max_attempts || !should_retry(&e) {
                    return Err(e);
                }
                debug!(attempt, delay_ms = delay.as_millis(), error = ?e, "retry: backing off");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(config.multiplier);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            &RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
            },
            |_e| true,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            &RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
            },
            |_e| true,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("ENOTFOUND")
            },
        )
        .await;
        assert_eq!(result, Err("ENOTFOUND"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dialing_enotfound_retries_three_times_with_2s_4s_8s_backoff() {
        use std::sync::Mutex;

        let timestamps: Mutex<Vec<tokio::time::Instant>> = Mutex::new(Vec::new());
        let config = RetryConfig::dialing_enotfound();

        let result: Result<(), &str> = retry_with_backoff(
            &config,
            |_e| true,
            || {
                timestamps.lock().unwrap().push(tokio::time::Instant::now());
                async { Err("ENOTFOUND") }
            },
        )
        .await;

        assert_eq!(result, Err("ENOTFOUND"));

        let ts = timestamps.lock().unwrap();
        // First dial plus 3 retries (spec.md §4.8's "retry up to 3 times").
        assert_eq!(ts.len(), 4);
        assert_eq!(ts[1] - ts[0], Duration::from_secs(2));
        assert_eq!(ts[2] - ts[1], Duration::from_secs(4));
        assert_eq!(ts[3] - ts[2], Duration::from_secs(8));
    }

    #[tokio::test]
    async fn stops_immediately_when_should_retry_is_false() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            &RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
            },
            |_e| false,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("some other error")
            },
        )
        .await;
        assert_eq!(result, Err("some other error"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
