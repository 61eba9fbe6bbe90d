//! Caller-side exponential backoff.
//!
//! The core never retries on its own. Callers that want to retry a
//! retryable failure (chain unavailable, fee too low) wrap the call in
//! [`retry`] and decide per error whether another attempt is safe.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with an error `should_retry` rejects,
/// or `policy.max_attempts` is reached. Returns the last error.
pub async fn retry<T, E, F, Fut>(
    policy: Backoff,
    mut should_retry: impl FnMut(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && should_retry(&err) => {
                let delay = policy.delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> Backoff {
        Backoff {
            initial: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 4,
        }
    }

    #[test]
    fn delays_double_up_to_cap() {
        let b = quick();
        assert_eq!(b.delay(1), Duration::from_millis(1));
        assert_eq!(b.delay(2), Duration::from_millis(2));
        assert_eq!(b.delay(3), Duration::from_millis(4));
        assert_eq!(b.delay(10), Duration::from_millis(4));
        assert_eq!(b.delay(64), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let out: Result<u32, &str> = retry(quick(), |_| true, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err("unavailable")
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(out, Ok(3));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), &str> = retry(quick(), |e| *e != "fatal", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("fatal")
        })
        .await;
        assert_eq!(out, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let out: Result<(), &str> = retry(quick(), |_| true, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down")
        })
        .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
