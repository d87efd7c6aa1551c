//! Bounded retry with exponential backoff
//!
//! One policy object applied uniformly at the storage and external-call boundaries, instead of ad hoc retry loops
//! per call site. Only errors the caller classifies as transient are retried; everything else surfaces immediately.
use std::{future::Future, time::Duration};

use log::{error, warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 4, base_delay: Duration::from_millis(100), max_delay: Duration::from_secs(5) }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay, max_delay }
    }

    /// No retries at all. Useful in tests and for calls that must not be repeated.
    pub fn once() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        exp.min(self.max_delay)
    }

    /// Runs `f`, retrying while `is_transient` classifies the error as retryable and attempts remain. After the
    /// last attempt the error is returned to the caller, which escalates it (operator alert); nothing is silently
    /// dropped.
    pub async fn retry<T, E, F, Fut, P>(&self, label: &str, is_transient: P, mut f: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.max_attempts && is_transient(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!("🔁️ {label} failed (attempt {} of {}): {e}. Retrying in {delay:?}", attempt + 1, self.max_attempts);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => {
                    if attempt + 1 >= self.max_attempts && is_transient(&e) {
                        error!("🔁️ {label} failed after {} attempts: {e}. Escalating.", self.max_attempts);
                    }
                    return Err(e);
                },
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, String> = policy
            .retry("test op", |_| true, move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, String> = policy
            .retry("test op", |_| true, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(2));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, String> = policy
            .retry("test op", |_| false, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("constraint violation".to_string())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
