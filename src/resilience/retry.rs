// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection retry with exponential backoff.
//!
//! Only pool establishment goes through here. Statements inside a sync call
//! are never retried: the whole call is safe to repeat, so the caller decides.
//!
//! ```
//! use group_sync::RetryConfig;
//!
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//! assert!(startup.total_backoff() < std::time::Duration::from_secs(5));
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Attempts including the first one.
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::startup()
    }
}

impl RetryConfig {
    /// Startup connect: a wrong URL or a database that is down surfaces in a
    /// few seconds rather than hanging the server.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            max_attempts: 5,
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            factor: 2.0,
            max_attempts: 3,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }

    /// Sum of all sleeps when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        let mut delay = self.initial_delay;
        let mut total = Duration::ZERO;
        for _ in 1..self.max_attempts {
            total += delay;
            delay = self.next_delay(delay);
        }
        total
    }
}

/// Run `connect` until it succeeds or `config.max_attempts` is reached.
/// The last error is returned unchanged.
pub async fn retry<F, Fut, T, E>(target: &str, config: &RetryConfig, mut connect: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        let err = match connect().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(target_name = target, attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= config.max_attempts {
            warn!(target_name = target, attempt, error = %err, "Giving up");
            return Err(err);
        }

        warn!(
            target_name = target,
            attempt,
            max_attempts = config.max_attempts,
            error = %err,
            retry_in_ms = delay.as_millis() as u64,
            "Connect failed, retrying"
        );
        sleep(delay).await;
        delay = config.next_delay(delay);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn flaky(calls: Arc<AtomicUsize>, succeed_on: usize) -> Result<&'static str, StorageError> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= succeed_on {
            Ok("pool")
        } else {
            Err(StorageError::Backend(format!("connection refused ({call})")))
        }
    }

    #[tokio::test]
    async fn test_first_attempt_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = retry("db", &RetryConfig::test(), || flaky(calls.clone(), 1)).await;
        assert_eq!(pool.unwrap(), "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_on_last_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pool = retry("db", &RetryConfig::test(), || flaky(calls.clone(), 3)).await;
        assert_eq!(pool.unwrap(), "pool");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = retry("db", &RetryConfig::test(), || flaky(calls.clone(), usize::MAX))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection refused (3)"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_caps() {
        let config = RetryConfig::startup();
        assert_eq!(config.next_delay(Duration::from_millis(200)), Duration::from_millis(400));
        assert_eq!(config.next_delay(Duration::from_secs(5)), config.max_delay);
        // 200 + 400 + 800 + 1600
        assert_eq!(config.total_backoff(), Duration::from_millis(3000));
    }
}
