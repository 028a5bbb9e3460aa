//! Bounded retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use odootable_common::{OdooTableError, Result};

/// How often and how patiently transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }

    /// Decide what to do after `attempt` failed with `err`.
    ///
    /// Returns the delay before the next attempt, or `None` when the error is
    /// terminal or the budget is spent.
    pub fn next_delay(&self, err: &OdooTableError, attempt: u32) -> Option<Duration> {
        if err.is_transient() && attempt < self.max_attempts.max(1) {
            Some(self.delay_for(attempt))
        } else {
            None
        }
    }

    /// Wait out the delay after `attempt` failed with `err`, logging the
    /// retry. Hands `err` back when it is terminal or the budget is spent.
    pub async fn backoff(&self, what: &str, attempt: u32, err: OdooTableError) -> Result<()> {
        match self.next_delay(&err, attempt) {
            Some(delay) => {
                tracing::warn!(
                    "{what} failed (attempt {attempt}/{}): {err}; retrying in {delay:?}",
                    self.max_attempts
                );
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Run `op` until it succeeds, fails terminally, or runs out of attempts.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => self.backoff(what, attempt, err).await?,
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_backoff_hands_back_terminal_and_exhausted_errors() {
        let policy = fast_policy(2);

        assert!(policy.backoff("page fetch", 1, OdooTableError::Connection("reset".into())).await.is_ok());
        assert_eq!(
            policy.backoff("page fetch", 2, OdooTableError::Connection("reset".into())).await,
            Err(OdooTableError::Connection("reset".into()))
        );
        assert_eq!(
            policy.backoff("authenticate", 1, OdooTableError::Auth("denied".into())).await,
            Err(OdooTableError::Auth("denied".into()))
        );
    }

    #[tokio::test]
    async fn test_transient_errors_retried_up_to_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("connect", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OdooTableError::Connection("refused".into()))
            })
            .await;

        assert!(matches!(result, Err(OdooTableError::Connection(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_policy(3)
            .run("authenticate", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(OdooTableError::Auth("rejected".into()))
            })
            .await;

        assert!(matches!(result, Err(OdooTableError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("connect", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(OdooTableError::Connection("reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
