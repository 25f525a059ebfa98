// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded step retries with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::controller::ControllerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let spread = (delay.as_millis() / 4) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::random::<u64>() % (spread + 1))
    }
}

/// Why a retried step gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    Failed(ControllerError),
    Cancelled,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or uses up
/// `policy.max_attempts`. Rate-limit hints are waited out verbatim. Returns
/// the outcome and the number of attempts made.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> (Result<T, StepFailure>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ControllerError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) => e,
        };
        if !err.is_retryable() || attempt >= policy.max_attempts {
            return (Err(StepFailure::Failed(err)), attempt);
        }

        let wait = match &err {
            ControllerError::RateLimited { retry_after } => *retry_after,
            _ => policy.jittered(attempt),
        };
        tracing::warn!(
            step = label,
            attempt,
            wait_ms = wait.as_millis() as u64,
            err = %err,
            "sync step failed, retrying"
        );
        tokio::select! {
            _ = cancel.cancelled() => return (Err(StepFailure::Cancelled), attempt),
            _ = tokio::time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() -> anyhow::Result<()> {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(250));
        assert_eq!(p.backoff(40), Duration::from_millis(250));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() -> anyhow::Result<()> {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = retry(&policy(), &CancellationToken::new(), "sites", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ControllerError::Transient("boom".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(attempts, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() -> anyhow::Result<()> {
        let (result, attempts) = retry(&policy(), &CancellationToken::new(), "sites", || async {
            Err::<(), _>(ControllerError::Transient("down".into()))
        })
        .await;
        assert!(matches!(result, Err(StepFailure::Failed(ControllerError::Transient(_)))));
        assert_eq!(attempts, 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn validation_is_not_retried() -> anyhow::Result<()> {
        let (result, attempts) = retry(&policy(), &CancellationToken::new(), "sites", || async {
            Err::<(), _>(ControllerError::Validation("bad".into()))
        })
        .await;
        assert!(matches!(result, Err(StepFailure::Failed(ControllerError::Validation(_)))));
        assert_eq!(attempts, 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hint_is_waited_verbatim() -> anyhow::Result<()> {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let (result, _) = retry(&policy(), &CancellationToken::new(), "usage", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ControllerError::RateLimited { retry_after: Duration::from_secs(30) })
            } else {
                Ok(())
            }
        })
        .await;
        assert_eq!(result, Ok(()));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() -> anyhow::Result<()> {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (result, attempts) = retry(&policy(), &cancel, "vouchers", || async {
            Err::<(), _>(ControllerError::Transient("down".into()))
        })
        .await;
        assert_eq!(result, Err(StepFailure::Cancelled));
        assert_eq!(attempts, 1);
        Ok(())
    }
}
