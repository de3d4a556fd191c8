//! A generic retry combinator: a policy object
//! `{max_attempts, backoff(attempt), classify(err)}` applied by
//! `with_retry`, instead of hand-rolled retry loops at each call site.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  Retry,
  Fatal,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub multiplier: f64,
}

impl RetryPolicy {
  /// Short linear back-off suited to in-process batch retries:
  /// 200ms, 400ms, 600ms, capped at 2s.
  pub fn linear(max_attempts: u32) -> Self {
    Self {
      max_attempts,
      initial_backoff: Duration::from_millis(200),
      max_backoff: Duration::from_secs(2),
      multiplier: 1.0,
    }
  }

  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    if self.multiplier <= 1.0 {
      let linear = self.initial_backoff * (attempt + 1);
      return linear.min(self.max_backoff);
    }
    let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
    Duration::from_secs_f64(base).min(self.max_backoff)
  }
}

/// Runs `op` under `policy`, retrying while `classify` says `Retry` and
/// attempts remain. Returns the last error once attempts are exhausted or
/// `classify` returns `Fatal`.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, classify: impl Fn(&E) -> Classification, mut op: F) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  let mut attempt = 0;
  loop {
    match op().await {
      Ok(v) => return Ok(v),
      Err(err) => {
        let fatal = matches!(classify(&err), Classification::Fatal);
        if fatal || attempt >= policy.max_attempts {
          return Err(err);
        }
        warn!(attempt, error = %err, "retrying after transient error");
        tokio::time::sleep(policy.backoff_for_attempt(attempt)).await;
        attempt += 1;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[tokio::test]
  async fn retries_until_success() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::linear(3);
    let result: Result<u32, &str> = with_retry(&policy, |_| Classification::Retry, || async {
      let n = calls.fetch_add(1, Ordering::SeqCst);
      if n < 2 { Err("transient") } else { Ok(42) }
    })
    .await;
    assert_eq!(result, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn fatal_errors_are_not_retried() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::linear(5);
    let result: Result<u32, &str> = with_retry(&policy, |_| Classification::Fatal, || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Err("bad dimension")
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::linear(2);
    let result: Result<u32, &str> = with_retry(&policy, |_| Classification::Retry, || async {
      calls.fetch_add(1, Ordering::SeqCst);
      Err("still failing")
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[test]
  fn linear_backoff_grows_then_caps() {
    let policy = RetryPolicy::linear(10);
    assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(200));
    assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(400));
    assert_eq!(policy.backoff_for_attempt(20), Duration::from_secs(2));
  }
}
