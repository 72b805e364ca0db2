//! Opt-in exponential backoff for API calls.
//!
//! Nothing in the state slices retries on its own; callers wrap an operation
//! with [`with_backoff`] when they want it.

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use super::client::ApiError;

/// Retry policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub initial_interval: Duration,
  pub max_interval: Duration,
  pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      initial_interval: Duration::from_millis(500),
      max_interval: Duration::from_secs(10),
      max_elapsed: Duration::from_secs(30),
    }
  }
}

/// Whether repeating the request could plausibly succeed.
///
/// Offline mode and client errors (4xx) are permanent; transport failures and
/// 5xx responses are transient.
pub fn is_transient(error: &ApiError) -> bool {
  if error.offline_blocked {
    return false;
  }
  match error.status {
    Some(status) => status >= 500 || status == 429,
    None => true,
  }
}

/// Run `operation` until it succeeds, fails permanently, or the policy gives up.
pub async fn with_backoff<T, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, ApiError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, ApiError>>,
{
  let backoff = ExponentialBackoffBuilder::new()
    .with_initial_interval(policy.initial_interval)
    .with_max_interval(policy.max_interval)
    .with_max_elapsed_time(Some(policy.max_elapsed))
    .build();

  let mut attempt = 0u32;
  backoff::future::retry(backoff, || {
    attempt += 1;
    let fut = operation();
    let current = attempt;
    async move {
      fut.await.map_err(|e| {
        if is_transient(&e) {
          info!(attempt = current, error = %e, "transient failure, retrying");
          backoff::Error::transient(e)
        } else {
          backoff::Error::permanent(e)
        }
      })
    }
  })
  .await
}
