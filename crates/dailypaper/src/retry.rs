//! Retry with bounded exponential backoff.
//!
//! Every network client (catalog, document fetcher, analysis) receives a [`RetryPolicy`] at
//! construction and drives its requests through [`RetryPolicy::run`]. The operation classifies
//! each failure itself: [`Attempt::Transient`] failures are retried after a backoff delay,
//! [`Attempt::Permanent`] ones end the loop immediately.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use dailypaper::retry::RetryPolicy;
//!
//! let policy = RetryPolicy { max_attempts: 4, base_delay_ms: 500, max_delay_ms: 3_000, jitter: 0.0 };
//! assert_eq!(policy.delay_for(1), Duration::from_millis(500));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
//! assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
//! ```

use std::future::Future;

use rand::Rng;

use super::*;

/// How often and how patiently to retry a failing network call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total number of attempts, the first one included. Zero behaves like one.
  pub max_attempts:  u32,
  /// Delay before the first retry, in milliseconds. Doubles on every further retry.
  pub base_delay_ms: u64,
  /// Upper bound on any single delay, in milliseconds.
  pub max_delay_ms:  u64,
  /// Relative jitter applied to each delay, in `[0, 1]`. A delay `d` becomes a uniform sample of
  /// `[d * (1 - jitter), d * (1 + jitter)]`.
  pub jitter:        f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, base_delay_ms: 1_000, max_delay_ms: 30_000, jitter: 0.2 }
  }
}

/// Classification of a failed attempt.
#[derive(Debug)]
pub enum Attempt<E> {
  /// Worth retrying. The optional duration is a server-provided wait (`Retry-After`).
  Transient(E, Option<Duration>),
  /// Retrying cannot help.
  Permanent(E),
}

/// Final failure of a retried operation.
#[derive(Debug)]
pub enum Failure<E> {
  /// Every attempt failed transiently.
  Exhausted {
    /// Number of attempts made
    attempts: u32,
    /// Error of the last attempt
    last:     E,
  },
  /// An attempt failed permanently.
  Permanent(E),
}

impl<E> Failure<E> {
  /// The error carried by this failure, whatever its kind.
  pub fn into_inner(self) -> E {
    match self {
      Failure::Exhausted { last, .. } => last,
      Failure::Permanent(e) => e,
    }
  }
}

impl RetryPolicy {
  /// A policy retrying `max_attempts` times without waiting. Meant for tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self { max_attempts, base_delay_ms: 0, max_delay_ms: 0, jitter: 0.0 }
  }

  /// Number of attempts actually made, at least one.
  pub fn attempts(&self) -> u32 { self.max_attempts.max(1) }

  /// Delay to wait after the `retry`-th failed attempt (1-based).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    let delay = self.base_delay_ms.saturating_mul(1u64 << exponent).min(self.max_delay_ms);
    let jitter = self.jitter.clamp(0.0, 1.0);
    if jitter == 0.0 || delay == 0 {
      return Duration::from_millis(delay);
    }
    let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
    Duration::from_millis(((delay as f64) * factor) as u64)
  }

  /// Runs `operation` until it succeeds, fails permanently, or runs out of attempts.
  ///
  /// The closure receives the 1-based attempt number. `label` only appears in logs.
  pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, Failure<E>>
  where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>, {
    let attempts = self.attempts();
    let mut attempt = 1;
    loop {
      match operation(attempt).await {
        Ok(value) => return Ok(value),
        Err(Attempt::Permanent(e)) => {
          debug!("{label}: permanent failure on attempt {attempt}: {e}");
          return Err(Failure::Permanent(e));
        },
        Err(Attempt::Transient(e, _)) if attempt >= attempts => {
          warn!("{label}: giving up after {attempt} attempt(s): {e}");
          return Err(Failure::Exhausted { attempts: attempt, last: e });
        },
        Err(Attempt::Transient(e, hint)) => {
          let delay = match hint {
            Some(wait) => wait.min(Duration::from_millis(self.max_delay_ms)),
            None => self.delay_for(attempt),
          };
          warn!("{label}: attempt {attempt}/{attempts} failed ({e}), retrying in {delay:?}");
          tokio::time::sleep(delay).await;
          attempt += 1;
        },
      }
    }
  }
}
