//! Retry policy with capped exponential backoff

use std::future::Future;
use std::time::Duration;
use log::{debug, error, warn};
use rand::Rng;
use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::error::{Error, Result};

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry policy for provider calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy
{   /// Total attempts, the first one included
    pub max_attempts: u32
  , pub base_delay: Duration
  , pub max_delay: Duration
  , /// Spread each delay uniformly over `[delay / 2, delay]`
    pub jitter: bool
}

impl RetryPolicy
{   pub fn new(
      max_attempts: u32
    , base_delay: Duration
    , max_delay: Duration
    ) -> Self
    {   RetryPolicy
        {   max_attempts: max_attempts.max(1)
          , base_delay
          , max_delay
          , jitter: true
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self
    {   RetryPolicy::new(
          config.max_retries()
        , DEFAULT_BASE_DELAY
        , DEFAULT_MAX_DELAY
        )
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self
    {   self.jitter = jitter;
        self
    }

    /// Un-jittered backoff after the `attempt`-th failure (0-based):
    /// `min(base * 2^attempt, max_delay)`.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration
    {   let multiplier = 1_u32 << attempt.min(20);
        self.base_delay
          .saturating_mul(multiplier)
          .min(self.max_delay)
    }

    /// Wait before retrying after `err`, the `attempt`-th failure.
    ///
    /// A provider hint is waited in full; only computed backoff is
    /// capped at `max_delay`. Deadlines still bound the wait.
    pub fn delay_for(&self, err: &Error, attempt: u32) -> Duration
    {   if let Some(hint) = err.retry_after()
        {   return hint;
        }
        let delay = self.backoff_for_attempt(attempt);
        if self.jitter
        {   with_jitter(delay)
        } else
        {   delay
        }
    }

    /// Run `operation` until it succeeds, fails fatally or the attempt
    /// budget is spent. The closure receives the 0-based attempt number.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
      F: FnMut(u32) -> Fut
    , Fut: Future<Output = Result<T>>
    {   self.execute_with_deadline(operation, None).await
    }

    /// As [`execute`](Self::execute), but gives up with
    /// [`Error::Timeout`] once `deadline` passes, whether that happens
    /// during an attempt or would happen during a backoff wait.
    pub async fn execute_with_deadline<F, Fut, T>(
      &self
    , mut operation: F
    , deadline: Option<Instant>
    ) -> Result<T>
    where
      F: FnMut(u32) -> Fut
    , Fut: Future<Output = Result<T>>
    {   let mut attempt: u32 = 0;
        loop
        {   if is_expired(deadline)
            {   return Err(deadline_elapsed(attempt));
            }

            let outcome = match deadline
            {   Some(deadline) => {
                  match tokio::time::timeout_at(deadline, operation(attempt)).await
                  {   Ok(outcome) => outcome
                    , Err(_) => {
                        warn!("Deadline elapsed during attempt {}", attempt + 1);
                        return Err(deadline_elapsed(attempt + 1));
                      }
                  }
                }
              , None => operation(attempt).await
            };

            let err = match outcome
            {   Ok(value) => {
                  if attempt > 0
                  {   debug!("Succeeded after {} attempts", attempt + 1);
                  }
                  return Ok(value);
                }
              , Err(err) => err
            };
            attempt += 1;

            if !err.is_transient()
            {   error!("Not retrying fatal error: {}", err);
                return Err(err);
            }
            if attempt >= self.max_attempts
            {   error!("Giving up after {} attempts: {}", attempt, err);
                return Err(err);
            }

            let delay = self.delay_for(&err, attempt - 1);
            let Some(delay) = cap_wait(delay, deadline) else
            {   warn!("Deadline leaves no room to retry after: {}", err);
                return Err(deadline_elapsed(attempt));
            };
            warn!(
              "Attempt {}/{} failed ({}), retrying in {:?}",
              attempt, self.max_attempts, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(3, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

fn with_jitter(delay: Duration) -> Duration
{   let floor = delay / 2;
    let spread = (delay - floor).as_nanos().min(u64::MAX as u128) as u64;
    floor + Duration::from_nanos(rand::thread_rng().gen_range(0..=spread))
}

fn remaining(deadline: Option<Instant>) -> Option<Duration>
{   deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

fn is_expired(deadline: Option<Instant>) -> bool
{   remaining(deadline).is_some_and(|remaining| remaining.is_zero())
}

/// `None` when the wait would run into the deadline.
fn cap_wait(wait: Duration, deadline: Option<Instant>) -> Option<Duration>
{   match remaining(deadline)
    {   Some(remaining) if wait >= remaining => None
      , _ => Some(wait)
    }
}

fn deadline_elapsed(attempts: u32) -> Error
{   Error::Timeout(format!(
      "overall deadline elapsed after {} attempt(s)",
      attempts
    ))
}
