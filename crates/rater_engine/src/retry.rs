//! Exponential backoff for idempotent remote queries.
//!
//! Waiting goes through a [`Sleeper`] so loops built on it can be driven
//! without real delays.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use rater_logging::{rater_error, rater_info, rater_warn};

use crate::ServiceError;

/// Errors that may go away when the same operation is tried again.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

impl IsTransient for ServiceError {
    fn is_transient(&self) -> bool {
        ServiceError::is_transient(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Stretch each delay by a random factor in `[1, 2]`, still capped at `max_delay`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay)
    }
}

#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeping on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation`, retrying transient failures with exponential backoff.
///
/// Returns the first success, the first non-transient error, or the last
/// error once `policy.max_attempts` retries are used up.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsTransient + fmt::Display,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    rater_info!("operation succeeded after {} attempts", attempt + 1);
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                attempt += 1;
                let wait = if policy.jitter {
                    add_jitter(delay).min(policy.max_delay)
                } else {
                    delay
                };
                rater_warn!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt,
                    policy.max_attempts + 1,
                    err,
                    wait
                );
                sleeper.sleep(wait).await;
                delay = policy.next_delay(delay);
            }
            Err(err) => {
                if err.is_transient() {
                    rater_error!("giving up after {} attempts: {}", attempt + 1, err);
                } else {
                    rater_error!("non-retryable failure: {}", err);
                }
                return Err(err);
            }
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
