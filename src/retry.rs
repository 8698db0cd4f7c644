// ABOUTME: Bounded exponential backoff for control-plane calls.
// ABOUTME: Retries transient failures, stops on permanent ones, honours cancellation.

use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry settings, loaded from the `retry` section of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_interval", with = "humantime_serde")]
    pub initial_interval: Duration,

    #[serde(default = "default_max_interval", with = "humantime_serde")]
    pub max_interval: Duration,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of each interval used as random jitter (0 disables it).
    #[serde(default = "default_randomization")]
    pub randomization: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_max_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_randomization() -> f64 {
    0.5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_interval: default_initial_interval(),
            max_interval: default_max_interval(),
            multiplier: default_multiplier(),
            randomization: default_randomization(),
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting between attempts. Used by tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            multiplier: 1.0,
            randomization: 0.0,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(*self)
    }
}

/// Whether a failed attempt may be retried.
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

/// Mutable retry state for one logical operation.
///
/// The budget is shared by every attempt made through the same `Backoff`
/// until [`Backoff::reset`] is called.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    retries: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            retries: 0,
            current: policy.initial_interval,
        }
    }

    /// Restore the full retry budget.
    pub fn reset(&mut self) {
        self.retries = 0;
        self.current = self.policy.initial_interval;
    }

    /// Number of retries consumed so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The next wait, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }
        self.retries += 1;

        let base = self.current;
        let next = base.mul_f64(self.policy.multiplier.max(1.0));
        self.current = next.min(self.policy.max_interval);

        Some(jitter(base, self.policy.randomization))
    }

    /// Run `op` until it succeeds, fails permanently, exhausts the budget or
    /// `cancel` fires. Returns the last error on failure.
    pub async fn retry<T, E, F, Fut>(&mut self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_transient() {
                return Err(err);
            }

            let Some(delay) = self.next_delay() else {
                return Err(err);
            };

            tracing::warn!(
                "Retrying after {:?} (attempt {}/{}): {}",
                delay,
                self.retries,
                self.policy.max_retries,
                err
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(err),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn jitter(base: Duration, randomization: f64) -> Duration {
    if randomization <= 0.0 || base.is_zero() {
        return base;
    }
    let factor = rand::thread_rng().gen_range((1.0 - randomization)..=(1.0 + randomization));
    base.mul_f64(factor.max(0.0))
}
