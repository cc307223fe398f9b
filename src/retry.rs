//! Retry policy for classified failures.
//!
//! The policy is deliberately small: a failure is retried only when its
//! classification says it is transient (rate limited or a server error), the
//! request is eligible for retry, and the attempt budget is not spent. Delays
//! grow exponentially with a little jitter on top.

use crate::classify::ClassifiedError;
use rand::Rng;
use std::time::Duration;

/// Backoff and attempt-budget configuration.
///
/// # Examples
///
/// ```
/// use steadfast::RetryPolicy;
/// use std::time::Duration;
///
/// // 1s, 2s, 4s ceilings before jitter
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.base_delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.base_delay_for_attempt(3), Duration::from_secs(4));
///
/// let quick = RetryPolicy::default()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(100))
///     .multiplier(1.5);
/// assert_eq!(quick.base_delay_for_attempt(2), Duration::from_millis(150));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
    multiplier: f64,
    jitter_ratio: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter_ratio: 0.1,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries: one attempt per call.
    pub fn none() -> Self {
        Self::default().max_attempts(1)
    }

    /// Total transport attempts allowed per logical call (minimum 1).
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the first retry.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Growth factor between consecutive delays (values below 1 are clamped).
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        self
    }

    /// Upper bound of the jitter term as a fraction of the delay.
    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = if ratio.is_finite() {
            ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Cap applied to the computed delay before jitter.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns the configured attempt budget.
    pub fn attempt_budget(&self) -> usize {
        self.max_attempts
    }

    /// Returns a fresh retry state for a new logical call.
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt: 1,
            max_attempts: self.max_attempts,
        }
    }

    /// `base_delay * multiplier^(attempt-1)`, capped at `max_delay`.
    ///
    /// `attempt` is the 1-indexed attempt that just failed.
    pub fn base_delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let factor = self.multiplier.powi(exponent);
        let nanos = (self.base_delay.as_nanos() as f64 * factor).round();
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }

    /// The base delay plus jitter drawn uniformly from `[0, jitter_ratio * delay]`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let delay = self.base_delay_for_attempt(attempt);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(jitter)
    }

    /// Decides whether a classified failure should be retried.
    ///
    /// A retry happens only for retryable classifications and only while the
    /// state has attempts left.
    pub fn should_retry(&self, error: &ClassifiedError, state: &RetryState) -> RetryDecision {
        if !error.retryable || state.is_exhausted() {
            return RetryDecision::stop();
        }
        RetryDecision {
            retry: true,
            delay: self.delay_for_attempt(state.attempt),
        }
    }
}

/// Position of a logical call within its attempt budget.
///
/// Immutable: [`RetryState::next`] returns a new value for the following
/// attempt instead of mutating a counter shared with anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: usize,
    max_attempts: usize,
}

impl RetryState {
    /// The 1-indexed attempt currently in progress.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// The attempt budget.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// `true` once the current attempt is the last one allowed.
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// The state for the next attempt, never past the budget.
    pub fn next(self) -> Self {
        Self {
            attempt: (self.attempt + 1).min(self.max_attempts),
            max_attempts: self.max_attempts,
        }
    }
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }

    /// Stretches the delay to honor a server-provided wait hint.
    pub fn honoring(mut self, hint: Option<Duration>) -> Self {
        if let (true, Some(hint)) = (self.retry, hint) {
            self.delay = self.delay.max(hint);
        }
        self
    }
}
