//! Utility types shared by the stages.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A retry policy with exponential backoff.
///
/// Producers use it to re-offer an item after a put timeout. The default
/// policy never retries, so the first timeout is reported.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RetryPolicy {
    max_attempts: usize,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
}

impl RetryPolicy {
    /// Create a policy with 3 attempts, starting at 100ms and doubling
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }

    /// A policy that makes exactly one attempt
    pub fn none() -> Self {
        Self::new().with_max_attempts(1)
    }

    /// Set the maximum number of attempts, including the first one
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Maximum number of attempts. Zero is treated as one.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts.max(1)
    }

    /// The delays to sleep between attempts, one per retry
    pub fn backoff(&self) -> Backoff {
        Backoff {
            remaining: self.max_attempts() - 1,
            next: self.initial_delay.min(self.max_delay),
            max_delay: self.max_delay,
            factor: self.backoff_factor,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Iterator over the delays of a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    remaining: usize,
    next: Duration,
    max_delay: Duration,
    factor: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next;
        self.next = std::cmp::min(
            Duration::from_millis((delay.as_millis() as f64 * self.factor) as u64),
            self.max_delay,
        );
        Some(delay)
    }
}
