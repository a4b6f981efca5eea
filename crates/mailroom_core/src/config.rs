//! Mailroom configuration.

use rand::Rng;
use std::time::Duration;

/// Default number of reload-and-reapply rounds before a contended root is
/// reported as failed.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;

/// Options for a [`Mailroom`](crate::Mailroom) instance.
///
/// # Example
///
/// ```rust
/// use mailroom_core::{MailroomOptions, RetryConfig};
/// use std::time::Duration;
///
/// let options = MailroomOptions::new()
///     .with_max_conflict_retries(10)
///     .with_write_retry(RetryConfig::new(4).with_initial_delay(Duration::from_millis(20)));
///
/// assert_eq!(options.max_conflict_retries, 10);
/// assert_eq!(options.write_retry.max_attempts, 4);
/// ```
#[derive(Debug, Clone)]
pub struct MailroomOptions {
    /// Backoff policy for transient store failures. Applies to writes and to
    /// the reloads that follow a version conflict.
    pub write_retry: RetryConfig,
    /// How many version conflicts a root may hit before the engine gives up
    /// on it for the current call.
    pub max_conflict_retries: u32,
}

impl MailroomOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transient-failure retry policy.
    #[must_use]
    pub fn with_write_retry(mut self, retry: RetryConfig) -> Self {
        self.write_retry = retry;
        self
    }

    /// Sets the conflict retry bound.
    #[must_use]
    pub const fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}

impl Default for MailroomOptions {
    fn default() -> Self {
        Self {
            write_retry: RetryConfig::default(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

/// Exponential backoff policy for transient store failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay, before jitter.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to each delay.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a policy allowing `max_attempts` attempts.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Returns the attempt bound with zero clamped to one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait before the given attempt (0-indexed; attempt 0 never
    /// waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64()).max(0.0);

        let delay = if self.add_jitter && capped > 0.0 {
            capped + capped * 0.25 * rand::thread_rng().gen::<f64>()
        } else {
            capped
        };
        // Near Duration::MAX the f64 round-trip overflows.
        Duration::try_from_secs_f64(delay).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
