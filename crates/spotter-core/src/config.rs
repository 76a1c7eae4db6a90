//! Tunables for the client-side save pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpotterError};

/// Exponential backoff between attempts of one save operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Factor applied after each further failure
    pub multiplier: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Attempts (first one included) before an operation is marked failed
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failures` consecutive failed attempts.
    ///
    /// Clamped to [`RetryPolicy::max_delay`].
    pub fn delay_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt is allowed after `attempts` tries.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// Configuration of a [`WorkoutTracker`](crate::tracker::WorkoutTracker).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Quiet period after the last edit before dirty fields are saved
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            retry: RetryPolicy::default(),
        }
    }
}

impl TrackerConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(SpotterError::Configuration {
                message: "retry.max_attempts must be at least 1".to_string(),
            });
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(SpotterError::Configuration {
                message: format!(
                    "retry.multiplier must be a finite number >= 1, got {}",
                    self.retry.multiplier
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_then_clamps() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(4), Duration::from_secs(5));
        assert_eq!(policy.delay_after(400), Duration::from_secs(5));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        assert!(policy.allows_retry(1));
        assert!(!policy.allows_retry(2));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = TrackerConfig::default().with_retry(RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
        assert!(TrackerConfig::default().validate().is_ok());
    }
}
