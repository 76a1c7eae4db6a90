//! Per-job delivery options.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use super::JobId;
use crate::error::{Result, SpotterError};

/// Job priority on a 1..=10 scale; higher runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const MIN: Priority = Priority(1);
    pub const LOW: Priority = Priority(2);
    pub const NORMAL: Priority = Priority(5);
    pub const HIGH: Priority = Priority(8);
    pub const MAX: Priority = Priority(10);

    pub fn new(value: u8) -> Result<Self> {
        if !(Self::MIN.0..=Self::MAX.0).contains(&value) {
            return Err(SpotterError::invalid_input("priority")
                .with_reason(format!("Priority must be between 1 and 10, got {value}")));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for Priority {
    type Error = SpotterError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delay between attempts of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay: Duration },
    /// `delay * 2^(failures - 1)`
    Exponential { delay: Duration },
}

impl Backoff {
    /// Delay to apply after the given number of failed attempts (1-based).
    pub fn delay_after(&self, failures: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { delay } => {
                let factor = 2u32.saturating_pow(failures.saturating_sub(1));
                delay.saturating_mul(factor)
            }
        }
    }
}

/// Options accepted by [`JobQueue::enqueue`](super::JobQueue::enqueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub priority: Priority,
    /// Total attempts, the first included
    pub attempts: u32,
    /// Earliest start, relative to submission
    #[serde(default)]
    pub delay: Option<Duration>,
    #[serde(default)]
    pub backoff: Option<Backoff>,
    /// Job that must complete before this one is dispatched
    #[serde(default)]
    pub depends_on: Option<JobId>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: Priority::default(),
            attempts: 1,
            delay: None,
            backoff: None,
            depends_on: None,
        }
    }
}

impl JobOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    pub fn after(mut self, job: JobId) -> Self {
        self.depends_on = Some(job);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 {
            return Err(SpotterError::invalid_input("attempts")
                .with_reason("A job needs at least one attempt"));
        }
        Ok(())
    }
}
