//! Background job queue integration.
//!
//! Producers only see the narrow [`JobQueue::enqueue`] contract. Delivery is
//! at-least-once, so consumers must tolerate redelivery; [`PlanJobHandler`]
//! drops repeated message ids and re-validates every structural message
//! against the plan's version stamp when it runs.
//!
//! ```text
//! Planner ──▶ Dispatcher ──▶ JobQueue ──▶ worker loop ──▶ JobHandler
//!            (critical /     (priority,                  (PlanJobHandler)
//!             best effort)    delay, backoff,
//!                             depends_on gate)
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub mod dispatch;
pub mod memory;
pub mod message;
pub mod options;
pub mod worker;

pub use dispatch::Dispatcher;
pub use memory::{InMemoryJobQueue, JobSnapshot, JobStatus};
pub use message::{MessageEnvelope, MessageType};
pub use options::{Backoff, JobOptions, Priority};
pub use worker::{JobFailure, JobHandler, PlanJobHandler};

/// Identifier assigned to an accepted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Submission side of a job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Accepts a message for later execution.
    ///
    /// Fails with a queue submission error when the queue refuses the job;
    /// acceptance does not imply the job will succeed.
    async fn enqueue(&self, message: MessageEnvelope, options: JobOptions) -> Result<JobId>;
}
