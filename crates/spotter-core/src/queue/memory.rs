//! In-process job queue.
//!
//! Suitable for tests, the CLI and single-process deployments. Jobs are kept
//! in memory; nothing survives a restart.
//!
//! Selection order: among queued jobs whose start time has passed, the
//! highest priority wins and equal priorities run in submission order.
//! A job with `depends_on` stays `waiting` until its prerequisite completes
//! and fails together with it when the prerequisite fails for good.
//!
//! Finished jobs stay visible to [`InMemoryJobQueue::snapshot`] for a
//! retention window and are then dropped.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, Notify},
    time::Instant,
};

use super::{
    message::{MessageEnvelope, MessageType},
    options::{JobOptions, Priority},
    worker::JobFailure,
    JobId, JobQueue,
};
use crate::error::{Result, SpotterError};

const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Held until its prerequisite completes
    Waiting,
    /// Eligible once its start time has passed
    Queued,
    Active,
    Completed,
    Failed,
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub message_type: MessageType,
    pub priority: Priority,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub depends_on: Option<JobId>,
    pub last_error: Option<String>,
}

/// A job reserved by a worker.
#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub id: JobId,
    /// 1-based attempt number
    pub attempt: u32,
    pub envelope: MessageEnvelope,
}

struct JobRecord {
    envelope: MessageEnvelope,
    options: JobOptions,
    status: JobStatus,
    attempts_made: u32,
    last_error: Option<String>,
    seq: u64,
    run_at: Instant,
    /// Set once the job is completed or failed for good
    finished_at: Option<Instant>,
}

impl JobRecord {
    fn snapshot(&self, id: JobId) -> JobSnapshot {
        JobSnapshot {
            id,
            message_type: self.envelope.message_type,
            priority: self.options.priority,
            status: self.status,
            attempts_made: self.attempts_made,
            max_attempts: self.options.attempts,
            depends_on: self.options.depends_on,
            last_error: self.last_error.clone(),
        }
    }

    fn start_time(&self, now: Instant) -> Instant {
        self.options.delay.map_or(now, |delay| now + delay)
    }

    fn finish(&mut self, status: JobStatus, now: Instant) {
        self.status = status;
        self.finished_at = Some(now);
    }
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, JobRecord>,
    /// Prerequisite -> jobs waiting on it
    held: HashMap<JobId, Vec<JobId>>,
    next_seq: u64,
    closed: bool,
}

impl State {
    /// Fails every job transitively waiting on `failed`.
    fn fail_dependents(&mut self, failed: JobId, now: Instant) {
        let mut pending = vec![failed];
        while let Some(prerequisite) = pending.pop() {
            for dependent in self.held.remove(&prerequisite).unwrap_or_default() {
                if let Some(job) = self.jobs.get_mut(&dependent) {
                    job.finish(JobStatus::Failed, now);
                    job.last_error = Some(format!("Prerequisite job {prerequisite} failed"));
                    log::warn!(
                        "Job {dependent} ({}) failed because prerequisite {prerequisite} failed",
                        job.envelope.message_type
                    );
                }
                pending.push(dependent);
            }
        }
    }

    fn release_dependents(&mut self, completed: JobId, now: Instant) -> usize {
        let dependents = self.held.remove(&completed).unwrap_or_default();
        for dependent in &dependents {
            if let Some(job) = self.jobs.get_mut(dependent) {
                job.status = JobStatus::Queued;
                job.run_at = job.start_time(now);
                log::debug!("Released job {dependent} after prerequisite {completed}");
            }
        }
        dependents.len()
    }

    /// Drops finished jobs older than `retention`.
    ///
    /// Dependents are released or failed as soon as a prerequisite finishes,
    /// so no held job refers to a pruned one.
    fn prune(&mut self, now: Instant, retention: Duration) {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !job.finished_at
                .is_some_and(|finished| now.saturating_duration_since(finished) >= retention)
        });
        let pruned = before - self.jobs.len();
        if pruned > 0 {
            log::debug!("Pruned {pruned} finished job(s)");
        }
    }
}

/// Priority queue with delays, retries and a dependency gate.
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    wakeup: Notify,
    retention: Duration,
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            wakeup: Notify::new(),
            retention: DEFAULT_RETENTION,
        }
    }
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long finished jobs stay visible before they are dropped.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Reserves the next eligible job, if any, and marks it active.
    pub async fn reserve(&self) -> Option<ReservedJob> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.prune(now, self.retention);

        let id = state
            .jobs
            .iter()
            .filter(|(_, job)| job.status == JobStatus::Queued && job.run_at <= now)
            .max_by(|(_, a), (_, b)| {
                a.options
                    .priority
                    .cmp(&b.options.priority)
                    .then_with(|| b.seq.cmp(&a.seq))
            })
            .map(|(id, _)| *id)?;

        let job = state.jobs.get_mut(&id)?;
        job.status = JobStatus::Active;
        job.attempts_made += 1;
        Some(ReservedJob {
            id,
            attempt: job.attempts_made,
            envelope: job.envelope.clone(),
        })
    }

    /// Marks an active job completed and releases jobs waiting on it.
    pub async fn complete(&self, id: JobId) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.finish(JobStatus::Completed, now);
            job.last_error = None;
        }
        if state.release_dependents(id, now) > 0 {
            self.wakeup.notify_one();
        }
    }

    /// Records a failed attempt; schedules a retry while attempts remain and
    /// the failure is retryable.
    pub async fn fail(&self, id: JobId, failure: &JobFailure) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return;
        };

        job.last_error = Some(failure.message.clone());
        if failure.retryable && job.attempts_made < job.options.attempts {
            let delay = job
                .options
                .backoff
                .map(|backoff| backoff.delay_after(job.attempts_made))
                .unwrap_or_default();
            job.status = JobStatus::Queued;
            job.run_at = now + delay;
            log::info!(
                "Retrying job {id} ({}) in {delay:?}, attempt {} of {}: {}",
                job.envelope.message_type,
                job.attempts_made + 1,
                job.options.attempts,
                failure.message
            );
            self.wakeup.notify_one();
            return;
        }

        job.finish(JobStatus::Failed, now);
        log::warn!(
            "Job {id} ({}) failed after {} attempt(s): {}",
            job.envelope.message_type,
            job.attempts_made,
            failure.message
        );
        state.fail_dependents(id, now);
    }

    /// Earliest start time among queued jobs.
    pub async fn next_run_at(&self) -> Option<Instant> {
        let state = self.state.lock().await;
        state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Queued)
            .map(|job| job.run_at)
            .min()
    }

    pub async fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let state = self.state.lock().await;
        state.jobs.get(&id).map(|job| job.snapshot(id))
    }

    /// All jobs in submission order.
    pub async fn snapshots(&self) -> Vec<JobSnapshot> {
        let state = self.state.lock().await;
        let mut jobs: Vec<_> = state.jobs.iter().collect();
        jobs.sort_by_key(|(_, job)| job.seq);
        jobs.into_iter().map(|(id, job)| job.snapshot(*id)).collect()
    }

    /// Stops accepting new jobs; queued jobs can still be drained.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.wakeup.notify_one();
    }

    /// Resolves when a job may have become eligible.
    pub(crate) async fn notified(&self) {
        self.wakeup.notified().await;
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, message: MessageEnvelope, options: JobOptions) -> Result<JobId> {
        let message_type = message.message_type;
        let reject = |reason: String| SpotterError::QueueSubmission {
            message_type: message_type.to_string(),
            reason,
        };

        options
            .validate()
            .map_err(|e| reject(e.to_string()))?;

        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(reject("Queue is closed".to_string()));
        }
        state.prune(now, self.retention);

        let id = JobId::new();
        let seq = state.next_seq;
        state.next_seq += 1;

        let mut record = JobRecord {
            envelope: message,
            options,
            status: JobStatus::Queued,
            attempts_made: 0,
            last_error: None,
            seq,
            run_at: now,
            finished_at: None,
        };
        record.run_at = record.start_time(now);

        if let Some(prerequisite) = record.options.depends_on {
            let prerequisite_status = state
                .jobs
                .get(&prerequisite)
                .map(|job| job.status)
                .ok_or_else(|| reject(format!("Unknown prerequisite job {prerequisite}")))?;
            match prerequisite_status {
                JobStatus::Completed => {}
                JobStatus::Failed => {
                    record.finish(JobStatus::Failed, now);
                    record.last_error = Some(format!("Prerequisite job {prerequisite} failed"));
                }
                JobStatus::Waiting | JobStatus::Queued | JobStatus::Active => {
                    record.status = JobStatus::Waiting;
                    state.held.entry(prerequisite).or_default().push(id);
                }
            }
        }

        log::debug!(
            "Enqueued job {id} ({message_type}, priority {}, status {:?})",
            record.options.priority,
            record.status
        );
        let eligible = record.status == JobStatus::Queued;
        state.jobs.insert(id, record);
        drop(state);

        if eligible {
            self.wakeup.notify_one();
        }
        Ok(id)
    }
}
