//! Job consumers and the worker loop.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    memory::InMemoryJobQueue,
    message::{
        EmailData, ExerciseSaveData, ExerciseTarget, MessageEnvelope, MessageType,
        NotificationData, PhaseCreateData, PhaseDuplicateData, PhaseTarget, PhaseUpdateData,
        PlanCreateData, PlanSaveData, SessionCreateData, SessionTarget, SessionUpdateData, UserActionData,
    },
};
use crate::{error::SpotterError, outcome::OutcomeError, planner::Planner};

/// Why a job attempt failed, and whether another attempt may help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    pub retryable: bool,
}

impl JobFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<SpotterError> for JobFailure {
    fn from(error: SpotterError) -> Self {
        Self {
            retryable: error.is_retryable(),
            message: error.to_string(),
        }
    }
}

impl From<OutcomeError> for JobFailure {
    fn from(error: OutcomeError) -> Self {
        Self {
            retryable: error.is_retryable(),
            message: error.message,
        }
    }
}

/// Executes delivered messages.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, message: &MessageEnvelope) -> Result<(), JobFailure>;
}

const DEFAULT_DEDUPE_CAPACITY: usize = 10_000;

/// Message ids claimed by a handler, oldest evicted first.
#[derive(Debug)]
struct SeenMessages {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl SeenMessages {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns false when the id is already claimed.
    fn claim(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    /// Gives a claim back so a redelivery can try again.
    fn release(&mut self, id: Uuid) {
        if self.ids.remove(&id) {
            self.order.retain(|seen| *seen != id);
        }
    }
}

/// Applies structural messages through a [`Planner`].
///
/// Each message id is applied at most once per handler, within the most
/// recent `dedupe_capacity` ids. An id is claimed before the message runs and
/// given back if it fails, so a concurrent redelivery is skipped while a
/// retry after failure still runs. Structural messages carry the submitter's
/// last-known stamp; a conflict at execution time is a permanent failure and
/// is never retried.
pub struct PlanJobHandler {
    planner: Planner,
    seen: Mutex<SeenMessages>,
}

impl PlanJobHandler {
    pub fn new(planner: Planner) -> Self {
        Self::with_dedupe_capacity(planner, DEFAULT_DEDUPE_CAPACITY)
    }

    pub fn with_dedupe_capacity(planner: Planner, capacity: usize) -> Self {
        Self {
            planner,
            seen: Mutex::new(SeenMessages::new(capacity)),
        }
    }

    async fn apply(&self, message: &MessageEnvelope) -> Result<(), JobFailure> {
        let planner = &self.planner;
        match message.message_type {
            MessageType::PlanCreate => {
                let data: PlanCreateData = message.payload()?;
                planner.create_plan(&data).await.into_result()?;
            }
            MessageType::PhaseCreate => {
                let data: PhaseCreateData = message.payload()?;
                planner
                    .create_phase(data.plan_id, &data.phase, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::PhaseUpdate => {
                let data: PhaseUpdateData = message.payload()?;
                planner
                    .update_phase(data.phase_id, &data.update, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::PhaseDelete => {
                let data: PhaseTarget = message.payload()?;
                planner
                    .delete_phase(data.phase_id, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::PhaseDuplicate => {
                let data: PhaseDuplicateData = message.payload()?;
                planner
                    .append_phase(data.plan_id, &data.phase, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::PhaseActivate => {
                let data: PhaseTarget = message.payload()?;
                planner
                    .activate_phase(data.phase_id, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::SessionCreate => {
                let data: SessionCreateData = message.payload()?;
                planner
                    .create_session(data.phase_id, &data.session, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::SessionUpdate => {
                let data: SessionUpdateData = message.payload()?;
                planner
                    .update_session(data.session_id, &data.update, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::SessionDelete => {
                let data: SessionTarget = message.payload()?;
                planner
                    .delete_session(data.session_id, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::SessionDuplicate => {
                let data: SessionTarget = message.payload()?;
                planner
                    .duplicate_session(data.session_id, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::ExerciseSave => {
                let data: ExerciseSaveData = message.payload()?;
                planner
                    .save_plan_exercise(&data.exercise, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::ExerciseDelete => {
                let data: ExerciseTarget = message.payload()?;
                planner
                    .delete_plan_exercise(data.exercise_id, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::PlanSave => {
                let data: PlanSaveData = message.payload()?;
                planner
                    .replace_plan(data.plan_id, &data.draft, data.last_known)
                    .await
                    .into_result()?;
            }
            MessageType::Notification => {
                let data: NotificationData = message.payload()?;
                log::info!("Notify client {}: {}", data.client_id, data.text);
            }
            MessageType::Email => {
                let data: EmailData = message.payload()?;
                log::info!("Email to {}: {}", data.to, data.subject);
            }
            MessageType::UserAction => {
                let data: UserActionData = message.payload()?;
                log::debug!(
                    "User {:?} action '{}' on plan {:?}",
                    message.user_id,
                    data.action,
                    data.plan_id
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for PlanJobHandler {
    async fn handle(&self, message: &MessageEnvelope) -> Result<(), JobFailure> {
        if !self.seen.lock().await.claim(message.message_id) {
            log::debug!(
                "Skipping redelivered message {} ({})",
                message.message_id,
                message.message_type
            );
            return Ok(());
        }

        let result = self.apply(message).await;
        if result.is_err() {
            self.seen.lock().await.release(message.message_id);
        }
        result
    }
}

/// Runs every job that is eligible right now and returns how many attempts
/// were made. Jobs scheduled for later (delay, backoff) are left queued.
pub async fn drain(queue: &InMemoryJobQueue, handler: &dyn JobHandler) -> usize {
    let mut attempts = 0;
    while let Some(job) = queue.reserve().await {
        attempts += 1;
        match handler.handle(&job.envelope).await {
            Ok(()) => queue.complete(job.id).await,
            Err(failure) => queue.fail(job.id, &failure).await,
        }
    }
    attempts
}

/// Processes jobs until `cancel` fires, sleeping while nothing is eligible.
pub async fn run_worker(
    queue: Arc<InMemoryJobQueue>,
    handler: Arc<dyn JobHandler>,
    cancel: CancellationToken,
) {
    log::debug!("Job worker started");
    loop {
        drain(&queue, handler.as_ref()).await;

        let next = queue.next_run_at().await;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = queue.notified() => {}
            _ = sleep_until(next) => {}
        }
    }
    log::debug!("Job worker stopped");
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
