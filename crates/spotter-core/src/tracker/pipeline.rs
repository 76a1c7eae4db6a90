//! Field state machine and the loop that drains the save queue.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Mutex, Notify},
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use super::{
    retry_queue::{
        FailureOutcome, OperationId, OperationKind, OperationPayload, OperationStatus,
        RetryQueue, SaveOperation,
    },
    store::WorkoutStore,
    LocalSetId,
};
use crate::{
    config::TrackerConfig,
    error::{Result, SpotterError},
    models::{SetValues, WorkoutSessionDetail},
    params::LogSet,
};

/// Save state of one editable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldState {
    #[default]
    Clean,
    /// Edited, waiting for the debounce window to close
    Dirty,
    /// Handed to the save queue
    Scheduled,
    Saving,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetField {
    Reps,
    Weight,
    Notes,
}

impl SetField {
    const ALL: [SetField; 3] = [SetField::Reps, SetField::Weight, SetField::Notes];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldStates {
    pub reps: FieldState,
    pub weight: FieldState,
    pub notes: FieldState,
}

impl FieldStates {
    pub fn get(&self, field: SetField) -> FieldState {
        match field {
            SetField::Reps => self.reps,
            SetField::Weight => self.weight,
            SetField::Notes => self.notes,
        }
    }

    fn set(&mut self, field: SetField, state: FieldState) {
        match field {
            SetField::Reps => self.reps = state,
            SetField::Weight => self.weight = state,
            SetField::Notes => self.notes = state,
        }
    }

    pub fn any(&self, state: FieldState) -> bool {
        SetField::ALL.iter().any(|f| self.get(*f) == state)
    }

    /// Moves every field in one of `from` to `to`.
    fn transition(&mut self, from: &[FieldState], to: FieldState) {
        for field in SetField::ALL {
            if from.contains(&self.get(field)) {
                self.set(field, to);
            }
        }
    }
}

/// A set as the client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSet {
    pub local_id: LocalSetId,
    /// Assigned once the server confirms the create; never changes afterwards
    pub server_id: Option<u64>,
    pub exercise_name: String,
    pub set_number: u32,
    pub order_marker: Option<String>,
    /// Latest values typed by the user
    pub draft: SetValues,
    /// Last values the server acknowledged
    pub confirmed: Option<SetValues>,
    pub fields: FieldStates,
}

impl LocalSet {
    pub fn is_new(&self) -> bool {
        self.server_id.is_none()
    }

    pub(crate) fn from_detail(detail: &WorkoutSessionDetail) -> Self {
        Self {
            local_id: LocalSetId::new(),
            server_id: Some(detail.id),
            exercise_name: detail.exercise_name.clone(),
            set_number: detail.set_number,
            order_marker: Some(detail.order_marker.clone()),
            draft: detail.values(),
            confirmed: Some(detail.values()),
            fields: FieldStates::default(),
        }
    }
}

/// Emitted after every save attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveEvent {
    pub operation_id: OperationId,
    pub local_id: LocalSetId,
    pub server_id: Option<u64>,
    pub kind: OperationKind,
    /// `pending` means the attempt failed and a retry is scheduled
    pub status: OperationStatus,
    pub attempts: u32,
    pub error: Option<String>,
}

/// What a successful store call produced.
#[derive(Debug)]
pub(crate) enum Completed {
    Created(WorkoutSessionDetail),
    Updated(WorkoutSessionDetail),
    Deleted,
}

#[derive(Debug)]
pub(crate) struct PipelineState {
    log_id: u64,
    sets: Vec<LocalSet>,
    /// Deleted sets kept until the server confirms, with their old index
    removed: Vec<(usize, LocalSet)>,
    pub(crate) queue: RetryQueue,
    pub(crate) debounce_until: Option<Instant>,
    debounce: Duration,
}

impl PipelineState {
    pub(crate) fn new(log_id: u64, sets: Vec<LocalSet>, config: &TrackerConfig) -> Self {
        Self {
            log_id,
            sets,
            removed: Vec::new(),
            queue: RetryQueue::new(config.retry),
            debounce_until: None,
            debounce: config.debounce,
        }
    }

    pub(crate) fn sets(&self) -> &[LocalSet] {
        &self.sets
    }

    fn touch(&mut self, now: Instant) {
        self.debounce_until = Some(now + self.debounce);
    }

    fn find(&self, local_id: LocalSetId) -> Result<usize> {
        self.sets
            .iter()
            .position(|s| s.local_id == local_id)
            .ok_or_else(|| {
                SpotterError::invalid_input("local_id")
                    .with_reason(format!("Unknown set {local_id}"))
            })
    }

    /// Looks in both live and pending-delete sets.
    fn set_mut(&mut self, local_id: LocalSetId) -> Option<&mut LocalSet> {
        match self.sets.iter().position(|s| s.local_id == local_id) {
            Some(i) => self.sets.get_mut(i),
            None => self
                .removed
                .iter_mut()
                .find(|(_, s)| s.local_id == local_id)
                .map(|(_, s)| s),
        }
    }

    pub(crate) fn add_set(
        &mut self,
        exercise_name: String,
        set_number: u32,
        values: SetValues,
        order_marker: Option<String>,
        now: Instant,
    ) -> LocalSetId {
        let local_id = LocalSetId::new();
        let mut fields = FieldStates::default();
        if values.reps.is_some() {
            fields.reps = FieldState::Dirty;
        }
        if values.weight.is_some() {
            fields.weight = FieldState::Dirty;
        }
        if values.notes.is_some() {
            fields.notes = FieldState::Dirty;
        }
        self.sets.push(LocalSet {
            local_id,
            server_id: None,
            exercise_name,
            set_number,
            order_marker,
            draft: values,
            confirmed: None,
            fields,
        });
        self.touch(now);
        local_id
    }

    pub(crate) fn edit(
        &mut self,
        local_id: LocalSetId,
        field: SetField,
        apply: impl FnOnce(&mut SetValues),
        now: Instant,
    ) -> Result<()> {
        let index = self.find(local_id)?;
        let set = &mut self.sets[index];
        apply(&mut set.draft);
        set.fields.set(field, FieldState::Dirty);
        self.touch(now);
        Ok(())
    }

    /// Removes a set locally and queues its server delete if it has one.
    pub(crate) fn delete(&mut self, local_id: LocalSetId, now: Instant) -> Result<()> {
        let index = self.find(local_id)?;
        let set = self.sets.remove(index);

        // A create that was already tried may have committed with its
        // response lost; its retry resolves the server id for the delete.
        let create_started = self.queue.has_started(local_id, OperationKind::Create);
        if create_started {
            self.queue.discard_unsent_of(local_id, OperationKind::Update);
        } else {
            self.queue.discard_unsent(local_id);
        }

        if set.server_id.is_some() || create_started {
            self.queue
                .push(local_id, set.server_id, OperationPayload::Delete, now);
            self.removed.push((index, set));
        }
        Ok(())
    }

    /// Closes the debounce window: dirty fields become scheduled and the
    /// queue gets at most one create or update per set.
    pub(crate) fn flush(&mut self, now: Instant) {
        self.debounce_until = None;
        let log_id = self.log_id;

        for set in &mut self.sets {
            set.fields.transition(&[FieldState::Dirty], FieldState::Scheduled);

            match set.server_id {
                None => {
                    if let Some(op) = self.queue.unsent_mut(set.local_id, OperationKind::Create) {
                        if let OperationPayload::Create(request) = &mut op.payload {
                            request.values = set.draft.clone();
                        }
                    } else if self.queue.has_open(set.local_id, OperationKind::Create) {
                        // Create in flight; edits follow once it is confirmed.
                        set.fields.transition(&[FieldState::Scheduled], FieldState::Dirty);
                    } else {
                        let request = LogSet {
                            log_id,
                            client_ref: set.local_id.to_string(),
                            exercise_name: set.exercise_name.clone(),
                            set_number: set.set_number,
                            values: set.draft.clone(),
                            order_marker: set.order_marker.clone(),
                        };
                        self.queue
                            .push(set.local_id, None, OperationPayload::Create(request), now);
                    }
                }
                Some(server_id) => {
                    if !set.fields.any(FieldState::Scheduled) {
                        continue;
                    }
                    if set.draft.is_default() || set.confirmed.as_ref() == Some(&set.draft) {
                        set.fields.transition(&[FieldState::Scheduled], FieldState::Clean);
                        continue;
                    }
                    if let Some(op) = self.queue.unsent_mut(set.local_id, OperationKind::Update) {
                        op.payload = OperationPayload::Update(set.draft.clone());
                    } else {
                        self.queue.push(
                            set.local_id,
                            Some(server_id),
                            OperationPayload::Update(set.draft.clone()),
                            now,
                        );
                    }
                }
            }
        }
    }

    pub(crate) fn begin(&mut self, op: &SaveOperation) {
        if op.kind() == OperationKind::Delete {
            return;
        }
        if let Some(set) = self.set_mut(op.local_id) {
            set.fields
                .transition(&[FieldState::Scheduled, FieldState::Failed], FieldState::Saving);
        }
    }

    pub(crate) fn on_success(&mut self, op: &SaveOperation, completed: Completed, now: Instant) {
        self.queue.succeed(op.id);

        match completed {
            Completed::Created(detail) => {
                let Some(set) = self.set_mut(op.local_id) else {
                    return;
                };
                match set.server_id {
                    None => set.server_id = Some(detail.id),
                    Some(existing) if existing != detail.id => {
                        log::warn!(
                            "Set {} already bound to {existing}, ignoring id {}",
                            op.local_id,
                            detail.id
                        );
                    }
                    Some(_) => {}
                }
                set.confirmed = Some(detail.values());
                set.fields.transition(&[FieldState::Saving], FieldState::Clean);
                let edited_meanwhile = set.fields.any(FieldState::Dirty);
                let server_id = set.server_id;

                if let Some(server_id) = server_id {
                    self.queue.resolve_server_id(op.local_id, server_id);
                }
                if edited_meanwhile {
                    self.debounce_until = Some(now);
                }
            }
            Completed::Updated(detail) => {
                if let Some(set) = self.set_mut(op.local_id) {
                    set.confirmed = Some(detail.values());
                    set.fields.transition(&[FieldState::Saving], FieldState::Clean);
                }
            }
            Completed::Deleted => {
                self.removed.retain(|(_, s)| s.local_id != op.local_id);
            }
        }
    }

    pub(crate) fn on_failure(
        &mut self,
        op: &SaveOperation,
        error: &SpotterError,
        now: Instant,
    ) -> FailureOutcome {
        let outcome = self
            .queue
            .fail(op.id, error.to_string(), error.is_retryable(), now)
            .unwrap_or(FailureOutcome::Failed);

        match (outcome, op.kind()) {
            (FailureOutcome::Rescheduled { .. }, OperationKind::Delete) => {}
            (FailureOutcome::Rescheduled { .. }, _) => {
                if let Some(set) = self.set_mut(op.local_id) {
                    set.fields.transition(&[FieldState::Saving], FieldState::Scheduled);
                }
            }
            (FailureOutcome::Failed, OperationKind::Delete) => self.restore(op.local_id),
            (FailureOutcome::Failed, OperationKind::Create)
                if self.removed.iter().any(|(_, s)| s.local_id == op.local_id) =>
            {
                // Deleted while its create was in flight; nothing reached the server.
                self.removed.retain(|(_, s)| s.local_id != op.local_id);
                self.queue.discard_unsent(op.local_id);
            }
            (FailureOutcome::Failed, _) => {
                if let Some(set) = self.set_mut(op.local_id) {
                    set.fields.transition(&[FieldState::Saving], FieldState::Failed);
                }
            }
        }
        outcome
    }

    /// Puts a set whose delete could not be delivered back in place.
    fn restore(&mut self, local_id: LocalSetId) {
        let Some(pos) = self.removed.iter().position(|(_, s)| s.local_id == local_id) else {
            return;
        };
        let (index, mut set) = self.removed.remove(pos);
        self.queue.discard_unsent(local_id);
        set.fields
            .transition(&[FieldState::Scheduled, FieldState::Saving], FieldState::Failed);
        let index = index.min(self.sets.len());
        log::warn!("Delete of set {local_id} failed, restoring it");
        self.sets.insert(index, set);
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<PipelineState>,
    pub(crate) store: Arc<dyn WorkoutStore>,
    pub(crate) kick: Notify,
    pub(crate) events: broadcast::Sender<SaveEvent>,
}

async fn execute(store: &dyn WorkoutStore, op: &SaveOperation) -> Result<Completed> {
    match (&op.payload, op.server_id) {
        (OperationPayload::Create(request), _) => {
            store.create_set(request).await.map(Completed::Created)
        }
        (OperationPayload::Update(values), Some(id)) => {
            store.update_set(id, values).await.map(Completed::Updated)
        }
        (OperationPayload::Delete, Some(id)) => {
            store.delete_set(id).await.map(|_| Completed::Deleted)
        }
        // Only reachable if the create failed for good.
        (_, None) => Err(SpotterError::invalid_input("server_id")
            .with_reason(format!("Set {} was never created", op.local_id))),
    }
}

/// Runs every operation that is ready now. Returns how many were attempted.
pub(crate) async fn process_ready(shared: &Shared) -> usize {
    let mut processed = 0;
    loop {
        let op = {
            let mut state = shared.state.lock().await;
            let Some(op) = state.queue.next_ready(Instant::now()) else {
                break;
            };
            state.begin(&op);
            op
        };

        log::debug!("Saving set {} ({:?}, attempt {})", op.local_id, op.kind(), op.attempts);
        let result = execute(shared.store.as_ref(), &op).await;

        let (event, wake) = {
            let mut state = shared.state.lock().await;
            let now = Instant::now();
            match result {
                Ok(completed) => {
                    state.on_success(&op, completed, now);
                    // Edits made while a create was in flight reopen the window.
                    let wake = state.debounce_until.is_some();
                    let server_id = state
                        .sets()
                        .iter()
                        .find(|s| s.local_id == op.local_id)
                        .and_then(|s| s.server_id)
                        .or(op.server_id);
                    let event = SaveEvent {
                        operation_id: op.id,
                        local_id: op.local_id,
                        server_id,
                        kind: op.kind(),
                        status: OperationStatus::Succeeded,
                        attempts: op.attempts,
                        error: None,
                    };
                    (event, wake)
                }
                Err(e) => {
                    let outcome = state.on_failure(&op, &e, now);
                    let status = match outcome {
                        FailureOutcome::Rescheduled { at } => {
                            log::info!(
                                "Save of set {} failed, retrying in {:?}: {e}",
                                op.local_id,
                                at - now
                            );
                            OperationStatus::Pending
                        }
                        FailureOutcome::Failed => {
                            log::warn!("Save of set {} failed: {e}", op.local_id);
                            OperationStatus::Failed
                        }
                    };
                    let event = SaveEvent {
                        operation_id: op.id,
                        local_id: op.local_id,
                        server_id: op.server_id,
                        kind: op.kind(),
                        status,
                        attempts: op.attempts,
                        error: Some(e.to_string()),
                    };
                    (event, matches!(outcome, FailureOutcome::Rescheduled { .. }))
                }
            }
        };

        // The run loop may be parked on deadlines computed before this
        // attempt, e.g. when called from `save_now`.
        if wake {
            shared.kick.notify_one();
        }

        // No subscribers is fine.
        let _ = shared.events.send(event);
        processed += 1;
    }
    processed
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Background loop: flushes when the debounce window closes and runs
/// retries when they come due.
pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let (debounce_at, retry_at) = {
            let state = shared.state.lock().await;
            (state.debounce_until, state.queue.next_due())
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.kick.notified() => continue,
            _ = sleep_until_some(debounce_at) => {
                let mut state = shared.state.lock().await;
                let now = Instant::now();
                if state.debounce_until.is_some_and(|at| at <= now) {
                    state.flush(now);
                }
            }
            _ = sleep_until_some(retry_at) => {}
        }

        process_ready(&shared).await;
    }
    log::debug!("Save loop stopped");
}
