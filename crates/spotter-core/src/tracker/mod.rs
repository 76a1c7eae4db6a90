//! Client-side workout tracking.
//!
//! A [`WorkoutTracker`] holds the sets of one active log. Edits apply locally
//! at once and reach the server through a debounced, ordered save queue:
//!
//! - edits to a set within the debounce window collapse into one write
//! - a set is created on the server exactly once, keyed by its
//!   [`LocalSetId`], and keeps the server id from the first confirmation
//! - operations on the same set never overtake each other
//! - transient failures retry with backoff; exhausted operations wait for
//!   [`WorkoutTracker::retry_failed`]

mod pipeline;
mod retry_queue;
mod store;

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, Mutex, Notify},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use pipeline::{FieldState, FieldStates, LocalSet, SaveEvent, SetField};
pub use retry_queue::{
    FailureOutcome, OperationId, OperationKind, OperationPayload, OperationStatus, RetryQueue,
    SaveOperation,
};
pub use store::WorkoutStore;

use crate::{
    config::TrackerConfig,
    error::Result,
    models::{SetValues, WorkoutSessionLog},
    params::{validate_set_values, StartSessionLog},
    planner::Planner,
};
use pipeline::{PipelineState, Shared};

const EVENT_CAPACITY: usize = 128;

/// Temporary identity of a set until the server assigns one.
///
/// Also sent as the set's `client_ref`, which makes creates idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalSetId(Uuid);

impl LocalSetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

pub struct WorkoutTracker {
    log: WorkoutSessionLog,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WorkoutTracker {
    /// Starts (or resumes, for a repeated client ref) a log and tracks it.
    pub async fn start(
        planner: &Planner,
        params: &StartSessionLog,
        config: TrackerConfig,
    ) -> Result<Self> {
        let log = planner.create_session_log(params).await?;
        Self::open(Arc::new(planner.clone()), log, config)
    }

    /// Tracks an existing log. Its stored sets become clean local sets.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(
        store: Arc<dyn WorkoutStore>,
        log: WorkoutSessionLog,
        config: TrackerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let sets = log.details.iter().map(LocalSet::from_detail).collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Shared {
            state: Mutex::new(PipelineState::new(log.id, sets, &config)),
            store,
            kick: Notify::new(),
            events,
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pipeline::run(Arc::clone(&shared), cancel.clone()));
        log::debug!("Tracking log {} ({} sets)", log.id, log.details.len());

        Ok(Self {
            log,
            shared,
            cancel,
            task: Some(task),
        })
    }

    pub fn log(&self) -> &WorkoutSessionLog {
        &self.log
    }

    pub fn log_id(&self) -> u64 {
        self.log.id
    }

    /// Adds a set locally; it is created on the server after the debounce.
    pub async fn add_set(
        &self,
        exercise_name: impl Into<String>,
        set_number: u32,
        values: SetValues,
    ) -> Result<LocalSetId> {
        validate_set_values(&values)?;
        let id = self.shared.state.lock().await.add_set(
            exercise_name.into(),
            set_number,
            values,
            None,
            Instant::now(),
        );
        self.shared.kick.notify_one();
        Ok(id)
    }

    pub async fn edit_reps(&self, id: LocalSetId, reps: Option<u32>) -> Result<()> {
        self.edit(id, SetField::Reps, |v| v.reps = reps).await
    }

    pub async fn edit_weight(&self, id: LocalSetId, weight: Option<f64>) -> Result<()> {
        validate_set_values(&SetValues {
            weight,
            ..Default::default()
        })?;
        self.edit(id, SetField::Weight, |v| v.weight = weight).await
    }

    pub async fn edit_notes(&self, id: LocalSetId, notes: Option<String>) -> Result<()> {
        self.edit(id, SetField::Notes, |v| v.notes = notes).await
    }

    async fn edit(
        &self,
        id: LocalSetId,
        field: SetField,
        apply: impl FnOnce(&mut SetValues),
    ) -> Result<()> {
        self.shared
            .state
            .lock()
            .await
            .edit(id, field, apply, Instant::now())?;
        self.shared.kick.notify_one();
        Ok(())
    }

    /// Removes a set at once; the server delete follows in the background.
    pub async fn delete_set(&self, id: LocalSetId) -> Result<()> {
        self.shared.state.lock().await.delete(id, Instant::now())?;
        self.shared.kick.notify_one();
        Ok(())
    }

    /// Skips the debounce and sends everything that is ready now.
    ///
    /// Operations in backoff are not hurried.
    pub async fn save_now(&self) -> usize {
        self.shared.state.lock().await.flush(Instant::now());
        pipeline::process_ready(&self.shared).await
    }

    /// Gives every failed operation a fresh set of attempts.
    pub async fn retry_failed(&self) -> usize {
        let count = self
            .shared
            .state
            .lock()
            .await
            .queue
            .retry_failed(Instant::now());
        if count > 0 {
            log::info!("Retrying {count} failed saves for log {}", self.log.id);
            self.shared.kick.notify_one();
        }
        count
    }

    pub async fn sets(&self) -> Vec<LocalSet> {
        self.shared.state.lock().await.sets().to_vec()
    }

    pub async fn operations(&self) -> Vec<SaveOperation> {
        self.shared
            .state
            .lock()
            .await
            .queue
            .operations()
            .cloned()
            .collect()
    }

    /// True when no edit is waiting and nothing is pending or in flight.
    pub async fn is_settled(&self) -> bool {
        let state = self.shared.state.lock().await;
        state.debounce_until.is_none() && state.queue.is_settled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.shared.events.subscribe()
    }

    async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Save loop for log {} ended abnormally: {e}", self.log.id);
            }
        }
    }

    /// Flushes pending edits and ends the log.
    ///
    /// Saves still failing afterwards are reported in the log and dropped.
    pub async fn finish(mut self) -> Result<WorkoutSessionLog> {
        self.stop().await;
        self.save_now().await;
        let failed = self
            .operations()
            .await
            .iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .count();
        if failed > 0 {
            log::warn!("Ending log {} with {failed} unsaved changes", self.log.id);
        }
        self.shared.store.end_log(self.log.id).await
    }

    /// Drops unsent edits and discards the log on the server.
    pub async fn abandon(mut self) -> Result<WorkoutSessionLog> {
        self.stop().await;
        self.shared.store.abandon_log(self.log.id).await
    }
}

impl Drop for WorkoutTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
