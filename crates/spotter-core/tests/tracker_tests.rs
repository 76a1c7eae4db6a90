mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use common::create_test_planner;
use jiff::Timestamp;
use spotter_core::{
    params::{LogSet, StartSessionLog},
    tracker::{FieldState, OperationKind, OperationStatus, SaveEvent},
    Planner, Result, RetryPolicy, SetValues, SpotterError, TrackerConfig, WorkoutSessionDetail,
    WorkoutSessionLog, WorkoutStore, WorkoutTracker,
};
use tokio::{sync::broadcast, time::sleep};

fn transient() -> SpotterError {
    SpotterError::database("connection reset").with_source(rusqlite::Error::QueryReturnedNoRows)
}

/// In-memory store with failure injection.
#[derive(Default)]
struct MemoryStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    next_id: u64,
    rows: HashMap<u64, WorkoutSessionDetail>,
    create_calls: usize,
    updates: Vec<(u64, SetValues)>,
    /// Creates that commit and then report a transient error
    lose_create_responses: usize,
    /// Updates that fail transiently without committing
    fail_updates: usize,
    reject_deletes: bool,
    /// Latency of every create call
    create_delay: Duration,
}

impl MemoryStore {
    fn with<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn rows(&self) -> usize {
        self.with(|s| s.rows.len())
    }
}

#[async_trait]
impl WorkoutStore for MemoryStore {
    async fn create_set(&self, request: &LogSet) -> Result<WorkoutSessionDetail> {
        let delay = self.with(|s| s.create_delay);
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.with(|s| {
            s.create_calls += 1;
            if let Some(existing) = s.rows.values().find(|d| d.client_ref == request.client_ref) {
                return Ok(existing.clone());
            }
            s.next_id += 1;
            let detail = WorkoutSessionDetail {
                id: s.next_id,
                log_id: request.log_id,
                client_ref: request.client_ref.clone(),
                exercise_name: request.exercise_name.clone(),
                set_number: request.set_number,
                reps: request.values.reps,
                weight: request.values.weight,
                workout_volume: request.values.volume(),
                coach_note: request.values.notes.clone(),
                order_marker: format!("a{}", s.next_id),
                entry_time: Timestamp::UNIX_EPOCH,
            };
            s.rows.insert(detail.id, detail.clone());
            if s.lose_create_responses > 0 {
                s.lose_create_responses -= 1;
                return Err(transient());
            }
            Ok(detail)
        })
    }

    async fn update_set(&self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail> {
        self.with(|s| {
            if s.fail_updates > 0 {
                s.fail_updates -= 1;
                return Err(transient());
            }
            s.updates.push((detail_id, values.clone()));
            let row = s
                .rows
                .get_mut(&detail_id)
                .ok_or_else(|| SpotterError::not_found(spotter_core::Entity::SetDetail, detail_id))?;
            row.reps = values.reps;
            row.weight = values.weight;
            row.coach_note = values.notes.clone();
            row.workout_volume = values.volume();
            Ok(row.clone())
        })
    }

    async fn delete_set(&self, detail_id: u64) -> Result<()> {
        self.with(|s| {
            if s.reject_deletes {
                return Err(SpotterError::invalid_input("detail_id").with_reason("locked"));
            }
            s.rows.remove(&detail_id);
            Ok(())
        })
    }

    async fn end_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        let mut log = empty_log();
        log.id = log_id;
        log.end_time = Some(Timestamp::UNIX_EPOCH);
        Ok(log)
    }

    async fn abandon_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        let mut log = empty_log();
        log.id = log_id;
        Ok(log)
    }
}

fn empty_log() -> WorkoutSessionLog {
    WorkoutSessionLog {
        id: 1,
        client_ref: "log-1".to_string(),
        user_id: 1,
        session_name: "Push".to_string(),
        start_time: Timestamp::UNIX_EPOCH,
        end_time: None,
        details: Vec::new(),
    }
}

fn config() -> TrackerConfig {
    TrackerConfig::default()
        .with_debounce(Duration::from_secs(3))
        .with_retry(RetryPolicy {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            max_attempts: 3,
        })
}

fn open(store: &Arc<MemoryStore>) -> WorkoutTracker {
    WorkoutTracker::open(store.clone(), empty_log(), config()).expect("Failed to open tracker")
}

fn reps(n: u32) -> SetValues {
    SetValues {
        reps: Some(n),
        weight: Some(100.0),
        notes: None,
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SaveEvent>) -> Vec<SaveEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_debounced_edits_collapse_into_one_update() {
    let store = Arc::new(MemoryStore::default());
    let tracker = open(&store);

    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    sleep(Duration::from_secs(4)).await;
    assert_eq!(store.with(|s| s.create_calls), 1);
    let server_id = tracker.sets().await[0].server_id.expect("created");

    for n in [6, 7, 8] {
        tracker.edit_reps(id, Some(n)).await.unwrap();
        sleep(Duration::from_secs(1)).await;
    }
    assert!(store.with(|s| s.updates.is_empty()));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(store.with(|s| s.updates.clone()), vec![(server_id, reps(8))]);
    let set = &tracker.sets().await[0];
    assert_eq!(set.confirmed, Some(reps(8)));
    assert_eq!(set.fields.reps, FieldState::Clean);
    assert!(tracker.is_settled().await);
}

#[tokio::test(start_paused = true)]
async fn test_lost_create_response_is_retried_without_duplicate() {
    let store = Arc::new(MemoryStore::default());
    store.with(|s| s.lose_create_responses = 1);
    let tracker = open(&store);
    let mut events = tracker.subscribe();

    tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    sleep(Duration::from_secs(3) + Duration::from_millis(10)).await;

    let first = drain_events(&mut events);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, OperationStatus::Pending);
    assert!(tracker.sets().await[0].server_id.is_none());

    sleep(Duration::from_secs(2)).await;
    let second = drain_events(&mut events);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].kind, OperationKind::Create);
    assert_eq!(second[0].status, OperationStatus::Succeeded);
    assert_eq!(second[0].attempts, 2);

    assert_eq!(store.rows(), 1);
    assert_eq!(store.with(|s| s.create_calls), 2);
    let row_id = store.with(|s| *s.rows.keys().next().unwrap());
    assert_eq!(tracker.sets().await[0].server_id, Some(row_id));
}

#[tokio::test(start_paused = true)]
async fn test_delete_after_lost_create_response_removes_row() {
    let store = Arc::new(MemoryStore::default());
    store.with(|s| s.lose_create_responses = 1);
    let tracker = open(&store);

    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    // The create commits but its response is lost; a retry is in backoff.
    sleep(Duration::from_secs(3) + Duration::from_millis(10)).await;
    assert_eq!(store.rows(), 1);
    assert!(tracker.sets().await[0].server_id.is_none());

    tracker.delete_set(id).await.unwrap();
    assert!(tracker.sets().await.is_empty());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(store.rows(), 0);
    assert_eq!(store.with(|s| s.create_calls), 2);
    assert!(tracker.sets().await.is_empty());
    assert!(tracker.operations().await.is_empty());
    assert!(tracker.is_settled().await);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_slow_save_now_is_saved() {
    let store = Arc::new(MemoryStore::default());
    store.with(|s| s.create_delay = Duration::from_secs(5));
    let tracker = open(&store);

    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    let edit = async {
        sleep(Duration::from_secs(1)).await;
        tracker.edit_reps(id, Some(9)).await.unwrap();
    };
    tokio::join!(tracker.save_now(), edit);

    sleep(Duration::from_secs(60)).await;
    let server_id = tracker.sets().await[0].server_id.expect("created");
    assert_eq!(store.with(|s| s.updates.clone()), vec![(server_id, reps(9))]);
    let set = &tracker.sets().await[0];
    assert_eq!(set.confirmed, Some(reps(9)));
    assert_eq!(set.fields.reps, FieldState::Clean);
    assert!(tracker.is_settled().await);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_delete_restores_set() {
    let store = Arc::new(MemoryStore::default());
    let tracker = open(&store);
    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    sleep(Duration::from_secs(4)).await;

    store.with(|s| s.reject_deletes = true);
    tracker.delete_set(id).await.unwrap();
    assert!(tracker.sets().await.is_empty());

    sleep(Duration::from_millis(10)).await;
    let sets = tracker.sets().await;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].local_id, id);
    assert_eq!(store.rows(), 1);
    assert!(tracker.operations().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_update_waits_for_manual_retry() {
    let store = Arc::new(MemoryStore::default());
    let tracker = open(&store);
    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();
    sleep(Duration::from_secs(4)).await;

    store.with(|s| s.fail_updates = 3);
    tracker.edit_weight(id, Some(120.0)).await.unwrap();
    // Debounce, then attempts at +0s, +1s and +3s.
    sleep(Duration::from_secs(10)).await;

    let ops = tracker.operations().await;
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].status, OperationStatus::Failed);
    assert_eq!(ops[0].attempts, 3);
    assert_eq!(tracker.sets().await[0].fields.weight, FieldState::Failed);
    assert!(store.with(|s| s.updates.is_empty()));

    assert_eq!(tracker.retry_failed().await, 1);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(store.with(|s| s.updates.len()), 1);
    assert_eq!(tracker.sets().await[0].fields.weight, FieldState::Clean);
    assert!(tracker.is_settled().await);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_set_and_bad_weight_are_rejected() {
    let store = Arc::new(MemoryStore::default());
    let tracker = open(&store);
    let id = tracker.add_set("Squat", 1, reps(5)).await.unwrap();

    assert!(tracker.edit_weight(id, Some(f64::NAN)).await.is_err());
    tracker.delete_set(id).await.unwrap();
    assert!(tracker.edit_reps(id, Some(1)).await.is_err());
    // Never reached the server.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(store.with(|s| s.create_calls), 0);
}

/// Wraps the real planner and drops the first create response after commit.
struct LossyPlanner {
    planner: Planner,
    dropped: Mutex<bool>,
}

#[async_trait]
impl WorkoutStore for LossyPlanner {
    async fn create_set(&self, request: &LogSet) -> Result<WorkoutSessionDetail> {
        let detail = self.planner.create_set(request).await?;
        let mut dropped = self.dropped.lock().unwrap();
        if !*dropped {
            *dropped = true;
            return Err(transient());
        }
        Ok(detail)
    }

    async fn update_set(&self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail> {
        WorkoutStore::update_set(&self.planner, detail_id, values).await
    }

    async fn delete_set(&self, detail_id: u64) -> Result<()> {
        WorkoutStore::delete_set(&self.planner, detail_id).await
    }

    async fn end_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.planner.end_log(log_id).await
    }

    async fn abandon_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.planner.abandon_log(log_id).await
    }
}

fn start_params() -> StartSessionLog {
    StartSessionLog {
        client_ref: "log-1".to_string(),
        user_id: 1,
        session_name: "Push".to_string(),
    }
}

#[tokio::test]
async fn test_finish_persists_sets_once() {
    let (_temp_dir, planner) = create_test_planner().await;
    let log = planner.create_session_log(&start_params()).await.unwrap();
    let store = Arc::new(LossyPlanner {
        planner: planner.clone(),
        dropped: Mutex::new(false),
    });
    let config = config().with_retry(RetryPolicy {
        base_delay: Duration::ZERO,
        ..RetryPolicy::default()
    });
    let tracker = WorkoutTracker::open(store, log, config).unwrap();

    let bench = tracker.add_set("Bench Press", 1, reps(5)).await.unwrap();
    tracker.edit_notes(bench, Some("paused reps".to_string())).await.unwrap();
    tracker.add_set("Bench Press", 2, reps(4)).await.unwrap();

    let ended = tracker.finish().await.unwrap();
    assert!(ended.end_time.is_some());
    assert_eq!(ended.details.len(), 2);
    assert_eq!(ended.details[0].coach_note.as_deref(), Some("paused reps"));
    assert_eq!(ended.details[0].workout_volume, Some(500.0));
    assert!(ended.details[0].order_marker < ended.details[1].order_marker);
}

#[tokio::test]
async fn test_start_resumes_and_abandon_discards() {
    let (_temp_dir, planner) = create_test_planner().await;

    let tracker = WorkoutTracker::start(&planner, &start_params(), TrackerConfig::default())
        .await
        .unwrap();
    tracker.add_set("Squat", 1, reps(3)).await.unwrap();
    assert_eq!(tracker.save_now().await, 1);
    let log_id = tracker.log_id();
    drop(tracker);

    let resumed = WorkoutTracker::start(&planner, &start_params(), TrackerConfig::default())
        .await
        .unwrap();
    assert_eq!(resumed.log_id(), log_id);
    let sets = resumed.sets().await;
    assert_eq!(sets.len(), 1);
    assert!(!sets[0].is_new());

    resumed.abandon().await.unwrap();
    assert!(planner.get_session_log(log_id).await.unwrap().is_none());
}
