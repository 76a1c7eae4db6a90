mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use common::seed_plan;
use spotter_core::{
    params::{ExercisePlacement, PhaseDraft, PhaseInput, PlanDraft, SaveExercise, SessionInput},
    queue::{
        message::{NotificationData, PhaseCreateData, PhaseDuplicateData},
        worker::{drain, run_worker},
        JobHandler, JobStatus, PlanJobHandler,
    },
    InMemoryJobQueue, JobQueue, MessageEnvelope, MessageType, Planner, PlannerBuilder,
    PrescriptionRange, Result, SpotterError, VersionStamp,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn planner_with_queue() -> (TempDir, Planner, Arc<InMemoryJobQueue>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let queue = Arc::new(InMemoryJobQueue::default());
    let planner = PlannerBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_job_queue(queue.clone())
        .build()
        .await
        .expect("Failed to create planner");
    (temp_dir, planner, queue)
}

/// A broker that is down.
struct RefusingQueue;

#[async_trait]
impl JobQueue for RefusingQueue {
    async fn enqueue(
        &self,
        message: MessageEnvelope,
        _options: spotter_core::queue::JobOptions,
    ) -> Result<spotter_core::queue::JobId> {
        Err(SpotterError::QueueSubmission {
            message_type: message.message_type.to_string(),
            reason: "broker unavailable".to_string(),
        })
    }
}

fn phase_create(plan_id: u64, name: &str, last_known: Option<VersionStamp>) -> MessageEnvelope {
    MessageEnvelope::new(
        MessageType::PhaseCreate,
        &PhaseCreateData {
            plan_id,
            last_known,
            phase: PhaseInput {
                name: name.to_string(),
                notes: None,
            },
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_redelivered_message_applies_once() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, _, _) = seed_plan(&planner, &[]).await;
    let handler = PlanJobHandler::new(planner.clone());

    let message = phase_create(plan.id, "Deload", None);
    let options = MessageType::PhaseCreate.default_options();
    queue.enqueue(message.clone(), options.clone()).await.unwrap();
    queue.enqueue(message, options).await.unwrap();
    drain(&queue, &handler).await;

    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    let deloads = tree.phases.iter().filter(|p| p.name == "Deload").count();
    assert_eq!(deloads, 1);
}

#[tokio::test]
async fn test_concurrent_redelivery_applies_once() {
    let (_temp_dir, planner, _queue) = planner_with_queue().await;
    let (plan, _, _) = seed_plan(&planner, &[]).await;
    let handler = PlanJobHandler::new(planner.clone());

    let message = phase_create(plan.id, "Deload", None);
    let (first, second) = tokio::join!(handler.handle(&message), handler.handle(&message));
    assert!(first.is_ok());
    assert!(second.is_ok());

    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    let deloads = tree.phases.iter().filter(|p| p.name == "Deload").count();
    assert_eq!(deloads, 1);
}

#[tokio::test]
async fn test_conflict_at_execution_is_not_retried() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, _, _) = seed_plan(&planner, &[]).await;
    let stale = plan.updated_at;
    planner
        .create_phase(
            plan.id,
            &PhaseInput {
                name: "Concurrent".to_string(),
                notes: None,
            },
            None,
        )
        .await;

    let handler = PlanJobHandler::new(planner.clone());
    let options = MessageType::PhaseCreate.default_options();
    assert!(options.attempts > 1);
    let job = queue
        .enqueue(phase_create(plan.id, "Late", Some(stale)), options)
        .await
        .unwrap();
    drain(&queue, &handler).await;

    let snapshot = queue.snapshot(job).await.unwrap();
    assert_eq!(snapshot.status, JobStatus::Failed);
    assert_eq!(snapshot.attempts_made, 1);
    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert!(tree.phases.iter().all(|p| p.name != "Late"));
}

#[tokio::test]
async fn test_notification_waits_for_duplicate() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, phase, _) = seed_plan(&planner, &["A"]).await;
    let handler = PlanJobHandler::new(planner.clone());

    let duplicate = planner
        .submit_phase_duplicate(phase.id, Some(plan.updated_at), Some(1))
        .await
        .unwrap();
    let notify = planner
        .submit_notification_after(
            duplicate,
            &NotificationData {
                client_id: plan.client_id,
                plan_id: Some(plan.id),
                text: "Your plan has a new phase".to_string(),
            },
        )
        .await
        .unwrap()
        .expect("notification queued");
    assert_eq!(
        queue.snapshot(notify).await.unwrap().status,
        JobStatus::Waiting
    );

    drain(&queue, &handler).await;

    assert_eq!(
        queue.snapshot(duplicate).await.unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(
        queue.snapshot(notify).await.unwrap().status,
        JobStatus::Completed
    );
    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert_eq!(tree.phases.len(), 2);
    assert_eq!(tree.phases[1].sessions.len(), 1);
}

#[tokio::test]
async fn test_phase_duplicate_carries_phase_tree() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, phase, sessions) = seed_plan(&planner, &["A"]).await;
    planner
        .save_plan_exercise(
            &SaveExercise {
                id: None,
                session_id: sessions[0].id,
                exercise_id: 9,
                exercise_name: "Squat".to_string(),
                sets: PrescriptionRange { min: 3, max: 3 },
                reps: PrescriptionRange { min: 5, max: 5 },
                rest_seconds: PrescriptionRange { min: 90, max: 120 },
                customizations: None,
                placement: ExercisePlacement::End,
            },
            None,
        )
        .await
        .into_result()
        .unwrap();

    let job = planner
        .submit_phase_duplicate(phase.id, None, Some(1))
        .await
        .unwrap();
    // Edits after submission are not part of the queued copy.
    planner
        .create_session(
            phase.id,
            &SessionInput {
                name: "B".to_string(),
                duration_minutes: None,
            },
            None,
        )
        .await
        .into_result()
        .unwrap();

    let reserved = queue.reserve().await.unwrap();
    assert_eq!(reserved.id, job);
    let data: PhaseDuplicateData = reserved.envelope.payload().unwrap();
    assert_eq!(data.plan_id, plan.id);
    assert_eq!(data.source_phase_id, phase.id);
    assert_eq!(data.phase.name, "Base (copy)");
    assert_eq!(data.phase.sessions.len(), 1);
    assert_eq!(data.phase.sessions[0].exercises[0].exercise_name, "Squat");

    let handler = PlanJobHandler::new(planner.clone());
    handler.handle(&reserved.envelope).await.unwrap();
    queue.complete(job).await;

    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert_eq!(tree.phases.len(), 2);
    let copy = &tree.phases[1];
    assert_eq!(copy.name, "Base (copy)");
    assert!(!copy.is_active);
    let names: Vec<_> = copy.sessions.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["A"]);
    assert_eq!(copy.sessions[0].exercises.len(), 1);
    assert_eq!(copy.sessions[0].exercises[0].rest_seconds.max, 120);
}

#[tokio::test]
async fn test_duplicate_of_missing_phase_is_rejected_before_queueing() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let before = queue.snapshots().await.len();
    let err = planner
        .submit_phase_duplicate(404, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), spotter_core::FailureKind::NotFound);
    assert_eq!(queue.snapshots().await.len(), before);
}

#[tokio::test]
async fn test_invalid_import_is_rejected_before_queueing() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, _, _) = seed_plan(&planner, &[]).await;
    let before = queue.snapshots().await.len();

    let active = |name: &str| PhaseDraft {
        name: name.to_string(),
        notes: None,
        is_active: true,
        sessions: Vec::new(),
    };
    let draft = PlanDraft {
        phases: vec![active("A"), active("B")],
    };
    assert!(planner
        .submit_plan_import(plan.id, &draft, None, None)
        .await
        .is_err());
    assert_eq!(queue.snapshots().await.len(), before);
}

#[tokio::test]
async fn test_worker_applies_import_in_background() {
    let (_temp_dir, planner, queue) = planner_with_queue().await;
    let (plan, _, _) = seed_plan(&planner, &[]).await;
    let handler = Arc::new(PlanJobHandler::new(planner.clone()));
    let cancel = CancellationToken::new();
    let worker = tokio::spawn(run_worker(queue.clone(), handler, cancel.clone()));

    let draft = PlanDraft {
        phases: vec![PhaseDraft {
            name: "Imported".to_string(),
            notes: None,
            is_active: true,
            sessions: Vec::new(),
        }],
    };
    let job = planner
        .submit_plan_import(plan.id, &draft, Some(plan.updated_at), None)
        .await
        .unwrap();

    let mut status = JobStatus::Queued;
    for _ in 0..100 {
        status = queue.snapshot(job).await.unwrap().status;
        if status == JobStatus::Completed || status == JobStatus::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cancel.cancel();
    worker.await.unwrap();

    assert_eq!(status, JobStatus::Completed);
    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert_eq!(tree.phases.len(), 1);
    assert_eq!(tree.active_phase().map(|p| p.name.as_str()), Some("Imported"));
}

#[tokio::test]
async fn test_refused_notification_is_swallowed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let planner = PlannerBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_job_queue(Arc::new(RefusingQueue))
        .build()
        .await
        .expect("Failed to create planner");
    let (plan, phase, _) = seed_plan(&planner, &["A"]).await;

    let notified = planner
        .submit_notification_after(
            "0190b6f4-0000-7000-8000-000000000001".parse().unwrap(),
            &NotificationData {
                client_id: plan.client_id,
                plan_id: Some(plan.id),
                text: "Ready".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(notified, None);

    let err = planner
        .submit_phase_duplicate(phase.id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, SpotterError::QueueSubmission { .. }));
}
