//! Tests for the planner module.

use std::sync::Arc;

use tempfile::TempDir;

use super::*;
use crate::{
    models::PrescriptionRange,
    params::{
        CreatePlan, ExerciseDraft, PhaseDraft, PhaseInput, PhaseUpdate, PlanDraft, SessionDraft,
    },
    queue::{InMemoryJobQueue, JobStatus, MessageType},
    stamp::VersionStamp,
};

async fn create_test_planner() -> (TempDir, Planner) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let planner = PlannerBuilder::new()
        .with_database_path(Some(&db_path))
        .build()
        .await
        .expect("Failed to create planner");
    (temp_dir, planner)
}

async fn create_plan(planner: &Planner) -> crate::models::Plan {
    planner
        .create_plan(&CreatePlan {
            client_id: 11,
            title: "Hypertrophy".to_string(),
        })
        .await
        .into_result()
        .expect("Failed to create plan")
}

fn phase(name: &str) -> PhaseInput {
    PhaseInput {
        name: name.to_string(),
        notes: None,
    }
}

#[tokio::test]
async fn test_mutation_publishes_invalidation() {
    let (_temp_dir, planner) = create_test_planner().await;
    let mut invalidations = planner.invalidations();

    let plan = create_plan(&planner).await;
    let created = invalidations.recv().await.expect("plan create invalidation");
    assert_eq!(created.plan_id, plan.id);
    assert_eq!(created.client_id, 11);

    let outcome = planner
        .create_phase(plan.id, &phase("Base"), Some(plan.updated_at))
        .await;
    assert!(outcome.success);
    let event = invalidations.recv().await.expect("phase create invalidation");
    assert_eq!(Some(event.updated_at), outcome.updated_at);
    assert!(event.updated_at > plan.updated_at);
}

#[tokio::test]
async fn test_conflict_is_reported_without_invalidation() {
    let (_temp_dir, planner) = create_test_planner().await;
    let plan = create_plan(&planner).await;
    let stale = plan.updated_at;

    let first = planner
        .create_phase(plan.id, &phase("Base"), Some(stale))
        .await;
    assert!(first.success);

    let mut invalidations = planner.invalidations();
    let second = planner
        .create_phase(plan.id, &phase("Peak"), Some(stale))
        .await;
    assert!(!second.success);
    assert!(second.conflict);
    assert_eq!(second.plan_id, Some(plan.id));
    assert_eq!(second.server_updated_at, first.updated_at);
    assert_eq!(second.failure_kind(), Some(FailureKind::Conflict));
    assert!(invalidations.try_recv().is_err());

    let stored = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert_eq!(stored.phases.len(), 1);
    assert_eq!(Some(stored.updated_at), first.updated_at);
}

#[tokio::test]
async fn test_missing_token_skips_the_check() {
    let (_temp_dir, planner) = create_test_planner().await;
    let plan = create_plan(&planner).await;

    planner.create_phase(plan.id, &phase("A"), None).await;
    let outcome = planner.create_phase(plan.id, &phase("B"), None).await;
    assert!(outcome.success);
}

#[tokio::test]
async fn test_phase_lifecycle() {
    let (_temp_dir, planner) = create_test_planner().await;
    let plan = create_plan(&planner).await;

    let base = planner
        .create_phase(plan.id, &phase("Base"), None)
        .await
        .into_result()
        .unwrap();
    let updated = planner
        .update_phase(
            base.id,
            &PhaseUpdate {
                name: Some("Base v2".to_string()),
                notes: Some(Some("Lower volume".to_string())),
            },
            None,
        )
        .await
        .into_result()
        .unwrap();
    assert_eq!(updated.name, "Base v2");

    let copy = planner
        .duplicate_phase(base.id, None)
        .await
        .into_result()
        .unwrap();
    assert_ne!(copy.id, base.id);
    assert!(!copy.is_active);

    let activated = planner.activate_phase(copy.id, None).await;
    assert!(activated.success);
    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert_eq!(tree.active_phase().map(|p| p.id), Some(copy.id));

    planner.deactivate_phase(copy.id, None).await;
    let tree = planner.get_plan(plan.id).await.unwrap().unwrap();
    assert!(tree.active_phase().is_none());

    let deleted = planner.delete_phase(base.id, None).await;
    assert!(deleted.success);
    assert!(planner.get_phase(base.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_not_found_outcome() {
    let (_temp_dir, planner) = create_test_planner().await;
    let outcome = planner.delete_phase(404, None).await;
    assert!(!outcome.success);
    assert!(!outcome.conflict);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::NotFound));
}

#[tokio::test]
async fn test_replace_plan_rewrites_tree() {
    let (_temp_dir, planner) = create_test_planner().await;
    let plan = create_plan(&planner).await;
    planner.create_phase(plan.id, &phase("Old"), None).await;

    let draft = PlanDraft {
        phases: vec![PhaseDraft {
            name: "Imported".to_string(),
            notes: None,
            is_active: true,
            sessions: vec![SessionDraft {
                name: "Legs".to_string(),
                duration_minutes: Some(50),
                exercises: vec![ExerciseDraft {
                    exercise_id: 1,
                    exercise_name: "Squat".to_string(),
                    sets: PrescriptionRange::exactly(5),
                    reps: PrescriptionRange::exactly(5),
                    rest_seconds: PrescriptionRange::new(120, 180).unwrap(),
                    customizations: None,
                }],
            }],
        }],
    };

    let replaced = planner
        .replace_plan(plan.id, &draft, None)
        .await
        .into_result()
        .unwrap();
    assert_eq!(replaced.phases.len(), 1);
    assert_eq!(replaced.phases[0].name, "Imported");
    assert_eq!(replaced.phases[0].sessions[0].exercises[0].exercise_name, "Squat");
}

#[tokio::test]
async fn test_submissions_need_a_queue() {
    let (_temp_dir, planner) = create_test_planner().await;
    let err = planner
        .submit_phase_duplicate(1, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::QueueSubmissionFailure);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_mutation_records_user_action() {
    let temp_dir = TempDir::new().unwrap();
    let queue = Arc::new(InMemoryJobQueue::default());
    let planner = PlannerBuilder::new()
        .with_database_path(Some(temp_dir.path().join("test.db")))
        .with_job_queue(queue.clone())
        .build()
        .await
        .unwrap();

    create_plan(&planner).await;

    let jobs = queue.snapshots().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].message_type, MessageType::UserAction);
    assert_eq!(jobs[0].status, JobStatus::Queued);
}

#[tokio::test]
async fn test_plan_stamp_tracks_mutations() {
    let (_temp_dir, planner) = create_test_planner().await;
    let plan = create_plan(&planner).await;
    assert_eq!(planner.plan_stamp(plan.id).await.unwrap(), plan.updated_at);

    let outcome = planner.create_phase(plan.id, &phase("Base"), None).await;
    let stamp: VersionStamp = planner.plan_stamp(plan.id).await.unwrap();
    assert_eq!(Some(stamp), outcome.updated_at);
}
