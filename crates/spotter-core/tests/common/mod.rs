#![allow(dead_code)]

use spotter_core::{
    params::{CreatePlan, PhaseInput, SessionInput},
    Phase, Plan, Planner, PlannerBuilder, Session,
};
use tempfile::TempDir;

/// Helper function to create a test planner
pub async fn create_test_planner() -> (TempDir, Planner) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");
    let planner = PlannerBuilder::new()
        .with_database_path(Some(&db_path))
        .build()
        .await
        .expect("Failed to create planner");
    (temp_dir, planner)
}

/// A plan with one phase holding sessions named after `sessions`.
pub async fn seed_plan(planner: &Planner, sessions: &[&str]) -> (Plan, Phase, Vec<Session>) {
    let plan = planner
        .create_plan(&CreatePlan {
            client_id: 1,
            title: "Seed".to_string(),
        })
        .await
        .into_result()
        .expect("Failed to create plan");
    let phase = planner
        .create_phase(
            plan.id,
            &PhaseInput {
                name: "Base".to_string(),
                notes: None,
            },
            None,
        )
        .await
        .into_result()
        .expect("Failed to create phase");

    let mut created = Vec::new();
    for name in sessions {
        let session = planner
            .create_session(
                phase.id,
                &SessionInput {
                    name: (*name).to_string(),
                    duration_minutes: None,
                },
                None,
            )
            .await
            .into_result()
            .expect("Failed to create session");
        created.push(session);
    }

    let plan = planner
        .get_plan(plan.id)
        .await
        .expect("Failed to load plan")
        .expect("Plan missing");
    (plan, phase, created)
}
