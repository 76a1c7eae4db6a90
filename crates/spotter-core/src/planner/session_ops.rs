//! Session and plan exercise operations for the Planner.

use super::Planner;
use crate::{
    error::Result,
    models::{PlanExercise, Session},
    outcome::MutationOutcome,
    params::{ReorderSessions, SaveExercise, SessionInput, SessionUpdate},
    stamp::VersionStamp,
};

impl Planner {
    pub async fn get_session(&self, session_id: u64) -> Result<Option<Session>> {
        self.with_db(move |db| db.get_session(session_id)).await
    }

    pub async fn create_session(
        &self,
        phase_id: u64,
        input: &SessionInput,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Session> {
        let input = input.clone();
        self.mutate("session_create", move |db| {
            db.create_session(phase_id, &input, last_known.as_ref())
        })
        .await
    }

    pub async fn update_session(
        &self,
        session_id: u64,
        update: &SessionUpdate,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Session> {
        let update = update.clone();
        self.mutate("session_update", move |db| {
            db.update_session(session_id, &update, last_known.as_ref())
        })
        .await
    }

    pub async fn delete_session(
        &self,
        session_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Session> {
        self.mutate("session_delete", move |db| {
            db.delete_session(session_id, last_known.as_ref())
        })
        .await
    }

    pub async fn duplicate_session(
        &self,
        session_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Session> {
        self.mutate("session_duplicate", move |db| {
            db.duplicate_session(session_id, last_known.as_ref())
        })
        .await
    }

    /// Reorders all sessions of a phase; returns them in their new order.
    pub async fn reorder_sessions(
        &self,
        request: &ReorderSessions,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<Vec<Session>> {
        let request = request.clone();
        self.mutate("session_reorder", move |db| {
            db.reorder_sessions(&request, last_known.as_ref())
        })
        .await
    }

    pub async fn get_plan_exercise(&self, exercise_id: u64) -> Result<Option<PlanExercise>> {
        self.with_db(move |db| db.get_plan_exercise(exercise_id)).await
    }

    /// Creates or edits a plan exercise.
    pub async fn save_plan_exercise(
        &self,
        save: &SaveExercise,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<PlanExercise> {
        let save = save.clone();
        self.mutate("exercise_save", move |db| {
            db.save_plan_exercise(&save, last_known.as_ref())
        })
        .await
    }

    pub async fn delete_plan_exercise(
        &self,
        exercise_id: u64,
        last_known: Option<VersionStamp>,
    ) -> MutationOutcome<PlanExercise> {
        self.mutate("exercise_delete", move |db| {
            db.delete_plan_exercise(exercise_id, last_known.as_ref())
        })
        .await
    }
}
