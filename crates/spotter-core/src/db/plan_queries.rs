//! Plan CRUD operations, tree loading and full-plan rewrites.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{
    check_plan, exercise_queries, parse_stamp, parse_timestamp, phase_queries, session_queries,
    Stamped,
};
use crate::{
    error::{DatabaseResultExt, Result},
    models::{Phase, Plan},
    ordering,
    params::{CreatePlan, ExerciseDraft, PhaseDraft, PlanDraft},
    stamp::VersionStamp,
};

const INSERT_PLAN_SQL: &str =
    "INSERT INTO plans (client_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)";
const SELECT_PLAN_SQL: &str =
    "SELECT id, client_id, title, created_at, updated_at FROM plans WHERE id = ?1";
const SELECT_PLANS_SQL: &str =
    "SELECT id, client_id, title, created_at, updated_at FROM plans ORDER BY id";
const SELECT_PLANS_BY_CLIENT_SQL: &str =
    "SELECT id, client_id, title, created_at, updated_at FROM plans WHERE client_id = ?1 ORDER BY id";
const DELETE_PLAN_PHASES_SQL: &str = "DELETE FROM phases WHERE plan_id = ?1";

impl super::Database {
    fn build_plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
        Ok(Plan {
            id: row.get::<_, i64>(0)? as u64,
            client_id: row.get::<_, i64>(1)? as u64,
            title: row.get(2)?,
            created_at: parse_timestamp(row, 3)?,
            updated_at: parse_stamp(row, 4)?,
            phases: Vec::new(),
        })
    }

    /// Creates a new plan for a client with a fresh version stamp.
    pub fn create_plan(&mut self, params: &CreatePlan) -> Result<Plan> {
        params.validate()?;

        let tx = self.begin_write()?;

        let created_at = Timestamp::now();
        let stamp = VersionStamp::from_timestamp(created_at);

        tx.execute(
            INSERT_PLAN_SQL,
            params![
                params.client_id as i64,
                &params.title,
                created_at.to_string(),
                stamp.to_storage()
            ],
        )
        .db_context("Failed to insert plan")?;

        let id = tx.last_insert_rowid() as u64;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(Plan {
            id,
            client_id: params.client_id,
            title: params.title.clone(),
            created_at,
            updated_at: stamp,
            phases: Vec::new(),
        })
    }

    /// Retrieves a plan with its phases, sessions and exercises.
    pub fn get_plan(&self, id: u64) -> Result<Option<Plan>> {
        let plan = self
            .connection
            .query_row(SELECT_PLAN_SQL, params![id as i64], Self::build_plan_from_row)
            .optional()
            .db_context("Failed to query plan")?;

        match plan {
            Some(mut plan) => {
                plan.phases = load_plan_tree(&self.connection, plan.id)?;
                Ok(Some(plan))
            }
            None => Ok(None),
        }
    }

    /// Lists plans (without their trees), optionally for one client.
    pub fn list_plans(&self, client_id: Option<u64>) -> Result<Vec<Plan>> {
        let (sql, args): (&str, Vec<i64>) = match client_id {
            Some(client_id) => (SELECT_PLANS_BY_CLIENT_SQL, vec![client_id as i64]),
            None => (SELECT_PLANS_SQL, Vec::new()),
        };

        let mut stmt = self
            .connection
            .prepare(sql)
            .db_context("Failed to prepare query")?;

        let plans = stmt
            .query_map(rusqlite::params_from_iter(args), Self::build_plan_from_row)
            .db_context("Failed to query plans")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .db_context("Failed to fetch plans")?;

        Ok(plans)
    }

    /// Replaces the whole content of a plan with `draft`.
    ///
    /// Used for imports and bulk rewrites. Existing phases (and through the
    /// cascade their sessions and exercises) are deleted and the draft is
    /// inserted in order, all inside one transaction with a single stamp bump.
    pub fn replace_plan(
        &mut self,
        plan_id: u64,
        draft: &PlanDraft,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Plan>> {
        draft.validate()?;

        let tx = self.begin_write()?;
        let plan = check_plan(&tx, plan_id, last_known)?;

        tx.execute(DELETE_PLAN_PHASES_SQL, params![plan_id as i64])
            .db_context("Failed to delete existing phases")?;

        for (phase_pos, phase) in draft.phases.iter().enumerate() {
            insert_phase_draft(&tx, plan_id, phase, phase_pos as u32, phase.is_active)?;
        }

        let stamped = plan.bump(&tx, ())?;

        let mut result = tx
            .query_row(SELECT_PLAN_SQL, params![plan_id as i64], Self::build_plan_from_row)
            .db_context("Failed to reload plan")?;
        result.phases = load_plan_tree(&tx, plan_id)?;

        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| result))
    }
}

/// Inserts a phase with its sessions and exercises; returns the phase id.
pub(crate) fn insert_phase_draft(
    conn: &Connection,
    plan_id: u64,
    phase: &PhaseDraft,
    position: u32,
    is_active: bool,
) -> Result<u64> {
    let phase_id = phase_queries::insert_phase_row(
        conn,
        plan_id,
        &phase.name,
        phase.notes.as_deref(),
        position,
        is_active,
    )?;
    for (session_pos, session) in phase.sessions.iter().enumerate() {
        let session_id = session_queries::insert_session_row(
            conn,
            phase_id,
            &session.name,
            session_pos as u32,
            session.duration_minutes,
        )?;
        insert_exercise_drafts(conn, session_id, &session.exercises)?;
    }
    Ok(phase_id)
}

/// Inserts exercises in list order with freshly generated markers.
pub(crate) fn insert_exercise_drafts(
    conn: &Connection,
    session_id: u64,
    exercises: &[ExerciseDraft],
) -> Result<()> {
    let mut last_marker: Option<String> = None;
    for exercise in exercises {
        let marker = ordering::marker_after(last_marker.as_deref())?;
        exercise_queries::insert_exercise_row(conn, session_id, exercise, &marker)?;
        last_marker = Some(marker);
    }
    Ok(())
}

/// Loads all phases of a plan with nested sessions and exercises.
pub(crate) fn load_plan_tree(conn: &Connection, plan_id: u64) -> Result<Vec<Phase>> {
    let mut phases = phase_queries::load_phases(conn, plan_id)?;
    for phase in &mut phases {
        phase.sessions = session_queries::load_sessions_with_exercises(conn, phase.id)?;
    }
    Ok(phases)
}
