//! Phase operations: create, edit, delete, duplicate, activate.

use rusqlite::{params, Connection, OptionalExtension};

use super::{check_owner, check_plan, plan_queries, session_queries, Stamped};
use crate::{
    error::{DatabaseResultExt, Entity, Result},
    models::Phase,
    params::{PhaseDraft, PhaseInput, PhaseUpdate},
    stamp::VersionStamp,
};

const SELECT_PHASE_PLAN_SQL: &str = "SELECT plan_id FROM phases WHERE id = ?1";
const SELECT_PHASE_SQL: &str =
    "SELECT id, plan_id, name, notes, position, is_active FROM phases WHERE id = ?1";
const SELECT_PHASES_BY_PLAN_SQL: &str =
    "SELECT id, plan_id, name, notes, position, is_active FROM phases WHERE plan_id = ?1 ORDER BY position, id";
const COUNT_PHASES_SQL: &str = "SELECT COUNT(*) FROM phases WHERE plan_id = ?1";
const INSERT_PHASE_SQL: &str =
    "INSERT INTO phases (plan_id, name, notes, position, is_active) VALUES (?1, ?2, ?3, ?4, ?5)";
const UPDATE_PHASE_SQL: &str = "UPDATE phases SET name = ?1, notes = ?2 WHERE id = ?3";
const DELETE_PHASE_SQL: &str = "DELETE FROM phases WHERE id = ?1";
const SHIFT_PHASES_DOWN_SQL: &str =
    "UPDATE phases SET position = position - 1 WHERE plan_id = ?1 AND position > ?2";
const ACTIVATE_PHASE_SQL: &str = "UPDATE phases SET is_active = 1 WHERE id = ?1";
const DEACTIVATE_OTHER_PHASES_SQL: &str =
    "UPDATE phases SET is_active = 0 WHERE plan_id = ?1 AND id != ?2 AND is_active = 1";
const DEACTIVATE_PHASE_SQL: &str = "UPDATE phases SET is_active = 0 WHERE id = ?1";

fn build_phase_from_row(row: &rusqlite::Row) -> rusqlite::Result<Phase> {
    Ok(Phase {
        id: row.get::<_, i64>(0)? as u64,
        plan_id: row.get::<_, i64>(1)? as u64,
        name: row.get(2)?,
        notes: row.get(3)?,
        position: row.get::<_, i64>(4)? as u32,
        is_active: row.get(5)?,
        sessions: Vec::new(),
    })
}

/// Loads the phases of a plan ordered by position (without sessions).
pub(crate) fn load_phases(conn: &Connection, plan_id: u64) -> Result<Vec<Phase>> {
    let mut stmt = conn
        .prepare(SELECT_PHASES_BY_PLAN_SQL)
        .db_context("Failed to prepare query")?;

    let phases = stmt
        .query_map(params![plan_id as i64], build_phase_from_row)
        .db_context("Failed to query phases")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch phases")?;

    Ok(phases)
}

/// Loads one phase with its sessions and exercises.
pub(crate) fn load_phase(conn: &Connection, phase_id: u64) -> Result<Phase> {
    let mut phase = conn
        .query_row(SELECT_PHASE_SQL, params![phase_id as i64], build_phase_from_row)
        .or_not_found(Entity::Phase, phase_id, "Failed to load phase")?;
    phase.sessions = session_queries::load_sessions_with_exercises(conn, phase.id)?;
    Ok(phase)
}

pub(crate) fn insert_phase_row(
    conn: &Connection,
    plan_id: u64,
    name: &str,
    notes: Option<&str>,
    position: u32,
    is_active: bool,
) -> Result<u64> {
    conn.execute(
        INSERT_PHASE_SQL,
        params![plan_id as i64, name, notes, position as i64, is_active],
    )
    .db_context("Failed to insert phase")?;
    Ok(conn.last_insert_rowid() as u64)
}

fn next_phase_position(conn: &Connection, plan_id: u64) -> Result<u32> {
    let count: i64 = conn
        .query_row(COUNT_PHASES_SQL, params![plan_id as i64], |row| row.get(0))
        .db_context("Failed to count phases")?;
    Ok(count as u32)
}

impl super::Database {
    /// Retrieves a phase with its sessions and exercises.
    pub fn get_phase(&self, phase_id: u64) -> Result<Option<Phase>> {
        let exists = self
            .connection
            .query_row(SELECT_PHASE_PLAN_SQL, params![phase_id as i64], |_| Ok(()))
            .optional()
            .db_context("Failed to query phase")?;
        match exists {
            Some(()) => load_phase(&self.connection, phase_id).map(Some),
            None => Ok(None),
        }
    }

    /// Appends a new, inactive phase to a plan.
    pub fn create_phase(
        &mut self,
        plan_id: u64,
        input: &PhaseInput,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        input.validate()?;

        let tx = self.begin_write()?;
        let plan = check_plan(&tx, plan_id, last_known)?;

        let position = next_phase_position(&tx, plan_id)?;
        let id = insert_phase_row(
            &tx,
            plan_id,
            &input.name,
            input.notes.as_deref(),
            position,
            false,
        )?;

        let stamped = plan.bump(&tx, ())?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| Phase {
            id,
            plan_id,
            name: input.name.clone(),
            notes: input.notes.clone(),
            position,
            is_active: false,
            sessions: Vec::new(),
        }))
    }

    /// Edits a phase's name and notes.
    pub fn update_phase(
        &mut self,
        phase_id: u64,
        update: &PhaseUpdate,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        update.validate()?;

        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        let current = load_phase(&tx, phase_id)?;
        let name = update.name.clone().unwrap_or(current.name);
        let notes = update.notes.clone().unwrap_or(current.notes);

        tx.execute(UPDATE_PHASE_SQL, params![&name, &notes, phase_id as i64])
            .db_context("Failed to update phase")?;

        let stamped = plan.bump(&tx, ())?;
        let phase = load_phase(&tx, phase_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| phase))
    }

    /// Deletes a phase with its sessions and exercises and closes the gap in
    /// the remaining positions. Returns the deleted phase.
    pub fn delete_phase(
        &mut self,
        phase_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        let phase = load_phase(&tx, phase_id)?;

        tx.execute(DELETE_PHASE_SQL, params![phase_id as i64])
            .db_context("Failed to delete phase")?;
        tx.execute(
            SHIFT_PHASES_DOWN_SQL,
            params![plan.plan_id as i64, phase.position as i64],
        )
        .db_context("Failed to update phase positions")?;

        let stamped = plan.bump(&tx, ())?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| phase))
    }

    /// Copies a phase with all sessions and exercises to the end of its plan.
    ///
    /// The copy is never active, regardless of the source.
    pub fn duplicate_phase(
        &mut self,
        phase_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        let source = load_phase(&tx, phase_id)?;
        let position = next_phase_position(&tx, plan.plan_id)?;
        let copy_id = insert_phase_row(
            &tx,
            plan.plan_id,
            &format!("{} (copy)", source.name),
            source.notes.as_deref(),
            position,
            false,
        )?;

        let session_ids = session_queries::session_ids(&tx, phase_id)?;
        for (pos, session_id) in session_ids.into_iter().enumerate() {
            session_queries::copy_session(&tx, session_id, copy_id, pos as u32, None)?;
        }

        let stamped = plan.bump(&tx, ())?;
        let copy = load_phase(&tx, copy_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| copy))
    }

    /// Appends a complete phase tree to the end of a plan, inactive.
    ///
    /// Applies a phase snapshot taken earlier, e.g. by a queued duplicate.
    pub fn append_phase(
        &mut self,
        plan_id: u64,
        draft: &PhaseDraft,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        draft.validate()?;

        let tx = self.begin_write()?;
        let plan = check_plan(&tx, plan_id, last_known)?;

        let position = next_phase_position(&tx, plan_id)?;
        let id = plan_queries::insert_phase_draft(&tx, plan_id, draft, position, false)?;

        let stamped = plan.bump(&tx, ())?;
        let phase = load_phase(&tx, id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| phase))
    }

    /// Makes `phase_id` the single active phase of its plan.
    ///
    /// Statement order is fixed: activate the target, deactivate every
    /// sibling, advance the stamp. All three run in one transaction, so an
    /// interruption can never leave two phases active.
    pub fn activate_phase(
        &mut self,
        phase_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        tx.execute(ACTIVATE_PHASE_SQL, params![phase_id as i64])
            .db_context("Failed to activate phase")?;
        tx.execute(
            DEACTIVATE_OTHER_PHASES_SQL,
            params![plan.plan_id as i64, phase_id as i64],
        )
        .db_context("Failed to deactivate sibling phases")?;

        let stamped = plan.bump(&tx, ())?;
        let phase = load_phase(&tx, phase_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| phase))
    }

    /// Clears the active flag of a phase, leaving the plan without an active
    /// phase.
    pub fn deactivate_phase(
        &mut self,
        phase_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Phase>> {
        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        tx.execute(DEACTIVATE_PHASE_SQL, params![phase_id as i64])
            .db_context("Failed to deactivate phase")?;

        let stamped = plan.bump(&tx, ())?;
        let phase = load_phase(&tx, phase_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| phase))
    }
}
