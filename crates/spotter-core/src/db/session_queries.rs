//! Session operations: create, edit, delete, duplicate, reorder.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use super::{check_owner, exercise_queries, Stamped};
use crate::{
    error::{DatabaseResultExt, Entity, Result, SpotterError},
    models::Session,
    params::{ReorderSessions, SessionInput, SessionUpdate},
    stamp::VersionStamp,
};

const SELECT_PHASE_PLAN_SQL: &str = "SELECT plan_id FROM phases WHERE id = ?1";
const SELECT_SESSION_PLAN_SQL: &str =
    "SELECT p.plan_id FROM sessions s JOIN phases p ON p.id = s.phase_id WHERE s.id = ?1";
const SELECT_SESSION_SQL: &str =
    "SELECT id, phase_id, name, position, duration_minutes FROM sessions WHERE id = ?1";
const SELECT_SESSIONS_BY_PHASE_SQL: &str =
    "SELECT id, phase_id, name, position, duration_minutes FROM sessions WHERE phase_id = ?1 ORDER BY position, id";
const SELECT_SESSION_IDS_SQL: &str =
    "SELECT id FROM sessions WHERE phase_id = ?1 ORDER BY position, id";
const COUNT_SESSIONS_SQL: &str = "SELECT COUNT(*) FROM sessions WHERE phase_id = ?1";
const INSERT_SESSION_SQL: &str =
    "INSERT INTO sessions (phase_id, name, position, duration_minutes) VALUES (?1, ?2, ?3, ?4)";
const UPDATE_SESSION_SQL: &str =
    "UPDATE sessions SET name = ?1, duration_minutes = ?2 WHERE id = ?3";
const UPDATE_SESSION_POSITION_SQL: &str = "UPDATE sessions SET position = ?1 WHERE id = ?2";
const DELETE_SESSION_SQL: &str = "DELETE FROM sessions WHERE id = ?1";
const SHIFT_SESSIONS_DOWN_SQL: &str =
    "UPDATE sessions SET position = position - 1 WHERE phase_id = ?1 AND position > ?2";
const COPY_SESSION_EXERCISES_SQL: &str = "INSERT INTO plan_exercises (session_id, exercise_id, exercise_name, order_marker, sets_min, sets_max, reps_min, reps_max, rest_min, rest_max, customizations) SELECT ?1, exercise_id, exercise_name, order_marker, sets_min, sets_max, reps_min, reps_max, rest_min, rest_max, customizations FROM plan_exercises WHERE session_id = ?2 ORDER BY order_marker";

fn build_session_from_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get::<_, i64>(0)? as u64,
        phase_id: row.get::<_, i64>(1)? as u64,
        name: row.get(2)?,
        position: row.get::<_, i64>(3)? as u32,
        duration_minutes: row.get::<_, Option<i64>>(4)?.map(|d| d as u32),
        exercises: Vec::new(),
    })
}

/// Loads the sessions of a phase ordered by position (without exercises).
pub(crate) fn load_sessions(conn: &Connection, phase_id: u64) -> Result<Vec<Session>> {
    let mut stmt = conn
        .prepare(SELECT_SESSIONS_BY_PHASE_SQL)
        .db_context("Failed to prepare query")?;

    let sessions = stmt
        .query_map(params![phase_id as i64], build_session_from_row)
        .db_context("Failed to query sessions")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch sessions")?;

    Ok(sessions)
}

pub(crate) fn load_sessions_with_exercises(conn: &Connection, phase_id: u64) -> Result<Vec<Session>> {
    let mut sessions = load_sessions(conn, phase_id)?;
    for session in &mut sessions {
        session.exercises = exercise_queries::load_exercises(conn, session.id)?;
    }
    Ok(sessions)
}

/// Loads one session with its exercises.
pub(crate) fn load_session(conn: &Connection, session_id: u64) -> Result<Session> {
    let mut session = conn
        .query_row(
            SELECT_SESSION_SQL,
            params![session_id as i64],
            build_session_from_row,
        )
        .or_not_found(Entity::Session, session_id, "Failed to load session")?;
    session.exercises = exercise_queries::load_exercises(conn, session_id)?;
    Ok(session)
}

/// Session ids of a phase in position order.
pub(crate) fn session_ids(conn: &Connection, phase_id: u64) -> Result<Vec<u64>> {
    let mut stmt = conn
        .prepare(SELECT_SESSION_IDS_SQL)
        .db_context("Failed to prepare query")?;

    let ids = stmt
        .query_map(params![phase_id as i64], |row| {
            row.get::<_, i64>(0).map(|id| id as u64)
        })
        .db_context("Failed to query sessions")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch sessions")?;

    Ok(ids)
}

pub(crate) fn insert_session_row(
    conn: &Connection,
    phase_id: u64,
    name: &str,
    position: u32,
    duration_minutes: Option<u32>,
) -> Result<u64> {
    conn.execute(
        INSERT_SESSION_SQL,
        params![
            phase_id as i64,
            name,
            position as i64,
            duration_minutes.map(i64::from)
        ],
    )
    .db_context("Failed to insert session")?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Copies a session and its exercises (markers included) into `phase_id` at
/// `position`. Returns the new session id.
pub(crate) fn copy_session(
    conn: &Connection,
    source_id: u64,
    phase_id: u64,
    position: u32,
    name: Option<&str>,
) -> Result<u64> {
    let source = conn
        .query_row(
            SELECT_SESSION_SQL,
            params![source_id as i64],
            build_session_from_row,
        )
        .or_not_found(Entity::Session, source_id, "Failed to load session")?;

    let copy_id = insert_session_row(
        conn,
        phase_id,
        name.unwrap_or(&source.name),
        position,
        source.duration_minutes,
    )?;

    conn.execute(
        COPY_SESSION_EXERCISES_SQL,
        params![copy_id as i64, source_id as i64],
    )
    .db_context("Failed to copy session exercises")?;

    Ok(copy_id)
}

fn next_session_position(conn: &Connection, phase_id: u64) -> Result<u32> {
    let count: i64 = conn
        .query_row(COUNT_SESSIONS_SQL, params![phase_id as i64], |row| row.get(0))
        .db_context("Failed to count sessions")?;
    Ok(count as u32)
}

/// Checks that `requested` lists every session of the phase exactly once.
fn validate_permutation(phase_id: u64, current: &[u64], requested: &[u64]) -> Result<()> {
    let mut seen = HashSet::with_capacity(requested.len());
    for id in requested {
        if !seen.insert(*id) {
            return Err(SpotterError::invalid_input("session_ids")
                .with_reason(format!("Session {id} appears more than once")));
        }
    }

    let existing: HashSet<u64> = current.iter().copied().collect();
    if let Some(stranger) = requested.iter().find(|id| !existing.contains(id)) {
        return Err(SpotterError::invalid_input("session_ids")
            .with_reason(format!("Session {stranger} does not belong to phase {phase_id}")));
    }
    if requested.len() != current.len() {
        return Err(SpotterError::invalid_input("session_ids").with_reason(format!(
            "Expected all {} sessions of phase {phase_id}, got {}",
            current.len(),
            requested.len()
        )));
    }
    Ok(())
}

impl super::Database {
    /// Retrieves a session with its exercises.
    pub fn get_session(&self, session_id: u64) -> Result<Option<Session>> {
        let exists = self
            .connection
            .query_row(SELECT_SESSION_PLAN_SQL, params![session_id as i64], |_| Ok(()))
            .optional()
            .db_context("Failed to query session")?;
        match exists {
            Some(()) => load_session(&self.connection, session_id).map(Some),
            None => Ok(None),
        }
    }

    /// Appends a new session to a phase.
    pub fn create_session(
        &mut self,
        phase_id: u64,
        input: &SessionInput,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Session>> {
        input.validate()?;

        let tx = self.begin_write()?;
        let plan = check_owner(&tx, SELECT_PHASE_PLAN_SQL, Entity::Phase, phase_id, last_known)?;

        let position = next_session_position(&tx, phase_id)?;
        let id = insert_session_row(&tx, phase_id, &input.name, position, input.duration_minutes)?;

        let stamped = plan.bump(&tx, ())?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| Session {
            id,
            phase_id,
            name: input.name.clone(),
            position,
            duration_minutes: input.duration_minutes,
            exercises: Vec::new(),
        }))
    }

    /// Edits a session's name and duration.
    pub fn update_session(
        &mut self,
        session_id: u64,
        update: &SessionUpdate,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Session>> {
        update.validate()?;

        let tx = self.begin_write()?;
        let plan = check_owner(
            &tx,
            SELECT_SESSION_PLAN_SQL,
            Entity::Session,
            session_id,
            last_known,
        )?;

        let current = load_session(&tx, session_id)?;
        let name = update.name.clone().unwrap_or(current.name);
        let duration = update.duration_minutes.unwrap_or(current.duration_minutes);

        tx.execute(
            UPDATE_SESSION_SQL,
            params![&name, duration.map(i64::from), session_id as i64],
        )
        .db_context("Failed to update session")?;

        let stamped = plan.bump(&tx, ())?;
        let session = load_session(&tx, session_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| session))
    }

    /// Deletes a session with its exercises and closes the position gap.
    pub fn delete_session(
        &mut self,
        session_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Session>> {
        let tx = self.begin_write()?;
        let plan = check_owner(
            &tx,
            SELECT_SESSION_PLAN_SQL,
            Entity::Session,
            session_id,
            last_known,
        )?;

        let session = load_session(&tx, session_id)?;

        tx.execute(DELETE_SESSION_SQL, params![session_id as i64])
            .db_context("Failed to delete session")?;
        tx.execute(
            SHIFT_SESSIONS_DOWN_SQL,
            params![session.phase_id as i64, session.position as i64],
        )
        .db_context("Failed to update session positions")?;

        let stamped = plan.bump(&tx, ())?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| session))
    }

    /// Copies a session with its exercises to the end of the same phase.
    pub fn duplicate_session(
        &mut self,
        session_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Session>> {
        let tx = self.begin_write()?;
        let plan = check_owner(
            &tx,
            SELECT_SESSION_PLAN_SQL,
            Entity::Session,
            session_id,
            last_known,
        )?;

        let source = load_session(&tx, session_id)?;
        let position = next_session_position(&tx, source.phase_id)?;
        let copy_id = copy_session(
            &tx,
            session_id,
            source.phase_id,
            position,
            Some(&format!("{} (copy)", source.name)),
        )?;

        let stamped = plan.bump(&tx, ())?;
        let copy = load_session(&tx, copy_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| copy))
    }

    /// Assigns positions `0..N` to the sessions of a phase in list order.
    ///
    /// The list must name every session of the phase exactly once so the
    /// positions stay contiguous.
    pub fn reorder_sessions(
        &mut self,
        request: &ReorderSessions,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<Vec<Session>>> {
        let tx = self.begin_write()?;
        let plan = check_owner(
            &tx,
            SELECT_PHASE_PLAN_SQL,
            Entity::Phase,
            request.phase_id,
            last_known,
        )?;

        let current = session_ids(&tx, request.phase_id)?;
        validate_permutation(request.phase_id, &current, &request.session_ids)?;

        for (position, session_id) in request.session_ids.iter().enumerate() {
            tx.execute(
                UPDATE_SESSION_POSITION_SQL,
                params![position as i64, *session_id as i64],
            )
            .db_context("Failed to update session position")?;
        }

        let stamped = plan.bump(&tx, ())?;
        let sessions = load_sessions(&tx, request.phase_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| sessions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_accepts_reordering() {
        assert!(validate_permutation(1, &[1, 2, 3], &[2, 1, 3]).is_ok());
        assert!(validate_permutation(1, &[], &[]).is_ok());
    }

    #[test]
    fn test_permutation_rejects_missing_duplicate_or_foreign_ids() {
        assert!(validate_permutation(1, &[1, 2, 3], &[2, 1]).is_err());
        assert!(validate_permutation(1, &[1, 2, 3], &[1, 1, 2]).is_err());
        assert!(validate_permutation(1, &[1, 2, 3], &[1, 2, 9]).is_err());
    }
}
