//! Workout session logs and logged sets.
//!
//! Logs are not part of a plan's structure and do not touch any version
//! stamp. Creation of logs and sets is idempotent through client-chosen
//! references, so retried requests never duplicate rows.

use jiff::Timestamp;
use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_optional_timestamp, parse_timestamp};
use crate::{
    error::{DatabaseResultExt, Entity, Result, SpotterError},
    models::{SetValues, WorkoutSessionDetail, WorkoutSessionLog},
    ordering,
    params::{validate_set_values, LogSet, StartSessionLog},
};

const LOG_COLUMNS: &str = "id, client_ref, user_id, session_name, start_time, end_time";
const DETAIL_COLUMNS: &str = "id, log_id, client_ref, exercise_name, set_number, reps, weight, workout_volume, coach_note, order_marker, entry_time";

const INSERT_LOG_SQL: &str = "INSERT INTO workout_session_logs (client_ref, user_id, session_name, start_time) VALUES (?1, ?2, ?3, ?4) ON CONFLICT(client_ref) DO NOTHING";
const END_LOG_SQL: &str =
    "UPDATE workout_session_logs SET end_time = ?1 WHERE id = ?2 AND end_time IS NULL";
const DELETE_LOG_SQL: &str = "DELETE FROM workout_session_logs WHERE id = ?1";
const SELECT_LAST_DETAIL_MARKER_SQL: &str =
    "SELECT MAX(order_marker) FROM workout_session_details WHERE log_id = ?1";
const SELECT_DETAIL_MARKER_HOLDER_SQL: &str =
    "SELECT id FROM workout_session_details WHERE log_id = ?1 AND order_marker = ?2";
const INSERT_DETAIL_SQL: &str = "INSERT INTO workout_session_details (log_id, client_ref, exercise_name, set_number, reps, weight, workout_volume, coach_note, order_marker, entry_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";
const UPDATE_DETAIL_SQL: &str = "UPDATE workout_session_details SET reps = ?1, weight = ?2, workout_volume = ?3, coach_note = ?4 WHERE id = ?5";
const DELETE_DETAIL_SQL: &str = "DELETE FROM workout_session_details WHERE id = ?1";
const COUNT_LOGGED_REPS_SQL: &str =
    "SELECT COUNT(*) FROM workout_session_details WHERE log_id = ?1 AND reps >= 1";

fn build_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutSessionLog> {
    Ok(WorkoutSessionLog {
        id: row.get::<_, i64>(0)? as u64,
        client_ref: row.get(1)?,
        user_id: row.get::<_, i64>(2)? as u64,
        session_name: row.get(3)?,
        start_time: parse_timestamp(row, 4)?,
        end_time: parse_optional_timestamp(row, 5)?,
        details: Vec::new(),
    })
}

fn build_detail_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutSessionDetail> {
    Ok(WorkoutSessionDetail {
        id: row.get::<_, i64>(0)? as u64,
        log_id: row.get::<_, i64>(1)? as u64,
        client_ref: row.get(2)?,
        exercise_name: row.get(3)?,
        set_number: row.get::<_, i64>(4)? as u32,
        reps: row.get::<_, Option<i64>>(5)?.map(|r| r as u32),
        weight: row.get(6)?,
        workout_volume: row.get(7)?,
        coach_note: row.get(8)?,
        order_marker: row.get(9)?,
        entry_time: parse_timestamp(row, 10)?,
    })
}

fn load_details(conn: &Connection, log_id: u64) -> Result<Vec<WorkoutSessionDetail>> {
    let sql = format!(
        "SELECT {DETAIL_COLUMNS} FROM workout_session_details WHERE log_id = ?1 ORDER BY order_marker, id"
    );
    let mut stmt = conn.prepare(&sql).db_context("Failed to prepare query")?;

    let details = stmt
        .query_map(params![log_id as i64], build_detail_from_row)
        .db_context("Failed to query logged sets")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch logged sets")?;

    Ok(details)
}

fn find_log(conn: &Connection, log_id: u64) -> Result<Option<WorkoutSessionLog>> {
    let sql = format!("SELECT {LOG_COLUMNS} FROM workout_session_logs WHERE id = ?1");
    let log = conn
        .query_row(&sql, params![log_id as i64], build_log_from_row)
        .optional()
        .db_context("Failed to query workout session log")?;

    match log {
        Some(mut log) => {
            log.details = load_details(conn, log.id)?;
            Ok(Some(log))
        }
        None => Ok(None),
    }
}

fn load_log(conn: &Connection, log_id: u64) -> Result<WorkoutSessionLog> {
    find_log(conn, log_id)?.ok_or_else(|| SpotterError::not_found(Entity::SessionLog, log_id))
}

fn load_detail(conn: &Connection, detail_id: u64) -> Result<WorkoutSessionDetail> {
    let sql = format!("SELECT {DETAIL_COLUMNS} FROM workout_session_details WHERE id = ?1");
    conn.query_row(&sql, params![detail_id as i64], build_detail_from_row)
        .or_not_found(Entity::SetDetail, detail_id, "Failed to load logged set")
}

fn find_detail_by_ref(
    conn: &Connection,
    log_id: u64,
    client_ref: &str,
) -> Result<Option<WorkoutSessionDetail>> {
    let sql = format!(
        "SELECT {DETAIL_COLUMNS} FROM workout_session_details WHERE log_id = ?1 AND client_ref = ?2"
    );
    conn.query_row(&sql, params![log_id as i64, client_ref], build_detail_from_row)
        .optional()
        .db_context("Failed to query logged set")
}

fn require_active(log: &WorkoutSessionLog) -> Result<()> {
    if !log.is_active() {
        return Err(SpotterError::invalid_input("log_id")
            .with_reason(format!("Workout session log {} has already ended", log.id)));
    }
    Ok(())
}

impl super::Database {
    /// Starts a workout session log.
    ///
    /// Calling this again with the same `client_ref` returns the stored log
    /// unchanged, whatever the other fields say.
    pub fn create_session_log(&mut self, params: &StartSessionLog) -> Result<WorkoutSessionLog> {
        params.validate()?;

        let tx = self.begin_write()?;

        let inserted = tx
            .execute(
                INSERT_LOG_SQL,
                params![
                    &params.client_ref,
                    params.user_id as i64,
                    &params.session_name,
                    Timestamp::now().to_string()
                ],
            )
            .db_context("Failed to insert workout session log")?;
        if inserted == 0 {
            log::debug!(
                "Workout session log '{}' already exists, returning stored row",
                params.client_ref
            );
        }

        let sql = format!("SELECT {LOG_COLUMNS} FROM workout_session_logs WHERE client_ref = ?1");
        let mut log = tx
            .query_row(&sql, params![&params.client_ref], build_log_from_row)
            .db_context("Failed to reload workout session log")?;
        log.details = load_details(&tx, log.id)?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(log)
    }

    /// Retrieves a log with its sets in marker order.
    pub fn get_session_log(&self, log_id: u64) -> Result<Option<WorkoutSessionLog>> {
        find_log(&self.connection, log_id)
    }

    /// Records one set on an active log.
    ///
    /// A repeated `client_ref` returns the set stored by the first call, so a
    /// retried create whose response was lost does not duplicate the row.
    pub fn log_set(&mut self, params: &LogSet) -> Result<WorkoutSessionDetail> {
        params.validate()?;

        let tx = self.begin_write()?;
        let log = load_log(&tx, params.log_id)?;

        if let Some(existing) = find_detail_by_ref(&tx, params.log_id, &params.client_ref)? {
            return Ok(existing);
        }
        require_active(&log)?;

        let marker = match &params.order_marker {
            Some(marker) => {
                let holder: Option<i64> = tx
                    .query_row(
                        SELECT_DETAIL_MARKER_HOLDER_SQL,
                        params![params.log_id as i64, marker],
                        |row| row.get(0),
                    )
                    .optional()
                    .db_context("Failed to check set marker")?;
                if let Some(holder) = holder {
                    return Err(SpotterError::invalid_input("order_marker").with_reason(
                        format!("Marker '{marker}' is already used by set {holder}"),
                    ));
                }
                marker.clone()
            }
            None => {
                let last: Option<String> = tx
                    .query_row(
                        SELECT_LAST_DETAIL_MARKER_SQL,
                        params![params.log_id as i64],
                        |row| row.get(0),
                    )
                    .db_context("Failed to read last set marker")?;
                ordering::marker_after(last.as_deref())?
            }
        };

        let values = &params.values;
        tx.execute(
            INSERT_DETAIL_SQL,
            params![
                params.log_id as i64,
                &params.client_ref,
                &params.exercise_name,
                params.set_number,
                values.reps,
                values.weight,
                values.volume(),
                &values.notes,
                &marker,
                Timestamp::now().to_string()
            ],
        )
        .db_context("Failed to insert logged set")?;

        let detail = load_detail(&tx, tx.last_insert_rowid() as u64)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(detail)
    }

    /// Overwrites reps, weight and note of a set and recomputes its volume.
    /// The set's log must still be active.
    ///
    /// The exercise name recorded at logging time is never changed here.
    pub fn update_set(&mut self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail> {
        validate_set_values(values)?;

        let tx = self.begin_write()?;
        let current = load_detail(&tx, detail_id)?;
        require_active(&load_log(&tx, current.log_id)?)?;

        tx.execute(
            UPDATE_DETAIL_SQL,
            params![
                values.reps,
                values.weight,
                values.volume(),
                &values.notes,
                detail_id as i64
            ],
        )
        .db_context("Failed to update logged set")?;

        let detail = load_detail(&tx, detail_id)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(detail)
    }

    /// Removes a logged set from an active log and returns it.
    pub fn delete_set(&mut self, detail_id: u64) -> Result<WorkoutSessionDetail> {
        let tx = self.begin_write()?;
        let detail = load_detail(&tx, detail_id)?;
        require_active(&load_log(&tx, detail.log_id)?)?;

        tx.execute(DELETE_DETAIL_SQL, params![detail_id as i64])
            .db_context("Failed to delete logged set")?;

        tx.commit().db_context("Failed to commit transaction")?;
        Ok(detail)
    }

    /// Sets the end time of a log. Ending an ended log is a no-op.
    pub fn end_session_log(&mut self, log_id: u64) -> Result<WorkoutSessionLog> {
        let tx = self.begin_write()?;
        load_log(&tx, log_id)?;

        tx.execute(
            END_LOG_SQL,
            params![Timestamp::now().to_string(), log_id as i64],
        )
        .db_context("Failed to end workout session log")?;

        let log = load_log(&tx, log_id)?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(log)
    }

    /// Deletes a log that holds no set with at least one rep.
    ///
    /// Refuses (and deletes nothing) as soon as one set has `reps >= 1`.
    pub fn delete_empty_session_log(&mut self, log_id: u64) -> Result<WorkoutSessionLog> {
        let tx = self.begin_write()?;
        let log = load_log(&tx, log_id)?;

        let logged: i64 = tx
            .query_row(COUNT_LOGGED_REPS_SQL, params![log_id as i64], |row| row.get(0))
            .db_context("Failed to count logged sets")?;
        if logged > 0 {
            return Err(SpotterError::invalid_input("log_id").with_reason(format!(
                "Workout session log {log_id} has {logged} set(s) with recorded reps"
            )));
        }

        tx.execute(DELETE_LOG_SQL, params![log_id as i64])
            .db_context("Failed to delete workout session log")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(log)
    }

    /// Discards an in-progress log and all of its sets.
    pub fn abandon_session_log(&mut self, log_id: u64) -> Result<WorkoutSessionLog> {
        let tx = self.begin_write()?;
        let log = load_log(&tx, log_id)?;
        require_active(&log)?;

        tx.execute(DELETE_LOG_SQL, params![log_id as i64])
            .db_context("Failed to delete workout session log")?;
        tx.commit().db_context("Failed to commit transaction")?;
        Ok(log)
    }
}
