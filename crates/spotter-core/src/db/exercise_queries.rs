//! Plan exercise operations.

use rusqlite::{params, Connection, OptionalExtension};

use super::{check_owner, Stamped};
use crate::{
    error::{DatabaseResultExt, Entity, Result, SpotterError},
    models::{PlanExercise, PrescriptionRange},
    ordering,
    params::{ExerciseDraft, ExercisePlacement, SaveExercise},
    stamp::VersionStamp,
};

const SELECT_SESSION_PLAN_SQL: &str =
    "SELECT p.plan_id FROM sessions s JOIN phases p ON p.id = s.phase_id WHERE s.id = ?1";
const SELECT_EXERCISE_PLAN_SQL: &str = "SELECT p.plan_id FROM plan_exercises e JOIN sessions s ON s.id = e.session_id JOIN phases p ON p.id = s.phase_id WHERE e.id = ?1";
const EXERCISE_COLUMNS: &str = "id, session_id, exercise_id, exercise_name, order_marker, sets_min, sets_max, reps_min, reps_max, rest_min, rest_max, customizations";
const SELECT_LAST_MARKER_SQL: &str =
    "SELECT MAX(order_marker) FROM plan_exercises WHERE session_id = ?1";
const SELECT_MARKER_HOLDER_SQL: &str =
    "SELECT id FROM plan_exercises WHERE session_id = ?1 AND order_marker = ?2 AND id != ?3";
const INSERT_EXERCISE_SQL: &str = "INSERT INTO plan_exercises (session_id, exercise_id, exercise_name, order_marker, sets_min, sets_max, reps_min, reps_max, rest_min, rest_max, customizations) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";
const UPDATE_EXERCISE_SQL: &str = "UPDATE plan_exercises SET exercise_id = ?1, exercise_name = ?2, order_marker = ?3, sets_min = ?4, sets_max = ?5, reps_min = ?6, reps_max = ?7, rest_min = ?8, rest_max = ?9, customizations = ?10 WHERE id = ?11";
const DELETE_EXERCISE_SQL: &str = "DELETE FROM plan_exercises WHERE id = ?1";

fn build_exercise_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlanExercise> {
    let range = |lo: usize| -> rusqlite::Result<PrescriptionRange> {
        Ok(PrescriptionRange {
            min: row.get::<_, i64>(lo)? as u32,
            max: row.get::<_, i64>(lo + 1)? as u32,
        })
    };
    Ok(PlanExercise {
        id: row.get::<_, i64>(0)? as u64,
        session_id: row.get::<_, i64>(1)? as u64,
        exercise_id: row.get::<_, i64>(2)? as u64,
        exercise_name: row.get(3)?,
        order_marker: row.get(4)?,
        sets: range(5)?,
        reps: range(7)?,
        rest_seconds: range(9)?,
        customizations: row.get(11)?,
    })
}

/// Loads the exercises of a session sorted by marker.
pub(crate) fn load_exercises(conn: &Connection, session_id: u64) -> Result<Vec<PlanExercise>> {
    let sql = format!(
        "SELECT {EXERCISE_COLUMNS} FROM plan_exercises WHERE session_id = ?1 ORDER BY order_marker, id"
    );
    let mut stmt = conn.prepare(&sql).db_context("Failed to prepare query")?;

    let exercises = stmt
        .query_map(params![session_id as i64], build_exercise_from_row)
        .db_context("Failed to query plan exercises")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .db_context("Failed to fetch plan exercises")?;

    Ok(exercises)
}

fn load_exercise(conn: &Connection, exercise_id: u64) -> Result<PlanExercise> {
    let sql = format!("SELECT {EXERCISE_COLUMNS} FROM plan_exercises WHERE id = ?1");
    conn.query_row(&sql, params![exercise_id as i64], build_exercise_from_row)
        .or_not_found(Entity::PlanExercise, exercise_id, "Failed to load plan exercise")
}

fn last_marker(conn: &Connection, session_id: u64) -> Result<Option<String>> {
    conn.query_row(SELECT_LAST_MARKER_SQL, params![session_id as i64], |row| {
        row.get::<_, Option<String>>(0)
    })
    .db_context("Failed to read last exercise marker")
}

/// Rejects a caller-chosen marker already held by another exercise of the
/// session.
fn ensure_marker_free(
    conn: &Connection,
    session_id: u64,
    marker: &str,
    exclude: Option<u64>,
) -> Result<()> {
    let holder = conn
        .query_row(
            SELECT_MARKER_HOLDER_SQL,
            params![session_id as i64, marker, exclude.map_or(-1, |id| id as i64)],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .db_context("Failed to check exercise marker")?;

    match holder {
        Some(holder) => Err(SpotterError::invalid_input("placement").with_reason(format!(
            "Marker '{marker}' is already used by plan exercise {holder}"
        ))),
        None => Ok(()),
    }
}

pub(crate) fn insert_exercise_row(
    conn: &Connection,
    session_id: u64,
    exercise: &ExerciseDraft,
    marker: &str,
) -> Result<u64> {
    conn.execute(
        INSERT_EXERCISE_SQL,
        params![
            session_id as i64,
            exercise.exercise_id as i64,
            &exercise.exercise_name,
            marker,
            exercise.sets.min,
            exercise.sets.max,
            exercise.reps.min,
            exercise.reps.max,
            exercise.rest_seconds.min,
            exercise.rest_seconds.max,
            &exercise.customizations
        ],
    )
    .db_context("Failed to insert plan exercise")?;
    Ok(conn.last_insert_rowid() as u64)
}

impl From<&SaveExercise> for ExerciseDraft {
    fn from(save: &SaveExercise) -> Self {
        ExerciseDraft {
            exercise_id: save.exercise_id,
            exercise_name: save.exercise_name.clone(),
            sets: save.sets,
            reps: save.reps,
            rest_seconds: save.rest_seconds,
            customizations: save.customizations.clone(),
        }
    }
}

impl super::Database {
    /// Retrieves one plan exercise.
    pub fn get_plan_exercise(&self, exercise_id: u64) -> Result<Option<PlanExercise>> {
        let sql = format!("SELECT {EXERCISE_COLUMNS} FROM plan_exercises WHERE id = ?1");
        self.connection
            .query_row(&sql, params![exercise_id as i64], build_exercise_from_row)
            .optional()
            .db_context("Failed to query plan exercise")
    }

    /// Inserts or overwrites a plan exercise.
    ///
    /// New exercises default to the end of the session. On edits
    /// [`ExercisePlacement::End`] keeps the stored marker; the other
    /// placements move the exercise.
    pub fn save_plan_exercise(
        &mut self,
        save: &SaveExercise,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<PlanExercise>> {
        save.validate()?;
        let draft = ExerciseDraft::from(save);

        let tx = self.begin_write()?;

        let (plan, exercise_id) = match save.id {
            None => {
                let plan = check_owner(
                    &tx,
                    SELECT_SESSION_PLAN_SQL,
                    Entity::Session,
                    save.session_id,
                    last_known,
                )?;
                let marker = match &save.placement {
                    ExercisePlacement::End => {
                        ordering::marker_after(last_marker(&tx, save.session_id)?.as_deref())?
                    }
                    ExercisePlacement::Between { before, after } => {
                        ordering::marker_between(before.as_deref(), after.as_deref())?
                    }
                    ExercisePlacement::Marker(marker) => {
                        ensure_marker_free(&tx, save.session_id, marker, None)?;
                        marker.clone()
                    }
                };
                let id = insert_exercise_row(&tx, save.session_id, &draft, &marker)?;
                (plan, id)
            }
            Some(id) => {
                let plan = check_owner(
                    &tx,
                    SELECT_EXERCISE_PLAN_SQL,
                    Entity::PlanExercise,
                    id,
                    last_known,
                )?;
                let current = load_exercise(&tx, id)?;
                if current.session_id != save.session_id {
                    return Err(SpotterError::invalid_input("session_id").with_reason(format!(
                        "Plan exercise {id} belongs to session {}, not {}",
                        current.session_id, save.session_id
                    )));
                }
                let marker = match &save.placement {
                    ExercisePlacement::End => current.order_marker,
                    ExercisePlacement::Between { before, after } => {
                        ordering::marker_between(before.as_deref(), after.as_deref())?
                    }
                    ExercisePlacement::Marker(marker) => {
                        ensure_marker_free(&tx, save.session_id, marker, Some(id))?;
                        marker.clone()
                    }
                };
                tx.execute(
                    UPDATE_EXERCISE_SQL,
                    params![
                        draft.exercise_id as i64,
                        &draft.exercise_name,
                        &marker,
                        draft.sets.min,
                        draft.sets.max,
                        draft.reps.min,
                        draft.reps.max,
                        draft.rest_seconds.min,
                        draft.rest_seconds.max,
                        &draft.customizations,
                        id as i64
                    ],
                )
                .db_context("Failed to update plan exercise")?;
                (plan, id)
            }
        };

        let stamped = plan.bump(&tx, ())?;
        let exercise = load_exercise(&tx, exercise_id)?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| exercise))
    }

    /// Removes a plan exercise. Siblings keep their markers.
    pub fn delete_plan_exercise(
        &mut self,
        exercise_id: u64,
        last_known: Option<&VersionStamp>,
    ) -> Result<Stamped<PlanExercise>> {
        let tx = self.begin_write()?;
        let plan = check_owner(
            &tx,
            SELECT_EXERCISE_PLAN_SQL,
            Entity::PlanExercise,
            exercise_id,
            last_known,
        )?;

        let exercise = load_exercise(&tx, exercise_id)?;
        tx.execute(DELETE_EXERCISE_SQL, params![exercise_id as i64])
            .db_context("Failed to delete plan exercise")?;

        let stamped = plan.bump(&tx, ())?;
        tx.commit().db_context("Failed to commit transaction")?;

        Ok(stamped.map(|()| exercise))
    }
}
