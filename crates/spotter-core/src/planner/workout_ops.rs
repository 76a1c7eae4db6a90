//! Workout logging operations for the Planner.
//!
//! Unlike structural mutations these return plain `Result`s: the save
//! pipeline on the client decides what to retry.

use super::Planner;
use crate::{
    error::Result,
    models::{SetValues, WorkoutSessionDetail, WorkoutSessionLog},
    params::{LogSet, StartSessionLog},
};

impl Planner {
    /// Starts a log, or returns the existing one for a repeated client ref.
    pub async fn create_session_log(&self, params: &StartSessionLog) -> Result<WorkoutSessionLog> {
        let params = params.clone();
        self.with_db(move |db| db.create_session_log(&params)).await
    }

    pub async fn get_session_log(&self, log_id: u64) -> Result<Option<WorkoutSessionLog>> {
        self.with_db(move |db| db.get_session_log(log_id)).await
    }

    /// Logs a set; a repeated client ref returns the stored set.
    pub async fn log_set(&self, params: &LogSet) -> Result<WorkoutSessionDetail> {
        let params = params.clone();
        self.with_db(move |db| db.log_set(&params)).await
    }

    pub async fn update_set(&self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail> {
        let values = values.clone();
        self.with_db(move |db| db.update_set(detail_id, &values)).await
    }

    pub async fn delete_set(&self, detail_id: u64) -> Result<WorkoutSessionDetail> {
        self.with_db(move |db| db.delete_set(detail_id)).await
    }

    pub async fn end_session_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.with_db(move |db| db.end_session_log(log_id)).await
    }

    /// Deletes a log without any recorded reps; refuses otherwise.
    pub async fn delete_empty_session_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.with_db(move |db| db.delete_empty_session_log(log_id)).await
    }

    /// Discards an in-progress log with its sets.
    pub async fn abandon_session_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.with_db(move |db| db.abandon_session_log(log_id)).await
    }
}
