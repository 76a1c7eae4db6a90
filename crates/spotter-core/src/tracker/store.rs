//! Server side of the save pipeline.

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{SetValues, WorkoutSessionDetail, WorkoutSessionLog},
    params::LogSet,
    planner::Planner,
};

/// Persistence calls the tracker makes.
///
/// Implementations must make `create_set` idempotent on the request's
/// `client_ref`: a retried create has to return the row stored by the first
/// successful call.
#[async_trait]
pub trait WorkoutStore: Send + Sync {
    async fn create_set(&self, request: &LogSet) -> Result<WorkoutSessionDetail>;
    async fn update_set(&self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail>;
    async fn delete_set(&self, detail_id: u64) -> Result<()>;
    async fn end_log(&self, log_id: u64) -> Result<WorkoutSessionLog>;
    async fn abandon_log(&self, log_id: u64) -> Result<WorkoutSessionLog>;
}

#[async_trait]
impl WorkoutStore for Planner {
    async fn create_set(&self, request: &LogSet) -> Result<WorkoutSessionDetail> {
        self.log_set(request).await
    }

    async fn update_set(&self, detail_id: u64, values: &SetValues) -> Result<WorkoutSessionDetail> {
        Planner::update_set(self, detail_id, values).await
    }

    async fn delete_set(&self, detail_id: u64) -> Result<()> {
        Planner::delete_set(self, detail_id).await.map(|_| ())
    }

    async fn end_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.end_session_log(log_id).await
    }

    async fn abandon_log(&self, log_id: u64) -> Result<WorkoutSessionLog> {
        self.abandon_session_log(log_id).await
    }
}
