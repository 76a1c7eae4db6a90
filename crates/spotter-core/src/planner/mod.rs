//! High-level async API over the plan store.
//!
//! [`Planner`] is what front ends talk to. Each call runs its database work
//! on a blocking worker with a fresh connection, so concurrent calls become
//! concurrent SQLite writers that serialize on the write lock.
//!
//! ```text
//! ┌──────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │     Planner      │    │    Database     │    │     SQLite      │
//! │ (plan_ops,       │───▶│ (db/ queries,   │───▶│ (immediate      │
//! │  session_ops,    │    │  stamp checks)  │    │  transactions)  │
//! │  workout_ops,    │    └─────────────────┘    └─────────────────┘
//! │  jobs)           │───▶ InvalidationBus / Dispatcher
//! └──────────────────┘
//! ```
//!
//! Structural mutations return [`MutationOutcome`](crate::MutationOutcome)
//! and never fail with `Err`. On success they publish an invalidation for the
//! plan owner and, when a dispatcher is configured, record a best-effort
//! `user_action` message.
//!
//! # Example
//!
//! ```rust,no_run
//! use spotter_core::{params::{CreatePlan, PhaseInput}, PlannerBuilder};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let planner = PlannerBuilder::new()
//!     .with_database_path(Some("spotter.db"))
//!     .build()
//!     .await?;
//!
//! let plan = planner
//!     .create_plan(&CreatePlan { client_id: 7, title: "Off-season".to_string() })
//!     .await
//!     .into_result()?;
//!
//! let outcome = planner
//!     .create_phase(plan.id, &PhaseInput { name: "Base".to_string(), notes: None }, Some(plan.updated_at))
//!     .await;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use tokio::{sync::broadcast, task};

use crate::{
    db::{Database, Stamped},
    error::{FailureKind, Result, SpotterError},
    invalidation::{Invalidation, InvalidationBus},
    outcome::MutationOutcome,
    queue::Dispatcher,
};

pub mod builder;
pub mod jobs;
pub mod plan_ops;
pub mod session_ops;
pub mod workout_ops;

#[cfg(test)]
mod tests;

pub use builder::PlannerBuilder;

/// Main entry point for plan structure and workout logging.
#[derive(Clone)]
pub struct Planner {
    pub(crate) db_path: PathBuf,
    pub(crate) invalidation: InvalidationBus,
    pub(crate) dispatcher: Option<Dispatcher>,
}

impl Planner {
    pub(crate) fn new(
        db_path: PathBuf,
        invalidation: InvalidationBus,
        dispatcher: Option<Dispatcher>,
    ) -> Self {
        Self {
            db_path,
            invalidation,
            dispatcher,
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    /// Subscribes to invalidations published after committed mutations.
    pub fn invalidations(&self) -> broadcast::Receiver<Invalidation> {
        self.invalidation.subscribe()
    }

    pub fn dispatcher(&self) -> Option<&Dispatcher> {
        self.dispatcher.as_ref()
    }

    /// Runs `op` against a fresh connection on the blocking pool.
    pub(crate) async fn with_db<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();

        task::spawn_blocking(move || {
            let mut db = Database::new(&db_path)?;
            op(&mut db)
        })
        .await
        .map_err(|e| SpotterError::Configuration {
            message: format!("Task join error: {e}"),
        })?
    }

    /// Runs a conflict-checked mutation and folds the result into an outcome.
    pub(crate) async fn mutate<T, F>(&self, action: &'static str, op: F) -> MutationOutcome<T>
    where
        F: FnOnce(&mut Database) -> Result<Stamped<T>> + Send + 'static,
        T: Send + 'static,
    {
        let result = self.with_db(op).await;

        let committed = match &result {
            Ok(stamped) => {
                self.invalidation.publish(Invalidation {
                    client_id: stamped.client_id,
                    plan_id: stamped.plan_id,
                    updated_at: stamped.updated_at,
                });
                Some(stamped.plan_id)
            }
            Err(SpotterError::Conflict {
                plan_id,
                server_updated_at,
            }) => {
                log::info!(
                    "{action} rejected: plan {plan_id} changed concurrently (server {server_updated_at})"
                );
                None
            }
            Err(e) if e.kind() == FailureKind::PersistenceFailure => {
                log::warn!("{action} failed: {e}");
                None
            }
            Err(e) => {
                log::debug!("{action} refused: {e}");
                None
            }
        };

        if let Some(plan_id) = committed {
            self.record_action(action, Some(plan_id)).await;
        }

        MutationOutcome::from(result)
    }
}
