//! Builder for creating and configuring Planner instances.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::task;

use super::Planner;
use crate::{
    db::Database,
    error::{Result, SpotterError},
    invalidation::InvalidationBus,
    queue::{Dispatcher, JobQueue},
};

/// Builder for creating and configuring Planner instances.
#[derive(Clone, Default)]
pub struct PlannerBuilder {
    database_path: Option<PathBuf>,
    dispatcher: Option<Dispatcher>,
    invalidation: Option<InvalidationBus>,
}

impl PlannerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom database file path.
    ///
    /// If not specified, uses XDG Base Directory specification:
    /// `$XDG_DATA_HOME/spotter/spotter.db` or `~/.local/share/spotter/spotter.db`
    pub fn with_database_path<P: AsRef<Path>>(mut self, path: Option<P>) -> Self {
        if let Some(path) = path {
            self.database_path = Some(path.as_ref().to_path_buf());
        }
        self
    }

    /// Routes background and best-effort messages through `queue`.
    pub fn with_job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.dispatcher = Some(Dispatcher::new(queue));
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Shares an invalidation bus with other planners (e.g. a worker's).
    pub fn with_invalidation_bus(mut self, bus: InvalidationBus) -> Self {
        self.invalidation = Some(bus);
        self
    }

    /// Builds the configured planner instance.
    ///
    /// # Errors
    ///
    /// Returns `SpotterError::FileSystem` if the database directory cannot be
    /// created, `SpotterError::XdgDirectory` if no default path can be
    /// resolved and `SpotterError::Database` if schema initialization fails.
    pub async fn build(self) -> Result<Planner> {
        let db_path = if let Some(path) = self.database_path {
            path
        } else {
            Self::default_database_path()?
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SpotterError::FileSystem {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let db_path_clone = db_path.clone();
        task::spawn_blocking(move || {
            let _db = Database::new(&db_path_clone)?;
            Ok::<(), SpotterError>(())
        })
        .await
        .map_err(|e| SpotterError::Configuration {
            message: format!("Task join error: {e}"),
        })??;

        log::debug!("Planner ready with database {}", db_path.display());

        Ok(Planner::new(
            db_path,
            self.invalidation.unwrap_or_default(),
            self.dispatcher,
        ))
    }

    /// Returns the default database path following XDG Base Directory
    /// specification.
    fn default_database_path() -> Result<PathBuf> {
        xdg::BaseDirectories::with_prefix("spotter")
            .place_data_file("spotter.db")
            .map_err(|e| SpotterError::XdgDirectory(e.to_string()))
    }
}
